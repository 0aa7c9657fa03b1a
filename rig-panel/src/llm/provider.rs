//! Completion service abstraction
//!
//! Every step of a report run talks to the model through
//! [`CompletionService`]: free-text completions for questions, answers and
//! report prose, schema-bound completions for requirements, personas and
//! search queries.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ReportError;
use crate::state::Message;

/// JSON schema describing a structured completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema for the object the model must return
    pub parameters: serde_json::Value,
}

/// Types the model can be asked to produce directly.
pub trait StructuredOutput: DeserializeOwned {
    fn schema() -> OutputSchema;
}

/// Provider-agnostic chat completion.
///
/// ```rust,ignore
/// struct Canned;
///
/// #[async_trait]
/// impl CompletionService for Canned {
///     async fn complete(&self, _messages: &[Message]) -> Result<Message, ReportError> {
///         Ok(Message::ai("ok"))
///     }
///
///     async fn complete_structured(
///         &self,
///         _messages: &[Message],
///         _schema: &OutputSchema,
///     ) -> Result<serde_json::Value, ReportError> {
///         Ok(serde_json::json!({}))
///     }
///
///     fn name(&self) -> &str { "canned" }
/// }
/// ```
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Free-text completion. Returns an AI message.
    async fn complete(&self, messages: &[Message]) -> Result<Message, ReportError>;

    /// Completion constrained to `schema`. Returns the raw JSON object.
    async fn complete_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<serde_json::Value, ReportError>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Request a `T` and decode it.
pub async fn complete_as<T>(service: &dyn CompletionService, messages: &[Message]) -> Result<T, ReportError>
where
    T: StructuredOutput,
{
    let schema = T::schema();
    let value = service.complete_structured(messages, &schema).await?;
    serde_json::from_value(value).map_err(|e| ReportError::schema_violation(&schema.name, e.to_string()))
}
