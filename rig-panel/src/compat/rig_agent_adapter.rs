//! Rig agents as a [`CompletionService`]
//!
//! Free-text completions go straight through Rig's completion builder.
//! Structured completions offer the model exactly one tool whose parameters
//! are the requested schema, then read the arguments of the tool call back
//! as the result.
//!
//! ```rust,ignore
//! use rig::client::{CompletionClient, ProviderClient};
//!
//! let client = rig::providers::openai::Client::from_env();
//! let agent = client.agent("gpt-4o").build();
//! let service = RigCompletionService::new(agent, LLMConfig::new("gpt-4o").with_temperature(0.0));
//! ```

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use rig::agent::Agent;
use rig::completion::{
    Completion, CompletionModel, CompletionRequestBuilder, Message as RigMessage,
    ToolDefinition as RigToolDefinition,
};
use rig::message::AssistantContent;
use rig::OneOrMany;

use crate::error::ReportError;
use crate::llm::{CompletionService, LLMConfig, OutputSchema, TokenUsage};
use crate::state::{Message, Role};

/// Wraps a Rig `Agent<M>` and keeps a running token count.
pub struct RigCompletionService<M>
where
    M: CompletionModel + Send + Sync,
{
    agent: Arc<Agent<M>>,
    config: LLMConfig,
    provider_name: String,
    usage: Mutex<TokenUsage>,
}

impl<M> RigCompletionService<M>
where
    M: CompletionModel + Send + Sync,
{
    pub fn new(agent: Agent<M>, config: LLMConfig) -> Self {
        Self {
            agent: Arc::new(agent),
            config,
            provider_name: "rig".to_string(),
            usage: Mutex::new(TokenUsage::default()),
        }
    }

    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = name.into();
        self
    }

    pub fn config(&self) -> &LLMConfig {
        &self.config
    }

    /// Tokens used by every completion so far
    pub fn total_usage(&self) -> TokenUsage {
        self.usage.lock().map(|usage| *usage).unwrap_or_default()
    }

    fn record_usage(&self, usage: &rig::completion::Usage) {
        if let Ok(mut total) = self.usage.lock() {
            *total += TokenUsage::from_rig_usage(usage);
        }
    }

    async fn builder(
        &self,
        messages: &[Message],
        extra_preamble: Option<String>,
    ) -> Result<CompletionRequestBuilder<M>, ReportError> {
        let conversation = build_rig_conversation(messages);
        let mut builder = self
            .agent
            .completion(conversation.prompt, conversation.history)
            .await
            .map_err(|e| ReportError::Service(format!("Rig agent error: {}", e)))?;

        let parts: Vec<String> = self
            .agent
            .preamble
            .clone()
            .into_iter()
            .chain(conversation.preamble)
            .chain(extra_preamble)
            .filter(|part| !part.trim().is_empty())
            .collect();
        if !parts.is_empty() {
            builder = builder.preamble(parts.join("\n\n"));
        }

        if let Some(temperature) = self.config.temperature {
            builder = builder.temperature(temperature);
        }

        Ok(builder)
    }
}

#[async_trait]
impl<M> CompletionService for RigCompletionService<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    async fn complete(&self, messages: &[Message]) -> Result<Message, ReportError> {
        let response = self
            .builder(messages, None)
            .await?
            .send()
            .await
            .map_err(|e| ReportError::Service(format!("Rig agent error: {}", e)))?;

        self.record_usage(&response.usage);
        tracing::debug!(
            provider = %self.provider_name,
            model = %self.config.model,
            output_tokens = response.usage.output_tokens,
            "Completion finished"
        );

        Ok(Message::ai(text_from_choice(&response.choice)))
    }

    async fn complete_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<serde_json::Value, ReportError> {
        let instruction = format!(
            "Respond only by calling the `{}` tool with arguments that satisfy its schema.",
            schema.name
        );
        let response = self
            .builder(messages, Some(instruction))
            .await?
            .tools(vec![RigToolDefinition {
                name: schema.name.clone(),
                description: schema.description.clone(),
                parameters: schema.parameters.clone(),
            }])
            .send()
            .await
            .map_err(|e| ReportError::Service(format!("Rig agent error: {}", e)))?;

        self.record_usage(&response.usage);
        structured_from_choice(&response.choice, &schema.name)
    }

    fn name(&self) -> &str {
        &self.provider_name
    }
}

struct RigConversation {
    prompt: RigMessage,
    history: Vec<RigMessage>,
    preamble: Option<String>,
}

fn build_rig_conversation(messages: &[Message]) -> RigConversation {
    let mut system_parts = Vec::new();
    let mut rig_messages = Vec::new();

    for message in messages {
        match message.role {
            Role::System => {
                if !message.content.trim().is_empty() {
                    system_parts.push(message.content.clone());
                }
            }
            Role::Human => rig_messages.push(RigMessage::user(message.content.clone())),
            Role::Ai => rig_messages.push(RigMessage::Assistant {
                id: None,
                content: OneOrMany::one(AssistantContent::text(message.content.clone())),
            }),
        }
    }

    let prompt = rig_messages.pop().unwrap_or_else(|| RigMessage::user(""));

    let preamble = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };

    RigConversation {
        prompt,
        history: rig_messages,
        preamble,
    }
}

fn text_from_choice(choice: &OneOrMany<AssistantContent>) -> String {
    choice
        .iter()
        .filter_map(|item| match item {
            AssistantContent::Text(text) => Some(text.text.as_str()),
            _ => None,
        })
        .collect()
}

/// Arguments of the call to `tool_name`, else the text parsed as JSON.
fn structured_from_choice(
    choice: &OneOrMany<AssistantContent>,
    tool_name: &str,
) -> Result<serde_json::Value, ReportError> {
    let call = choice.iter().find_map(|item| match item {
        AssistantContent::ToolCall(call) if call.function.name == tool_name => {
            Some(call.function.arguments.clone())
        }
        _ => None,
    });
    if let Some(arguments) = call {
        return Ok(arguments);
    }

    let text = text_from_choice(choice);
    serde_json::from_str(text.trim()).map_err(|_| {
        ReportError::schema_violation(tool_name, "model returned neither a tool call nor a JSON object")
    })
}

impl<M> std::fmt::Debug for RigCompletionService<M>
where
    M: CompletionModel + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RigCompletionService")
            .field("provider_name", &self.provider_name)
            .field("model", &self.config.model)
            .finish()
    }
}
