//! Error types for report generation

use thiserror::Error;

use crate::evidence::LookupError;
use crate::pregel::{PregelError, VertexId};

/// Top-level error for a report run
#[derive(Error, Debug)]
pub enum ReportError {
    /// The completion service failed or returned nothing usable
    #[error("Completion service error: {0}")]
    Service(String),

    /// Structured output did not match the requested schema
    #[error("Output does not match schema '{schema}': {message}")]
    SchemaViolation { schema: String, message: String },

    #[error("Evidence lookup failed: {0}")]
    Lookup(#[from] LookupError),

    /// A step ran before the state it reads was produced
    #[error("Missing state field: {0}")]
    MissingField(&'static str),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An interview failed; the run is aborted
    #[error("Interview with {persona} failed: {source}")]
    InterviewFailed {
        persona: String,
        #[source]
        source: Box<ReportError>,
    },

    #[error("Workflow error: {0}")]
    Workflow(#[from] PregelError),

    /// Persisted state was written by an incompatible version
    #[error("Incompatible run state version: expected {expected}, found {found}")]
    IncompatibleState { expected: u32, found: u32 },
}

impl ReportError {
    pub fn schema_violation(schema: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaViolation {
            schema: schema.into(),
            message: message.into(),
        }
    }

    /// Wrap as the failure of `vertex` so it can cross the runtime boundary.
    pub fn into_vertex_error(self, vertex: &VertexId) -> PregelError {
        let message = self.to_string();
        PregelError::vertex_error_with_source(vertex, message, self)
    }

    /// Recover the domain error a vertex raised, if there is one.
    pub fn from_pregel(err: PregelError) -> Self {
        match err {
            PregelError::VertexError {
                source: Some(source),
                vertex_id,
                message,
            } => match source.downcast::<ReportError>() {
                Ok(report) => *report,
                Err(source) => Self::Workflow(PregelError::VertexError {
                    vertex_id,
                    message,
                    source: Some(source),
                }),
            },
            PregelError::MaxRetriesExceeded { last, .. } => Self::from_pregel(*last),
            other => Self::Workflow(other),
        }
    }
}
