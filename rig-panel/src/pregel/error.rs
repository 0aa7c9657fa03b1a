//! Error types for the Pregel runtime

use super::vertex::VertexId;
use thiserror::Error;

/// Errors that can occur during Pregel runtime execution
#[derive(Debug, Error)]
pub enum PregelError {
    #[error("Max supersteps exceeded: {0}")]
    MaxSuperstepsExceeded(usize),

    #[error("Vertex timeout: {0}")]
    VertexTimeout(VertexId),

    /// Error raised inside a vertex computation
    #[error("Vertex error in {vertex_id}: {message}")]
    VertexError {
        vertex_id: VertexId,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    /// Invalid workflow configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Workflow timeout after {0:?}")]
    WorkflowTimeout(std::time::Duration),

    /// Retries exhausted; `last` is the final failure
    #[error("Max retries exceeded for vertex {vertex_id}: {attempts} attempts")]
    MaxRetriesExceeded {
        vertex_id: VertexId,
        attempts: usize,
        #[source]
        last: Box<PregelError>,
    },

    #[error("Checkpoint workflow mismatch: expected {expected}, found {found}")]
    CheckpointMismatch { expected: String, found: String },

    #[error("No checkpoint to resume for workflow {0}")]
    NothingToResume(String),
}

impl PregelError {
    pub fn vertex_error(vertex_id: impl Into<VertexId>, message: impl Into<String>) -> Self {
        Self::VertexError {
            vertex_id: vertex_id.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn vertex_error_with_source(
        vertex_id: impl Into<VertexId>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::VertexError {
            vertex_id: vertex_id.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Timeouts and vertex errors may be retried by the runtime
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PregelError::VertexTimeout(_) | PregelError::VertexError { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PregelError::VertexTimeout(_))
    }

    pub fn checkpoint_error(message: impl Into<String>) -> Self {
        Self::CheckpointError(message.into())
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    pub fn checkpoint_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::CheckpointMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}
