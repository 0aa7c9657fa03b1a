//! Completion service interface and configuration

pub mod config;
pub mod provider;

pub use config::{LLMConfig, TokenUsage};
pub use provider::{complete_as, CompletionService, OutputSchema, StructuredOutput};
