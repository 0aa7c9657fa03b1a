//! # Configuration Module
//!
//! Loads the CLI's settings from environment variables (and a `.env` file).
//! Command-line flags are applied on top in `main.rs`.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

// =============================================================================
// CONFIGURATION STRUCT
// =============================================================================
/// Settings for one report run.
///
/// # Rust Concept: Option for "maybe configured"
/// The API keys have no sensible default, so they are `Option<String>`.
/// `validate()` turns a missing key into a clear error before any network
/// call is made.
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenAI API key used by the completion service
    pub openai_api_key: Option<String>,

    /// Tavily API key used for web evidence
    pub tavily_api_key: Option<String>,

    /// Chat model name (e.g., "gpt-4.1-mini")
    pub model: String,

    /// Expert answers per interview before it wraps up
    pub max_interview_turns: usize,

    /// Where checkpoints are written so a run can be resumed later
    pub checkpoint_dir: PathBuf,
}

// =============================================================================
// DEFAULT IMPLEMENTATION
// =============================================================================
impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            tavily_api_key: None,
            model: "gpt-4.1-mini".to_string(),
            max_interview_turns: 2,
            checkpoint_dir: PathBuf::from(".checkpoints"),
        }
    }
}

// =============================================================================
// CONFIGURATION LOADING
// =============================================================================
impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Rust Concept: The ? Operator
    ///
    /// `?` returns early with the error when a value fails to parse.
    /// `.context()` wraps it with a message naming the offending variable.
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine
        let _ = dotenvy::dotenv();

        let mut config = Config::default();

        config.openai_api_key = non_empty_var("OPENAI_API_KEY");
        config.tavily_api_key = non_empty_var("TAVILY_API_KEY");

        if let Some(val) = non_empty_var("LLM_MODEL") {
            config.model = val;
        }

        if let Some(val) = non_empty_var("MAX_INTERVIEW_TURNS") {
            config.max_interview_turns = val
                .parse()
                .context("MAX_INTERVIEW_TURNS must be a positive integer")?;
        }

        if let Some(val) = non_empty_var("CHECKPOINT_DIR") {
            config.checkpoint_dir = PathBuf::from(val);
        }

        Ok(config)
    }

    /// Fail fast before the first model call.
    pub fn validate(&self) -> Result<()> {
        if self.openai_api_key.is_none() {
            anyhow::bail!("OPENAI_API_KEY must be set (in the environment or a .env file)");
        }

        if self.tavily_api_key.is_none() {
            anyhow::bail!("TAVILY_API_KEY must be set for web evidence lookups");
        }

        if self.model.trim().is_empty() {
            anyhow::bail!("LLM_MODEL cannot be empty");
        }

        if self.max_interview_turns == 0 {
            anyhow::bail!("MAX_INTERVIEW_TURNS must be at least 1");
        }

        Ok(())
    }
}

/// # Rust Concept: Combinators on Result and Option
///
/// `.ok()` drops the error, `.filter()` discards blank values, so an unset
/// and an empty variable are treated the same way.
fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Config {
        Config {
            openai_api_key: Some("sk-test".to_string()),
            tavily_api_key: Some("tvly-test".to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.model, "gpt-4.1-mini");
        assert_eq!(config.max_interview_turns, 2);
        assert_eq!(config.checkpoint_dir, PathBuf::from(".checkpoints"));
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(configured().validate().is_ok());
    }

    #[test]
    fn test_config_validation_missing_keys() {
        assert!(Config::default().validate().is_err());

        let mut config = configured();
        config.tavily_api_key = None;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("TAVILY_API_KEY"));
    }

    #[test]
    fn test_config_validation_invalid_turns() {
        let mut config = configured();
        config.max_interview_turns = 0; // Invalid: must be at least 1
        assert!(config.validate().is_err());
    }
}
