//! Tavily web search backend
//!
//! POSTs to `{base_url}/search` with a bearer token. Timeouts, connection
//! failures, 429s and 5xx responses are retried with exponential backoff.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{with_retry, EvidenceDocument, EvidenceLookup, LookupError};

const DEFAULT_BASE_URL: &str = "https://api.tavily.com";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Tavily caps a single query at 400 characters
const MAX_QUERY_CHARS: usize = 400;

pub struct TavilySearch {
    api_key: String,
    client: Client,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 0,
            retry_base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
        }
    }

    /// Create from environment variable TAVILY_API_KEY
    pub fn from_env() -> Result<Self, LookupError> {
        let api_key = std::env::var("TAVILY_API_KEY")
            .map_err(|_| LookupError::MissingConfig("TAVILY_API_KEY environment variable not set".to_string()))?;
        Ok(Self::new(api_key))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retry transient failures with exponential backoff. Off by default.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    async fn execute_single_request(&self, request: &TavilyRequest<'_>) -> Result<TavilyResponse, LookupError> {
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(LookupError::from_transport)?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| LookupError::ParseError(e.to_string()));
        }

        let error_text = response.text().await.unwrap_or_default();
        Err(LookupError::from_status(status.as_u16(), error_text))
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
    search_depth: &'static str,
    topic: &'static str,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default)]
    content: String,
}

#[async_trait]
impl EvidenceLookup for TavilySearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<EvidenceDocument>, LookupError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(LookupError::BadRequest("empty search query".to_string()));
        }
        let query = match query.char_indices().nth(MAX_QUERY_CHARS) {
            Some((cut, _)) => &query[..cut],
            None => query,
        };

        let request = TavilyRequest {
            query,
            max_results: max_results.clamp(1, 20),
            search_depth: "basic",
            topic: "general",
        };
        debug!(query, max_results = request.max_results, "Executing Tavily search");

        let response = with_retry("tavily", self.max_retries, self.retry_base_delay, || {
            self.execute_single_request(&request)
        })
        .await?;

        Ok(response
            .results
            .into_iter()
            .take(max_results)
            .map(|result| EvidenceDocument::new(result.url, result.content))
            .collect())
    }

    fn name(&self) -> &str {
        "tavily"
    }
}
