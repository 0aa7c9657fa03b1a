//! Encyclopedia backend over the MediaWiki action API
//!
//! One `generator=search` query returns matching pages together with their
//! plain-text intro extract and canonical URL.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{with_retry, EvidenceDocument, EvidenceLookup, LookupError};

const DEFAULT_BASE_URL: &str = "https://en.wikipedia.org";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

const RETRY_BASE_DELAY_MS: u64 = 500;

const USER_AGENT: &str = concat!("rig-panel/", env!("CARGO_PKG_VERSION"));

pub struct WikipediaSearch {
    client: Client,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl Default for WikipediaSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl WikipediaSearch {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 0,
            retry_base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
        }
    }

    /// Point at another MediaWiki site, e.g. `https://de.wikipedia.org`.
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

    async fn execute_single_request(&self, query: &str, limit: usize) -> Result<QueryResponse, LookupError> {
        let limit = limit.to_string();
        let response = self
            .client
            .get(format!("{}/w/api.php", self.base_url))
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(self.timeout)
            .query(&[
                ("action", "query"),
                ("generator", "search"),
                ("gsrsearch", query),
                ("gsrlimit", limit.as_str()),
                ("prop", "extracts|info"),
                ("inprop", "url"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("format", "json"),
                ("formatversion", "2"),
            ])
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

#[derive(Debug, Deserialize)]
struct QueryResponse {
    /// Absent when the search matched nothing
    #[serde(default)]
    query: Option<QueryPages>,
}

#[derive(Debug, Deserialize)]
struct QueryPages {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: String,
    /// Search rank, 1-based
    #[serde(default)]
    index: usize,
    #[serde(default)]
    extract: String,
    #[serde(default)]
    fullurl: Option<String>,
}

impl Page {
    fn into_document(self, base_url: &str) -> EvidenceDocument {
        let source = self
            .fullurl
            .unwrap_or_else(|| format!("{}/wiki/{}", base_url, self.title.replace(' ', "_")));
        EvidenceDocument::new(source, self.extract).with_locator(self.title)
    }
}

#[async_trait]
impl EvidenceLookup for WikipediaSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<EvidenceDocument>, LookupError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(LookupError::BadRequest("empty search query".to_string()));
        }
        let limit = max_results.clamp(1, 50);
        debug!(query, limit, "Executing encyclopedia search");

        let response = with_retry("wikipedia", self.max_retries, self.retry_base_delay, || {
            self.execute_single_request(query, limit)
        })
        .await?;

        let mut pages = response.query.map(|q| q.pages).unwrap_or_default();
        pages.sort_by_key(|page| page.index);

        Ok(pages
            .into_iter()
            .filter(|page| !page.extract.trim().is_empty())
            .take(max_results)
            .map(|page| page.into_document(&self.base_url))
            .collect())
    }

    fn name(&self) -> &str {
        "wikipedia"
    }
}
