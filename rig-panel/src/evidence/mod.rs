//! Evidence lookup: web search and encyclopedia backends
//!
//! Backends return [`EvidenceDocument`]s; interviews fold them into a single
//! context blob with [`format_documents`] before handing them to the model.
//!
//! ```rust,ignore
//! let sources = EvidenceSources::new(
//!     Arc::new(TavilySearch::from_env()?),
//!     Arc::new(WikipediaSearch::new()),
//! );
//! let docs = sources.search("habit loops", EvidenceProvider::Web, 3).await?;
//! let context = format_documents(&docs);
//! ```

pub mod tavily;
pub mod wikipedia;

pub use tavily::TavilySearch;
pub use wikipedia::WikipediaSearch;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Separator between rendered documents in a context blob
pub const DOCUMENT_SEPARATOR: &str = "\n\n---\n\n";

/// Which backend to query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceProvider {
    Web,
    Encyclopedia,
}

impl std::fmt::Display for EvidenceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvidenceProvider::Web => f.write_str("web"),
            EvidenceProvider::Encyclopedia => f.write_str("encyclopedia"),
        }
    }
}

/// One retrieved document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceDocument {
    /// URL or document path
    pub source: String,
    /// Page or section within the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    pub content: String,
}

impl EvidenceDocument {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            locator: None,
            content: content.into(),
        }
    }

    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = Some(locator.into());
        self
    }

    /// Render as a `<Document>` block for prompting.
    pub fn render(&self) -> String {
        match &self.locator {
            Some(page) => format!(
                "<Document source=\"{}\" page=\"{}\"/>\n{}\n</Document>",
                self.source, page, self.content
            ),
            None => format!("<Document href=\"{}\"/>\n{}\n</Document>", self.source, self.content),
        }
    }
}

/// Render and join documents into one context blob.
pub fn format_documents(documents: &[EvidenceDocument]) -> String {
    documents
        .iter()
        .map(EvidenceDocument::render)
        .collect::<Vec<_>>()
        .join(DOCUMENT_SEPARATOR)
}

/// Typed errors for evidence backends
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthorized - check API key")]
    Unauthorized,

    #[error("Rate limited - too many requests")]
    RateLimited,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("HTTP error ({0}): {1}")]
    HttpError(u16, String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Missing configuration: {0}")]
    MissingConfig(String),
}

impl LookupError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LookupError::Timeout
                | LookupError::Connection(_)
                | LookupError::RateLimited
                | LookupError::ServerError(_, _)
        )
    }

    pub(crate) fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LookupError::Timeout
        } else if e.is_connect() {
            LookupError::Connection(e.to_string())
        } else {
            LookupError::Network(e.to_string())
        }
    }

    pub(crate) fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => LookupError::Unauthorized,
            429 => LookupError::RateLimited,
            400 => LookupError::BadRequest(body),
            500..=599 => LookupError::ServerError(status, body),
            _ => LookupError::HttpError(status, body),
        }
    }
}

/// Run `attempt` until it succeeds, fails permanently, or retries run out.
///
/// Delay doubles from `base_delay` after each transient failure.
pub(crate) async fn with_retry<T, F, Fut>(
    backend: &str,
    max_retries: u32,
    base_delay: Duration,
    mut attempt: F,
) -> Result<T, LookupError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LookupError>>,
{
    let mut tries = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && tries < max_retries => {
                tries += 1;
                let delay = base_delay.saturating_mul(2u32.saturating_pow(tries - 1));
                warn!(backend, attempt = tries, delay_ms = delay.as_millis() as u64, error = %e, "Lookup failed, will retry");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// A document retrieval backend.
#[async_trait]
pub trait EvidenceLookup: Send + Sync {
    /// Up to `max_results` documents for `query`, best first. May be empty.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<EvidenceDocument>, LookupError>;

    fn name(&self) -> &str;
}

/// The two backends interviews draw on.
#[derive(Clone)]
pub struct EvidenceSources {
    web: Arc<dyn EvidenceLookup>,
    encyclopedia: Arc<dyn EvidenceLookup>,
}

impl EvidenceSources {
    pub fn new(web: Arc<dyn EvidenceLookup>, encyclopedia: Arc<dyn EvidenceLookup>) -> Self {
        Self { web, encyclopedia }
    }

    pub fn backend(&self, provider: EvidenceProvider) -> &Arc<dyn EvidenceLookup> {
        match provider {
            EvidenceProvider::Web => &self.web,
            EvidenceProvider::Encyclopedia => &self.encyclopedia,
        }
    }

    pub async fn search(
        &self,
        query: &str,
        provider: EvidenceProvider,
        max_results: usize,
    ) -> Result<Vec<EvidenceDocument>, LookupError> {
        let backend = self.backend(provider);
        let documents = backend.search(query, max_results).await?;
        debug!(%provider, backend = backend.name(), query, found = documents.len(), "Evidence lookup finished");
        Ok(documents)
    }
}

impl std::fmt::Debug for EvidenceSources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvidenceSources")
            .field("web", &self.web.name())
            .field("encyclopedia", &self.encyclopedia.name())
            .finish()
    }
}
