//! Deterministic collaborators for unit tests

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::ReportError;
use crate::evidence::{EvidenceDocument, EvidenceLookup, LookupError};
use crate::llm::{CompletionService, OutputSchema};
use crate::state::Message;

/// Answers by recognizing which prompt it was given.
pub struct FakeLlm {
    panel_size: usize,
    overrides: HashMap<String, serde_json::Value>,
    failing_persona: Option<String>,
    questions: AtomicUsize,
    calls: Mutex<Vec<Vec<Message>>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeLlm {
    pub fn new(panel_size: usize) -> Self {
        Self {
            panel_size,
            overrides: HashMap::new(),
            failing_persona: None,
            questions: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            latency: None,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Hold every free-text completion for `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Most free-text completions that were awaiting a reply at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn with_structured(mut self, schema: &str, value: serde_json::Value) -> Self {
        self.overrides.insert(schema.to_string(), value);
        self
    }

    /// Fail any completion whose system prompt mentions `name`.
    pub fn failing_for(mut self, name: &str) -> Self {
        self.failing_persona = Some(name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }

    async fn pace(&self) {
        let Some(latency) = self.latency else { return };
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn record(&self, messages: &[Message]) -> Result<String, ReportError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        let system = messages.first().map(|m| m.content.clone()).unwrap_or_default();
        if let Some(name) = &self.failing_persona {
            if system.contains(name.as_str()) {
                return Err(ReportError::Service(format!("upstream refused {}", name)));
            }
        }
        Ok(system)
    }
}

#[async_trait]
impl CompletionService for FakeLlm {
    async fn complete(&self, messages: &[Message]) -> Result<Message, ReportError> {
        let system = self.record(messages)?;
        self.pace().await;
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();

        let text = if system.starts_with("You are a developer interviewing") {
            let n = self.questions.fetch_add(1, Ordering::SeqCst) + 1;
            format!("Question {}: how do streaks affect retention?", n)
        } else if system.starts_with("You are an expert being interviewed") {
            "Streaks lift retention [1].\n[1] https://example.com/streaks".to_string()
        } else if system.starts_with("You are an expert technical writer") {
            "## Streaks\n### Summary\nFindings.\n### Sources\n[1] https://example.com/streaks".to_string()
        } else if system.starts_with("You are a technical writer creating") {
            "## Insights\nPanel findings [1].\n## Sources\n[1] https://example.com/streaks".to_string()
        } else if last.contains("introduction") {
            "# Habits\n## Introduction\nWhat the panel found.".to_string()
        } else {
            "## Conclusion\nWhat it means.".to_string()
        };
        Ok(Message::ai(text))
    }

    async fn complete_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<serde_json::Value, ReportError> {
        self.record(messages)?;
        if let Some(value) = self.overrides.get(&schema.name) {
            return Ok(value.clone());
        }
        Ok(match schema.name.as_str() {
            "RequirementsSummary" => json!({ "requirements": "- daily check-ins\n- streaks" }),
            "PersonaPanel" => {
                let personas: Vec<_> = (1..=self.panel_size)
                    .map(|i| {
                        json!({
                            "affiliation": "Indie studio",
                            "name": format!("Dev {}", i),
                            "role": "Engineer",
                            "description": format!("Theme {}", i)
                        })
                    })
                    .collect();
                json!({ "personas": personas })
            }
            _ => json!({ "search_query": "habit streak retention" }),
        })
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Returns the same documents for every query.
pub struct FixedLookup {
    documents: Vec<EvidenceDocument>,
    pub queries: Arc<Mutex<Vec<String>>>,
}

impl FixedLookup {
    pub fn new(documents: Vec<EvidenceDocument>) -> Self {
        Self {
            documents,
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl EvidenceLookup for FixedLookup {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<EvidenceDocument>, LookupError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.documents.iter().take(max_results).cloned().collect())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}
