//! Shared fakes for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rig_panel::llm::{CompletionService, OutputSchema};
use rig_panel::{EvidenceDocument, EvidenceLookup, EvidenceSources, LookupError, Message, ReportError};

/// Replies by recognizing the step that called it.
///
/// Always proposes `panel_size` personas, however many were asked for.
pub struct ScriptedLlm {
    panel_size: usize,
    questions: AtomicUsize,
    requirement_drafts: AtomicUsize,
    log: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlm {
    pub fn new(panel_size: usize) -> Arc<Self> {
        Arc::new(Self {
            panel_size,
            questions: AtomicUsize::new(0),
            requirement_drafts: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn log(&self) -> Vec<Vec<Message>> {
        self.log.lock().unwrap().clone()
    }

    /// Calls whose system prompt starts with `prefix`
    pub fn calls_starting_with(&self, prefix: &str) -> usize {
        self.log()
            .iter()
            .filter(|call| call.first().is_some_and(|m| m.content.starts_with(prefix)))
            .count()
    }

    pub fn requirement_drafts(&self) -> usize {
        self.requirement_drafts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionService for ScriptedLlm {
    async fn complete(&self, messages: &[Message]) -> Result<Message, ReportError> {
        self.log.lock().unwrap().push(messages.to_vec());
        let system = messages.first().map(|m| m.content.as_str()).unwrap_or_default();
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();

        let text = if system.starts_with("You are a developer interviewing") {
            let n = self.questions.fetch_add(1, Ordering::SeqCst);
            format!("What did you learn about reminders? ({})", n)
        } else if system.starts_with("You are an expert being interviewed") {
            "Gentle reminders beat streak penalties [1].\n[1] https://example.com/reminders".to_string()
        } else if system.starts_with("You are an expert technical writer") {
            "## Reminders\n### Summary\nGentle nudges work.\n### Sources\n[1] https://example.com/reminders"
                .to_string()
        } else if last.starts_with("Write a report based upon") {
            "## Insights\nThe panel agrees on gentle nudges [1].\n## Sources\n[1] https://example.com/reminders"
                .to_string()
        } else if last.contains("introduction") {
            "# Habit Tracking\n## Introduction\nWe asked a panel of developers.".to_string()
        } else {
            "## Conclusion\nNudge, do not punish.".to_string()
        };
        Ok(Message::ai(text))
    }

    async fn complete_structured(&self, messages: &[Message], schema: &OutputSchema) -> Result<Value, ReportError> {
        self.log.lock().unwrap().push(messages.to_vec());
        Ok(match schema.name.as_str() {
            "RequirementsSummary" => {
                let draft = self.requirement_drafts.fetch_add(1, Ordering::SeqCst) + 1;
                json!({ "requirements": format!("Draft {}: reminders, streaks, offline use", draft) })
            }
            "PersonaPanel" => json!({
                "personas": (1..=self.panel_size)
                    .map(|i| json!({
                        "affiliation": "Mobile studio",
                        "name": format!("Panelist {}", i),
                        "role": "Developer",
                        "description": format!("Focus area {}", i),
                    }))
                    .collect::<Vec<_>>()
            }),
            "SearchQuery" => json!({ "search_query": "habit app reminders" }),
            other => return Err(ReportError::schema_violation(other, "unexpected schema")),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Returns one fixed document and remembers every query.
pub struct StaticLookup {
    document: EvidenceDocument,
    queries: Mutex<Vec<String>>,
}

impl StaticLookup {
    pub fn new(document: EvidenceDocument) -> Arc<Self> {
        Arc::new(Self {
            document,
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl EvidenceLookup for StaticLookup {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<EvidenceDocument>, LookupError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(std::iter::once(self.document.clone()).take(max_results).collect())
    }

    fn name(&self) -> &str {
        "static"
    }
}

pub fn static_sources() -> EvidenceSources {
    EvidenceSources::new(
        StaticLookup::new(EvidenceDocument::new("https://example.com/reminders", "Reminders help.")),
        StaticLookup::new(
            EvidenceDocument::new("https://en.wikipedia.org/wiki/Habit", "A habit is a routine.")
                .with_locator("Habit"),
        ),
    )
}
