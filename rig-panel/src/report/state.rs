//! Report run state
//!
//! [`RunState`] is threaded through the top-level graph; each interview
//! sub-workflow runs over its own [`InterviewState`]. Both implement
//! `WorkflowState` so the Pregel runtime can merge and apply the updates
//! produced in one superstep.

use serde::{Deserialize, Serialize};

use crate::evidence::DOCUMENT_SEPARATOR;
use crate::pregel::{StateUpdate, WorkflowState};
use crate::state::Message;

/// Layout version of [`RunState`]; bumped when a field changes meaning
pub const RUN_STATE_VERSION: u32 = 1;

/// A synthesized panelist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    /// Primary affiliation of the panelist
    pub affiliation: String,
    pub name: String,
    /// Role of the panelist in the context of the topic
    pub role: String,
    /// Focus, concerns and motives
    pub description: String,
}

impl Persona {
    pub fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        affiliation: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            affiliation: affiliation.into(),
            name: name.into(),
            role: role.into(),
            description: description.into(),
        }
    }

    /// Text block describing the persona for prompting
    pub fn sheet(&self) -> String {
        format!(
            "Name: {}\nRole: {}\nAffiliation: {}\nDescription: {}\n",
            self.name, self.role, self.affiliation, self.description
        )
    }
}

fn current_version() -> u32 {
    RUN_STATE_VERSION
}

/// Progress of one report run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunState {
    #[serde(default = "current_version")]
    pub version: u32,

    pub topic: String,

    /// Upper bound on the number of personas
    pub max_personas: usize,

    /// Reviewer feedback from the latest checkpoint; `None` means approve
    #[serde(default)]
    pub human_feedback: Option<String>,

    #[serde(default)]
    pub requirements: Option<String>,

    #[serde(default)]
    pub personas: Vec<Persona>,

    /// One section per finished interview, in arrival order
    #[serde(default)]
    pub sections: Vec<String>,

    #[serde(default)]
    pub introduction: Option<String>,

    #[serde(default)]
    pub body: Option<String>,

    #[serde(default)]
    pub conclusion: Option<String>,

    #[serde(default)]
    pub final_report: Option<String>,
}

impl RunState {
    pub fn new(topic: impl Into<String>, max_personas: usize) -> Self {
        Self {
            version: RUN_STATE_VERSION,
            topic: topic.into(),
            max_personas,
            ..Default::default()
        }
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.human_feedback = Some(feedback.into());
        self
    }

    /// All sections joined into one blob for the assembly prompts
    pub fn joined_sections(&self) -> String {
        self.sections.join("\n\n")
    }
}

/// Fields written by one superstep of the report graph
#[derive(Debug, Clone, Default)]
pub struct RunUpdate {
    pub requirements: Option<String>,
    pub personas: Option<Vec<Persona>>,
    pub sections: Vec<String>,
    pub introduction: Option<String>,
    pub body: Option<String>,
    pub conclusion: Option<String>,
    pub final_report: Option<String>,
}

impl RunUpdate {
    pub fn requirements(requirements: impl Into<String>) -> Self {
        Self {
            requirements: Some(requirements.into()),
            ..Default::default()
        }
    }

    pub fn personas(personas: Vec<Persona>) -> Self {
        Self {
            personas: Some(personas),
            ..Default::default()
        }
    }

    pub fn sections(sections: Vec<String>) -> Self {
        Self {
            sections,
            ..Default::default()
        }
    }

    pub fn final_report(report: impl Into<String>) -> Self {
        Self {
            final_report: Some(report.into()),
            ..Default::default()
        }
    }
}

impl StateUpdate for RunUpdate {
    fn empty() -> Self {
        Self::default()
    }

    fn is_empty(&self) -> bool {
        self.requirements.is_none()
            && self.personas.is_none()
            && self.sections.is_empty()
            && self.introduction.is_none()
            && self.body.is_none()
            && self.conclusion.is_none()
            && self.final_report.is_none()
    }
}

impl WorkflowState for RunState {
    type Update = RunUpdate;

    fn apply_update(&self, update: Self::Update) -> Self {
        let mut next = self.clone();

        if let Some(requirements) = update.requirements {
            next.requirements = Some(requirements);
        }
        if let Some(personas) = update.personas {
            next.personas = personas;
        }
        next.sections.extend(update.sections);
        if let Some(introduction) = update.introduction {
            next.introduction = Some(introduction);
        }
        if let Some(body) = update.body {
            next.body = Some(body);
        }
        if let Some(conclusion) = update.conclusion {
            next.conclusion = Some(conclusion);
        }
        if let Some(report) = update.final_report {
            next.final_report = Some(report);
        }

        next
    }

    fn merge_updates(updates: Vec<Self::Update>) -> Self::Update {
        // scalar fields have a single writer per superstep
        updates.into_iter().fold(RunUpdate::default(), |mut merged, update| {
            merged.requirements = update.requirements.or(merged.requirements);
            merged.personas = update.personas.or(merged.personas);
            merged.sections.extend(update.sections);
            merged.introduction = update.introduction.or(merged.introduction);
            merged.body = update.body.or(merged.body);
            merged.conclusion = update.conclusion.or(merged.conclusion);
            merged.final_report = update.final_report.or(merged.final_report);
            merged
        })
    }

    fn is_terminal(&self) -> bool {
        self.final_report.is_some()
    }
}

/// Opening input for one interview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewSeed {
    pub persona: Persona,
    pub messages: Vec<Message>,
}

impl InterviewSeed {
    pub fn opening(persona: Persona, topic: &str) -> Self {
        Self {
            persona,
            messages: vec![Message::human(format!(
                "So you said you were writing an article on {}?",
                topic
            ))],
        }
    }
}

/// One persona's interview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewState {
    pub persona: Persona,
    pub topic: String,
    pub messages: Vec<Message>,
    /// Formatted evidence blobs, one per lookup
    #[serde(default)]
    pub context: Vec<String>,
    pub max_turns: usize,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
}

impl InterviewState {
    pub fn seeded(seed: InterviewSeed, topic: impl Into<String>, max_turns: usize) -> Self {
        Self {
            persona: seed.persona,
            topic: topic.into(),
            messages: seed.messages,
            context: Vec::new(),
            max_turns,
            transcript: None,
            section: None,
        }
    }

    pub fn joined_context(&self) -> String {
        self.context.join(DOCUMENT_SEPARATOR)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InterviewUpdate {
    pub messages: Vec<Message>,
    pub context: Vec<String>,
    pub transcript: Option<String>,
    pub section: Option<String>,
}

impl InterviewUpdate {
    pub fn message(message: Message) -> Self {
        Self {
            messages: vec![message],
            ..Default::default()
        }
    }

    pub fn context(blob: String) -> Self {
        Self {
            context: vec![blob],
            ..Default::default()
        }
    }
}

impl StateUpdate for InterviewUpdate {
    fn empty() -> Self {
        Self::default()
    }

    fn is_empty(&self) -> bool {
        self.messages.is_empty()
            && self.context.is_empty()
            && self.transcript.is_none()
            && self.section.is_none()
    }
}

impl WorkflowState for InterviewState {
    type Update = InterviewUpdate;

    fn apply_update(&self, update: Self::Update) -> Self {
        let mut next = self.clone();
        next.messages.extend(update.messages);
        next.context.extend(update.context);
        if let Some(transcript) = update.transcript {
            next.transcript = Some(transcript);
        }
        if let Some(section) = update.section {
            next.section = Some(section);
        }
        next
    }

    fn merge_updates(updates: Vec<Self::Update>) -> Self::Update {
        updates.into_iter().fold(InterviewUpdate::default(), |mut merged, update| {
            merged.messages.extend(update.messages);
            merged.context.extend(update.context);
            merged.transcript = update.transcript.or(merged.transcript);
            merged.section = update.section.or(merged.section);
            merged
        })
    }

    fn is_terminal(&self) -> bool {
        self.section.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persona() -> Persona {
        Persona::new(
            "Priya Nair",
            "Mobile engineer",
            "Independent",
            "Cares about offline sync and battery use.",
        )
    }

    #[test]
    fn test_persona_sheet() {
        assert_eq!(
            persona().sheet(),
            "Name: Priya Nair\nRole: Mobile engineer\nAffiliation: Independent\n\
             Description: Cares about offline sync and battery use.\n"
        );
    }

    #[test]
    fn test_run_update_overwrites_and_appends() {
        let state = RunState::new("habit-tracking app", 2);
        let state = state.apply_updates(vec![
            RunUpdate::requirements("- daily check-ins"),
            RunUpdate::sections(vec!["## A".into()]),
        ]);
        let state = state.apply_updates(vec![
            RunUpdate::requirements("- daily check-ins\n- reminders"),
            RunUpdate::sections(vec!["## B".into()]),
        ]);

        assert_eq!(state.requirements.as_deref(), Some("- daily check-ins\n- reminders"));
        assert_eq!(state.sections, vec!["## A".to_string(), "## B".to_string()]);
        assert!(!state.is_terminal());
    }

    #[test]
    fn test_run_state_terminal_on_final_report() {
        let state = RunState::new("x", 1).apply_update(RunUpdate::final_report("# Done"));
        assert!(state.is_terminal());
    }

    #[test]
    fn test_merge_keeps_every_assembly_field() {
        let merged = RunState::merge_updates(vec![
            RunUpdate {
                body: Some("body".into()),
                ..Default::default()
            },
            RunUpdate {
                introduction: Some("intro".into()),
                ..Default::default()
            },
            RunUpdate {
                conclusion: Some("outro".into()),
                ..Default::default()
            },
        ]);

        assert_eq!(merged.body.as_deref(), Some("body"));
        assert_eq!(merged.introduction.as_deref(), Some("intro"));
        assert_eq!(merged.conclusion.as_deref(), Some("outro"));
        assert!(!merged.is_empty());
        assert!(RunUpdate::empty().is_empty());
    }

    #[test]
    fn test_run_state_serde_defaults() {
        let state: RunState =
            serde_json::from_str(r#"{"topic": "habit-tracking app", "max_personas": 3}"#).unwrap();
        assert_eq!(state.version, RUN_STATE_VERSION);
        assert!(state.human_feedback.is_none());
        assert!(state.personas.is_empty());
    }

    #[test]
    fn test_interview_seed_and_merge() {
        let seed = InterviewSeed::opening(persona(), "habit-tracking app");
        assert_eq!(
            seed.messages[0].content,
            "So you said you were writing an article on habit-tracking app?"
        );

        let state = InterviewState::seeded(seed, "habit-tracking app", 2);
        let next = state.apply_updates(vec![
            InterviewUpdate::context("web docs".into()),
            InterviewUpdate::context("wiki docs".into()),
        ]);

        assert_eq!(next.context.len(), 2);
        assert_eq!(next.joined_context(), format!("web docs{}wiki docs", DOCUMENT_SEPARATOR));
        assert!(!next.is_terminal());

        let done = next.apply_update(InterviewUpdate {
            section: Some("## Offline first".into()),
            ..Default::default()
        });
        assert!(done.is_terminal());
    }
}
