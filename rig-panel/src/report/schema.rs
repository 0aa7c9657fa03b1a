//! Structured outputs requested from the completion service

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::llm::{OutputSchema, StructuredOutput};

use super::state::Persona;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementsSummary {
    pub requirements: String,
}

impl StructuredOutput for RequirementsSummary {
    fn schema() -> OutputSchema {
        OutputSchema {
            name: "RequirementsSummary".to_string(),
            description: "Functional requirements of the idea with suggestions, presumptions and clarifying questions."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "requirements": {
                        "type": "string",
                        "description": "Comprehensive list of functional requirements with suggestions, presumptions, and questions."
                    }
                },
                "required": ["requirements"]
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaPanel {
    pub personas: Vec<Persona>,
}

impl StructuredOutput for PersonaPanel {
    fn schema() -> OutputSchema {
        OutputSchema {
            name: "PersonaPanel".to_string(),
            description: "The panel of developer personas, one per theme.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "personas": {
                        "type": "array",
                        "description": "Developers with their roles and affiliations.",
                        "items": {
                            "type": "object",
                            "properties": {
                                "affiliation": { "type": "string", "description": "Primary affiliation of the developer." },
                                "name": { "type": "string", "description": "Name of the developer." },
                                "role": { "type": "string", "description": "Role of the developer in the context of the topic." },
                                "description": { "type": "string", "description": "The developer's focus, concerns, and motives." }
                            },
                            "required": ["affiliation", "name", "role", "description"]
                        }
                    }
                },
                "required": ["personas"]
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub search_query: String,
}

impl StructuredOutput for SearchQuery {
    fn schema() -> OutputSchema {
        OutputSchema {
            name: "SearchQuery".to_string(),
            description: "A search query for retrieval.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "search_query": { "type": "string", "description": "Search query for retrieval." }
                },
                "required": ["search_query"]
            }),
        }
    }
}
