//! Message types for Pregel vertex communication
//!
//! Messages sent during superstep N are delivered at the start of N + 1.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Trait bound for vertex messages
pub trait VertexMessage: Clone + Send + Sync + 'static {
    /// Payload-free message used for edge-driven activation
    fn activation_message() -> Self;
}

/// Standard message types for workflow coordination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkflowMessage {
    /// Wake the receiving vertex
    Activate,

    /// Keyed payload between vertices
    Data {
        key: String,
        value: serde_json::Value,
    },
}

impl VertexMessage for WorkflowMessage {
    fn activation_message() -> Self {
        WorkflowMessage::Activate
    }
}

impl WorkflowMessage {
    /// Create a Data message
    pub fn data(key: impl Into<String>, value: impl Serialize) -> Self {
        Self::Data {
            key: key.into(),
            value: serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Decode the payload if this is a `Data` message under `key`.
    pub fn decode<T: DeserializeOwned>(&self, key: &str) -> Option<Result<T, serde_json::Error>> {
        match self {
            WorkflowMessage::Data { key: k, value } if k == key => {
                Some(serde_json::from_value(value.clone()))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_workflow_message_serialization() {
        let msg = WorkflowMessage::data("query", "habit tracking");
        let json_str = serde_json::to_string(&msg).unwrap();
        let deserialized: WorkflowMessage = serde_json::from_str(&json_str).unwrap();

        assert_eq!(deserialized, msg);
        assert_eq!(
            deserialized,
            WorkflowMessage::Data {
                key: "query".into(),
                value: json!("habit tracking"),
            }
        );
    }

    #[test]
    fn test_activation_message() {
        assert_eq!(WorkflowMessage::activation_message(), WorkflowMessage::Activate);
    }

    #[test]
    fn test_decode_matches_key_only() {
        let msg = WorkflowMessage::data("count", 3u32);

        let decoded: u32 = msg.decode("count").unwrap().unwrap();
        assert_eq!(decoded, 3);
        assert!(msg.decode::<u32>("other").is_none());
        assert!(WorkflowMessage::Activate.decode::<u32>("count").is_none());
    }

    #[test]
    fn test_decode_type_mismatch_is_error() {
        let msg = WorkflowMessage::data("count", "three");
        assert!(msg.decode::<u32>("count").unwrap().is_err());
    }
}
