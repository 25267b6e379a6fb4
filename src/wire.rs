//! Wire messages exchanged between controller and target
//!
//! Messages are JSON objects tagged by `type`. Id-keyed maps travel as
//! ordered `[id, value]` lists since ids are structured.

use serde::{Deserialize, Serialize};

use crate::error::WireError;
use crate::fixable::{FixableConfig, FixableId, FixableValue};

/// Logical message shapes of the fixa protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WireMessage {
    /// Sent by the target once a controller connects
    #[serde(rename_all = "camelCase")]
    SessionStart {
        stream_name: String,
        configs: Vec<(FixableId, FixableConfig)>,
        values: Vec<(FixableId, FixableValue)>,
    },
    /// Value updates, applied in order
    ValueBatch {
        values: Vec<(FixableId, FixableValue)>,
    },
    /// Either side ending the session
    SessionEnd,
}

impl WireMessage {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            WireMessage::SessionStart { .. } => "SessionStart",
            WireMessage::ValueBatch { .. } => "ValueBatch",
            WireMessage::SessionEnd => "SessionEnd",
        }
    }
}

pub fn encode(message: &WireMessage) -> Result<Vec<u8>, WireError> {
    serde_json::to_vec(message).map_err(WireError::Encode)
}

pub fn decode(frame: &[u8]) -> Result<WireMessage, WireError> {
    serde_json::from_slice(frame).map_err(WireError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixable::FixableDisplay;

    #[test]
    fn test_session_start_shape() {
        let message = WireMessage::SessionStart {
            stream_name: "envelope".to_string(),
            configs: vec![(
                FixableId::new("open"),
                FixableConfig::Bool {
                    display: FixableDisplay::new("Open", 1),
                },
            )],
            values: vec![(FixableId::new("open"), FixableValue::Bool(true))],
        };

        let json: serde_json::Value = serde_json::from_slice(&encode(&message).unwrap()).unwrap();
        assert_eq!(json["type"], "sessionStart");
        assert_eq!(json["streamName"], "envelope");
        assert_eq!(json["values"][0][0]["name"], "open");

        assert_eq!(decode(&encode(&message).unwrap()).unwrap(), message);
    }

    #[test]
    fn test_session_end_is_bare_tag() {
        let bytes = encode(&WireMessage::SessionEnd).unwrap();
        assert_eq!(bytes, br#"{"type":"sessionEnd"}"#);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode(b"not json"), Err(WireError::Decode(_))));
        assert!(matches!(
            decode(br#"{"type":"valueBatch","values":[["x", 1]]}"#),
            Err(WireError::Decode(_))
        ));
        assert!(decode(br#"{"type":"shrug"}"#).is_err());
    }
}
