//! Wire messages for the validation protocol
//!
//! Every payload is a UTF-8 JSON object. The schema is selected by the
//! topic the payload arrived on, never by sniffing its fields.

use quorumcast_core::{QuorumcastError, QuorumcastResult, Topic};
use serde::{Deserialize, Serialize};

/// Request for the leader to run a vote on a data transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub from: String,
    pub to: String,
    pub data: String,
}

impl ValidationRequest {
    pub fn new(from: impl Into<String>, to: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            data: data.into(),
        }
    }
}

/// Anonymous ballot for the currently open window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub valid: bool,
}

impl Vote {
    pub fn approve() -> Self {
        Self { valid: true }
    }

    pub fn reject() -> Self {
        Self { valid: false }
    }
}

/// Approved payload delivered to its addressee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalMessage {
    pub from: String,
    pub to: String,
    pub data: String,
}

impl From<ValidationRequest> for FinalMessage {
    fn from(req: ValidationRequest) -> Self {
        Self {
            from: req.from,
            to: req.to,
            data: req.data,
        }
    }
}

/// Decoded protocol message, one variant per topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolMessage {
    ValidationRequest(ValidationRequest),
    Vote(Vote),
    Final(FinalMessage),
}

impl ProtocolMessage {
    /// Decode a payload according to the schema of `topic`
    pub fn decode(topic: Topic, payload: &[u8]) -> QuorumcastResult<Self> {
        let decode_err = |e: serde_json::Error| QuorumcastError::MessageDecode {
            topic: topic.to_string(),
            reason: e.to_string(),
        };

        Ok(match topic {
            Topic::Validation => {
                ProtocolMessage::ValidationRequest(serde_json::from_slice(payload).map_err(decode_err)?)
            }
            Topic::Vote => ProtocolMessage::Vote(serde_json::from_slice(payload).map_err(decode_err)?),
            Topic::FinalDestination => {
                ProtocolMessage::Final(serde_json::from_slice(payload).map_err(decode_err)?)
            }
        })
    }

    pub fn encode(&self) -> QuorumcastResult<Vec<u8>> {
        let bytes = match self {
            ProtocolMessage::ValidationRequest(req) => serde_json::to_vec(req)?,
            ProtocolMessage::Vote(vote) => serde_json::to_vec(vote)?,
            ProtocolMessage::Final(msg) => serde_json::to_vec(msg)?,
        };
        Ok(bytes)
    }

    /// Topic this message travels on
    pub fn topic(&self) -> Topic {
        match self {
            ProtocolMessage::ValidationRequest(_) => Topic::Validation,
            ProtocolMessage::Vote(_) => Topic::Vote,
            ProtocolMessage::Final(_) => Topic::FinalDestination,
        }
    }
}

impl From<ValidationRequest> for ProtocolMessage {
    fn from(req: ValidationRequest) -> Self {
        ProtocolMessage::ValidationRequest(req)
    }
}

impl From<Vote> for ProtocolMessage {
    fn from(vote: Vote) -> Self {
        ProtocolMessage::Vote(vote)
    }
}

impl From<FinalMessage> for ProtocolMessage {
    fn from(msg: FinalMessage) -> Self {
        ProtocolMessage::Final(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let msg = ProtocolMessage::from(ValidationRequest::new("Computer_A", "Computer_B", "Hello from A!"));
        let bytes = msg.encode().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["from"], "Computer_A");
        assert_eq!(value["to"], "Computer_B");
        assert_eq!(value["data"], "Hello from A!");
        assert_eq!(msg.topic(), Topic::Validation);
    }

    #[test]
    fn test_roundtrip_preserves_unicode_and_empty() {
        let cases = vec![
            ProtocolMessage::from(ValidationRequest::new("", "", "")),
            ProtocolMessage::from(FinalMessage {
                from: "ノード".into(),
                to: "Überträger".into(),
                data: "🚀 \"quoted\"\n\ttabbed".into(),
            }),
            ProtocolMessage::from(Vote::reject()),
        ];

        for msg in cases {
            let bytes = msg.encode().unwrap();
            assert_eq!(ProtocolMessage::decode(msg.topic(), &bytes).unwrap(), msg);
        }
    }

    #[test]
    fn test_decode_vote_from_foreign_encoder() {
        let msg = ProtocolMessage::decode(Topic::Vote, br#"{ "valid": true }"#).unwrap();
        assert_eq!(msg, ProtocolMessage::Vote(Vote::approve()));
    }

    #[test]
    fn test_decode_rejects_malformed_payload() {
        let err = ProtocolMessage::decode(Topic::FinalDestination, b"not json").unwrap_err();
        match err {
            QuorumcastError::MessageDecode { topic, .. } => assert_eq!(topic, "final-destination"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_rejects_schema_of_other_topic() {
        let vote = ProtocolMessage::from(Vote::approve()).encode().unwrap();
        assert!(ProtocolMessage::decode(Topic::Validation, &vote).is_err());
    }
}
