//! Core types for quorumcast
//!
//! Defines the topic set, node identifiers and the fixed protocol constants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::QuorumcastError;

/// Fraction of the snapshotted ready-node count that must vote `valid`.
pub const QUORUM_RATIO: f64 = 0.9;

/// Length of a vote window in milliseconds.
pub const VOTE_WINDOW_MS: u64 = 2000;

/// Length of a vote window.
pub const VOTE_WINDOW: Duration = Duration::from_millis(VOTE_WINDOW_MS);

/// Topic names as they appear on the wire
pub const TOPIC_VALIDATION: &str = "validation-topic";
pub const TOPIC_VOTE: &str = "vote-topic";
pub const TOPIC_FINAL: &str = "final-destination";

/// Pub/sub topics used by the validation protocol
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Topic {
    /// Validation requests addressed to the leader
    Validation,
    /// Anonymous ballots for the open window
    Vote,
    /// Approved payloads on their way to the addressee
    FinalDestination,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::Validation, Topic::Vote, Topic::FinalDestination];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Validation => TOPIC_VALIDATION,
            Topic::Vote => TOPIC_VOTE,
            Topic::FinalDestination => TOPIC_FINAL,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = QuorumcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            TOPIC_VALIDATION => Ok(Topic::Validation),
            TOPIC_VOTE => Ok(Topic::Vote),
            TOPIC_FINAL => Ok(Topic::FinalDestination),
            other => Err(QuorumcastError::UnknownTopic(other.to_string())),
        }
    }
}

/// Node identifier, unique per run
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}
