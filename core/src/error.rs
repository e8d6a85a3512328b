//! Error types for quorumcast

use thiserror::Error;

/// Main error type for quorumcast
#[derive(Error, Debug)]
pub enum QuorumcastError {
    // ============ Node Lifecycle Errors ============
    #[error("Node {node} failed to start: {reason}")]
    StartupFailure { node: String, reason: String },

    #[error("No ready node with pub/sub available to lead")]
    NoLeaderAvailable,

    #[error("Node {0} is not ready")]
    NodeNotReady(String),

    // ============ Protocol Errors ============
    #[error("Failed to decode message on {topic}: {reason}")]
    MessageDecode { topic: String, reason: String },

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("Validation window already open")]
    WindowBusy,

    // ============ Network Errors ============
    #[error("Publish failed: {0}")]
    PublishFailure(String),

    #[error("Subscription failed: {0}")]
    Subscription(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Message serialization failed: {0}")]
    SerializationError(String),

    // ============ Configuration Errors ============
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // ============ General Errors ============
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for QuorumcastError {
    fn from(err: std::io::Error) -> Self {
        QuorumcastError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for QuorumcastError {
    fn from(err: serde_json::Error) -> Self {
        QuorumcastError::SerializationError(err.to_string())
    }
}

/// Result type for quorumcast operations
pub type QuorumcastResult<T> = Result<T, QuorumcastError>;
