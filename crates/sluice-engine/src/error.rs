//! Error types for the sluice engine

use serde_json::Value;
use thiserror::Error;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur in the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Component name not present in the registry
    #[error("Unknown component: {0}")]
    UnknownComponent(String),

    /// Node id referenced by an edge, IIP, or capture does not exist
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// Component carries metadata but no executable wrapper
    #[error("No wrapper fRunUpdater function found! Cannot run updater.")]
    MissingWrapper,

    /// One or more problems found while building a network
    #[error("Network validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Delivery attempted after the receiving driver stopped
    #[error("Send to stopped node '{node}' port '{port}'")]
    SendFailed { node: String, port: String },
}

/// Failure reported by an updater.
///
/// Updater failures are pipeline data rather than engine errors: the
/// scheduler records them on the owning VNI's error state and forwards
/// them on the error channel instead of unwinding.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct UpdaterError {
    message: String,
    payload: Option<Value>,
}

impl UpdaterError {
    /// Create an error carrying just a message
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            payload: None,
        }
    }

    /// Create an error carrying a structured payload
    pub fn with_payload(message: impl Into<String>, payload: Value) -> Self {
        Self {
            message: message.into(),
            payload: Some(payload),
        }
    }

    /// The value recorded on the error state: the payload if one was
    /// attached, otherwise the message as a JSON string.
    pub fn into_value(self) -> Value {
        match self.payload {
            Some(payload) => payload,
            None => Value::String(self.message),
        }
    }
}

impl From<std::io::Error> for UpdaterError {
    fn from(err: std::io::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<serde_json::Error> for UpdaterError {
    fn from(err: serde_json::Error) -> Self {
        Self::msg(err.to_string())
    }
}
