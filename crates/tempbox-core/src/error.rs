//! Error types for the core library.

use thiserror::Error;

use crate::gateway::GatewayError;

/// Errors that can occur in core operations.
///
/// None of these are fatal: every operation that fails can be retried by
/// repeating the action that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Entity is absent on the remote side.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Restore key was rejected (invalid or expired).
    #[error("Restore key rejected")]
    InvalidKey,

    /// Network or remote failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The operation needs an active session and none is set.
    #[error("No active session")]
    NoSession,

    /// The session changed while the operation was in flight; its result
    /// was discarded.
    #[error("Session changed while the operation was in flight")]
    SessionChanged,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(String),
}

impl From<GatewayError> for Error {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(what) => Self::NotFound(what),
            GatewayError::InvalidKey => Self::InvalidKey,
            GatewayError::Transport(msg) => Self::Transport(msg),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err.to_string())
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn gateway_errors_map_to_matching_variants() {
        assert_eq!(
            Error::from(GatewayError::NotFound("session s1".to_string())),
            Error::NotFound("session s1".to_string())
        );
        assert_eq!(Error::from(GatewayError::InvalidKey), Error::InvalidKey);
        assert_eq!(
            Error::from(GatewayError::Transport("timeout".to_string())),
            Error::Transport("timeout".to_string())
        );
    }

    #[test]
    fn display() {
        assert_eq!(Error::NoSession.to_string(), "No active session");
        assert_eq!(
            Error::Transport("connection reset".to_string()).to_string(),
            "Transport error: connection reset"
        );
    }

    #[test]
    fn serde_errors_convert() {
        let err = serde_json::from_str::<u32>("not json").unwrap_err();
        assert!(matches!(Error::from(err), Error::Serde(_)));
    }
}
