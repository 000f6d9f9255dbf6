//! Error taxonomy shared by every component of the relay.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Error, Debug)]
pub enum RelayError {
    /// Missing or malformed configuration. The only process-fatal kind.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The remote answered, but without the fields the protocol requires.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Network or HTTP failure on a signed call or feed fetch.
    #[error("Transport error{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// Reading or writing a state file failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Request signing material could not be produced locally.
    #[error("Signing error: {0}")]
    Signing(String),
}

impl RelayError {
    pub fn transport(message: impl Into<String>) -> Self {
        RelayError::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// Only configuration errors stop the process; everything else is
    /// logged and retried on a later tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::Config(_))
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_config_is_fatal() {
        assert!(RelayError::Config("missing key".into()).is_fatal());
        assert!(!RelayError::Protocol("no token".into()).is_fatal());
        assert!(!RelayError::transport("timeout").is_fatal());
        assert!(!RelayError::Persistence("disk full".into()).is_fatal());
        assert!(!RelayError::Signing("rng unavailable".into()).is_fatal());
        assert_eq!(
            RelayError::Signing("rng unavailable".into()).to_string(),
            "Signing error: rng unavailable"
        );
    }

    #[test]
    fn test_transport_display_includes_status() {
        let err = RelayError::Transport {
            status: Some(503),
            message: "Service Unavailable".into(),
        };
        assert_eq!(err.to_string(), "Transport error (503): Service Unavailable");
        assert_eq!(
            RelayError::transport("dns failure").to_string(),
            "Transport error: dns failure"
        );
    }
}
