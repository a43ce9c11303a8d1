use std::fmt;

/// Error kinds shared by every transport/handshake/session component.
///
/// `AuthFailed` is sticky and disables reconnection for the lifetime of the
/// client; `Cancelled` never triggers a reconnect either. Everything else is
/// retryable by the reconnect controller.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),

    #[error("handshake error: {0}")]
    Handshake(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("control connection is closed, please reconnect")]
    ControlConnectionClosed,
}

impl ClientError {
    /// Substring match the handshake engine uses to classify a failed
    /// handshake response as an authentication failure (sticky, pins
    /// `auth_failed`).
    pub fn message_looks_like_auth_failure(message: &str) -> bool {
        let lower = message.to_ascii_lowercase();
        lower.contains("auth") || lower.contains("token")
    }

    /// Substring match the command dispatcher uses to rewrite a write error
    /// into `ControlConnectionClosed`.
    pub fn message_looks_like_closed_stream(message: &str) -> bool {
        let lower = message.to_ascii_lowercase();
        lower.contains("stream is closed")
            || lower.contains("stream closed")
            || lower.contains("errstreamclosed")
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::InvalidData(e.to_string())
    }
}

/// An aggregate of several endpoint-probe failures, returned by the
/// auto-connector when every endpoint it raced has failed.
#[derive(Debug)]
pub struct AggregateError {
    pub failures: Vec<(String, String)>, // (endpoint description, message)
}

impl AggregateError {
    pub fn new(failures: Vec<(String, String)>) -> Self {
        AggregateError { failures }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "all endpoints failed: ")?;
        for (i, (endpoint, message)) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{endpoint}: {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

impl From<AggregateError> for ClientError {
    fn from(e: AggregateError) -> Self {
        ClientError::Network(e.to_string())
    }
}
