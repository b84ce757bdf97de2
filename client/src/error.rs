use thiserror::Error;

/// Transport-level failures. Recovered locally through the connection
/// controller's backoff; only exhaustion of the retry budget is terminal.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    #[error("connection handshake timed out")]
    HandshakeTimeout,

    #[error("connection closed: {0}")]
    Closed(String),
}

/// Failures from the REST boundary. Application errors are never retried;
/// network failures follow the one-shot auto-retry pattern.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend responded with an explicit error payload
    /// (duplicate join, invalid passcode, rejected message).
    #[error("{0}")]
    Application(String),

    /// No usable response: connect error, dropped socket, bad body.
    #[error("network failure: {0}")]
    Network(String),

    /// The request exceeded its deadline.
    #[error("request timed out")]
    Timeout,
}

impl ApiError {
    /// Whether this failure is a pure network failure (no response at
    /// all), which is the only class eligible for automatic retry.
    pub fn is_network_failure(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Timeout)
    }
}
