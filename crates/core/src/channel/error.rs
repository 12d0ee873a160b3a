use thiserror::Error;

/// Errors returned by [`super::ExecutionChannel`] requests.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// No terminal response arrived within the channel timeout.
    #[error("no response within {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The request was cancelled before a terminal response arrived.
    #[error("request cancelled")]
    Cancelled,

    /// The worker went away without sending a terminal response.
    #[error("worker closed without a response")]
    Closed,

    /// The worker answered with an `error` response.
    #[error("{error}")]
    Worker {
        error: String,
        error_kind: Option<String>,
    },
}
