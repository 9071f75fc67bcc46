use thiserror::Error;

/// Errors raised by the interpretation core.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterpretError {
    /// The request was rejected before any task started.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The interpreter was shut down and accepts no more requests.
    #[error("interpreter is shut down")]
    ShuttingDown,

    /// The streaming producer failed; carries the producer's message.
    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    /// An event arrived while the receiver was not in a state that accepts it.
    /// This is an integration bug, not a runtime condition.
    #[error("illegal state: cannot handle {event} while {state}")]
    IllegalState {
        event: &'static str,
        state: &'static str,
    },
}

/// Errors produced by a [`ContentGenerator`](crate::generator::ContentGenerator).
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request to model failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{0}")]
    Api(String),

    #[error("response blocked by the model: {0}")]
    Blocked(String),

    #[error("could not decode model response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no response from model for {0} seconds")]
    Timeout(u64),

    #[error("{0}")]
    Other(String),
}

impl From<UpstreamError> for InterpretError {
    fn from(err: UpstreamError) -> Self {
        InterpretError::UpstreamFailure(err.to_string())
    }
}
