use std::io;
use thiserror::Error;

/// Errors surfaced by the adapter operations.
///
/// The variants fall into two categories that callers must treat differently:
///
/// - *Caller errors* (`InvalidUri`, `InvalidMethod`, `InvalidHeader`,
///   `ResponseNotBuffered`): the guest violated the API contract. These are
///   not recoverable at the call site; the transaction should be failed.
/// - *Operational errors* (`Outbound`, `Io`): transport or sink failures.
///   The caller decides whether to give up; nothing is retried implicitly.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("invalid request uri: {reason}")]
    InvalidUri { reason: String },

    #[error("invalid http method: {reason}")]
    InvalidMethod { reason: String },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("response is not buffered for this transaction")]
    ResponseNotBuffered,

    #[error("outbound call failed: {source}")]
    Outbound {
        #[from]
        source: reqwest::Error,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl HostError {
    pub fn invalid_uri<S: ToString>(str: S) -> Self {
        Self::InvalidUri { reason: str.to_string() }
    }

    pub fn invalid_method<S: ToString>(str: S) -> Self {
        Self::InvalidMethod { reason: str.to_string() }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Returns true for the caller/programming-error category.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidUri { .. } | Self::InvalidMethod { .. } | Self::InvalidHeader { .. } | Self::ResponseNotBuffered
        )
    }
}
