//! Error types for daemon API operations.
//!
//! Errors are categorized so callers can tell a peer that could not be
//! reached from one that answered with an error, and both from a watch
//! that simply did not see the awaited event in time.

use std::fmt;
use std::io;
use std::time::Duration;

/// Result type alias for daemon API operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of daemon API errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Peer unreachable, connection reset, DNS failure.
    Transport,
    /// Peer answered with a non-success HTTP status.
    Status,
    /// Peer answered with something we could not decode.
    Decode,
    /// Expected terminal event not observed before the deadline.
    Timeout,
    /// Event stream delivered an event kind nobody asked for.
    Unexpected,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Whether the failure may go away on its own.
    ///
    /// Nothing in this crate retries; the flag is informational.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport | Self::Timeout)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Transport => "Daemon unreachable",
            Self::Status => "Daemon rejected the request",
            Self::Decode => "Malformed daemon response",
            Self::Timeout => "Convergence not observed in time",
            Self::Unexpected => "Unexpected event",
            Self::Other => "Unexpected error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while talking to a daemon.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request never got an answer.
    #[error("{url}: {message}")]
    Transport {
        /// Requested URL.
        url: String,
        /// Transport error message.
        message: String,
    },

    /// The daemon answered with a non-success status.
    #[error("{url}: HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Response or event body could not be decoded.
    #[error("invalid daemon response: {0}")]
    Decode(String),

    /// The awaited terminal events did not arrive before the deadline.
    #[error("did not observe the expected terminal event within {timeout:?} (waiting for: {})", pending.join(", "))]
    Timeout {
        /// The watch deadline.
        timeout: Duration,
        /// Units still waiting for a terminal event.
        pending: Vec<String>,
    },

    /// An event of a kind the watch did not subscribe to.
    #[error("unexpected event {kind} while watching")]
    UnexpectedEvent {
        /// The event kind received.
        kind: String,
    },

    /// The event stream ended before every unit settled.
    #[error("event stream closed (waiting for: {})", pending.join(", "))]
    StreamClosed {
        /// Units still waiting for a terminal event.
        pending: Vec<String>,
    },

    /// IO error while reading a response body.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Transport { .. } | Error::Io(_) | Error::StreamClosed { .. } => {
                ErrorCategory::Transport
            }
            Error::Status { .. } => ErrorCategory::Status,
            Error::Decode(_) => ErrorCategory::Decode,
            Error::Timeout { .. } => ErrorCategory::Timeout,
            Error::UnexpectedEvent { .. } => ErrorCategory::Unexpected,
            Error::Other(_) => ErrorCategory::Other,
        }
    }

    /// Whether this error is a convergence timeout rather than a failure.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.category() == ErrorCategory::Timeout
    }

    /// Build an error from a ureq error, keeping the URL for context.
    pub(crate) fn from_ureq(url: &str, err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(status) => Self::Status {
                url: url.to_string(),
                status,
            },
            ureq::Error::Json(e) => Self::Decode(e.to_string()),
            other => Self::Transport {
                url: url.to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
