//! Error types and retry classification for the 1C client.
//!
//! Every failure carries an [`ErrorKind`] so callers branch on the kind
//! rather than on the concrete variant:
//!
//! - `Auth`: HTTP 401, surfaced immediately
//! - `Transient`: transport failure or 502/503/504, retried with backoff and
//!   surfaced as [`OneCError::ConnectionFailed`] once attempts run out
//! - `Response`: any other 4xx/5xx or an unreadable body, never retried

mod retry;

pub use retry::RetryClass;

use serde::Serialize;
use thiserror::Error;

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, OneCError>;

/// The three failure kinds a 1C call can end in.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    Transient,
    Response,
}

/// Errors raised by [`crate::OneCClient`].
#[derive(Error, Debug)]
pub enum OneCError {
    /// The 1C side rejected the credentials (HTTP 401).
    #[error("1C authentication failed: {message}")]
    Auth { message: String },

    /// A single attempt failed for a transient reason.
    /// Only seen inside the retry loop.
    #[error("1C transient failure: {message}")]
    Transient { message: String },

    /// Transient failures persisted for every allowed attempt.
    #[error("Connection to 1C failed after {attempts} attempt(s): {message}")]
    ConnectionFailed { attempts: u32, message: String },

    /// The 1C side answered with an application error.
    #[error("1C API error {status}: {message}")]
    Response {
        status: u16,
        message: String,
        body: Option<serde_json::Value>,
    },

    /// A 2xx answer whose body could not be decoded.
    #[error("Invalid response from 1C: {0}")]
    InvalidResponse(String),

    /// The request could not be built (bad header value, bad base URL).
    #[error("Invalid 1C request: {0}")]
    InvalidRequest(String),
}

impl OneCError {
    /// Returns the failure kind callers branch on.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Transient { .. } | Self::ConnectionFailed { .. } => ErrorKind::Transient,
            Self::Response { .. } | Self::InvalidResponse(_) | Self::InvalidRequest(_) => {
                ErrorKind::Response
            }
        }
    }

    /// Returns the retry classification for this error.
    ///
    /// ```
    /// use tradeos_onec::{OneCError, RetryClass};
    ///
    /// let error = OneCError::Transient { message: "503".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    ///
    /// let error = OneCError::Auth { message: "401".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Transient { .. } => RetryClass::WithBackoff,
            // Exhausted or terminal
            Self::ConnectionFailed { .. }
            | Self::Auth { .. }
            | Self::Response { .. }
            | Self::InvalidResponse(_)
            | Self::InvalidRequest(_) => RetryClass::Never,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { .. } => Some(401),
            Self::Response { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classifies a non-success HTTP status and its body.
    pub(crate) fn from_status(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
        let detail = match &parsed {
            Some(json) => json.to_string(),
            None => body.chars().take(200).collect::<String>(),
        };
        let message = format!("HTTP {} - {}", status, detail);

        match status {
            401 => Self::Auth { message },
            502..=504 => Self::Transient { message },
            _ => Self::Response {
                status,
                message,
                body: parsed,
            },
        }
    }

    /// Classifies a reqwest failure. Anything that happened on the wire is
    /// transient; a decode failure is a response error.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else {
            Self::Transient {
                message: err.to_string(),
            }
        }
    }
}
