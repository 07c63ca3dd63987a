//! Transport-level failures reported by enumeration backends.
//!
//! A backend that cannot list a path template reports a [`TransportError`]
//! instead of aborting the whole resolution. The validator classifies it,
//! logs it through a [`TransportLog`], and moves on to the next template.

use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Status reported when a backend payload carries no status field.
pub const UNKNOWN_STATUS: i32 = -1;

/// A structured failure from the backing store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", describe(.status, .message))]
pub struct TransportError {
    /// HTTP-like status code.
    pub status: i32,
    /// Backend message, possibly empty.
    pub message: String,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn describe(status: &i32, message: &str) -> String {
    let prefix = match TransportFailure::classify(*status) {
        TransportFailure::Authentication => "Authentication error",
        TransportFailure::NotFound | TransportFailure::Other => "Error",
    };
    if message.is_empty() {
        format!("{prefix}[{status}]")
    } else {
        format!("{prefix}[{status}]: {message}")
    }
}

impl TransportError {
    /// Create a transport error.
    #[must_use]
    pub fn new(status: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Classify this error.
    #[must_use]
    pub fn failure(&self) -> TransportFailure {
        TransportFailure::classify(self.status)
    }

    /// Parse a backend error payload of the form
    /// `{"errors": [{"status": 404, "message": "Not Found"}]}`.
    ///
    /// Payloads that are not JSON objects yield no errors.
    #[must_use]
    pub fn from_payload(payload: &str) -> Vec<Self> {
        #[derive(Deserialize)]
        struct Payload {
            #[serde(default)]
            errors: Vec<Entry>,
        }

        #[derive(Deserialize)]
        struct Entry {
            #[serde(default = "unknown_status")]
            status: i32,
            #[serde(default)]
            message: String,
        }

        fn unknown_status() -> i32 {
            UNKNOWN_STATUS
        }

        serde_json::from_str::<Payload>(payload)
            .map(|p| {
                p.errors
                    .into_iter()
                    .map(|e| Self::new(e.status, e.message))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Map an I/O failure from a local backend onto a status code.
    #[must_use]
    pub fn from_io(err: &std::io::Error) -> Self {
        let status = match err.kind() {
            std::io::ErrorKind::NotFound => 404,
            std::io::ErrorKind::PermissionDenied => 403,
            _ => 500,
        };
        Self::new(status, err.to_string())
    }
}

/// Classification of a [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    /// Status 401.
    Authentication,
    /// Status 404: nothing under this template.
    NotFound,
    /// Anything else.
    Other,
}

impl TransportFailure {
    #[must_use]
    pub fn classify(status: i32) -> Self {
        match status {
            401 => Self::Authentication,
            404 => Self::NotFound,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::NotFound => write!(f, "not found"),
            Self::Other => write!(f, "error"),
        }
    }
}

/// Log state for transport errors seen while resolving one package name.
///
/// A 404 whose message repeats the immediately preceding error is
/// suppressed. Authentication and other failures are always reported.
#[derive(Debug, Default)]
pub struct TransportLog {
    last: Option<String>,
}

impl TransportLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error, returning the message to log if it should be logged.
    pub fn report(&mut self, err: &TransportError) -> Option<String> {
        let msg = err.to_string();
        let emit = match err.failure() {
            TransportFailure::NotFound => self.last.as_deref() != Some(msg.as_str()),
            TransportFailure::Authentication | TransportFailure::Other => true,
        };
        self.last = Some(msg.clone());
        emit.then_some(msg)
    }

    /// Record and log an error through `tracing`.
    pub fn log(&mut self, err: &TransportError) {
        if let Some(msg) = self.report(err) {
            tracing::error!(status = err.status, "{msg}");
        }
    }
}
