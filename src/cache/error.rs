//! Fetch and mutation failures as seen by the cache.

use std::fmt;

use thiserror::Error;

/// Fallback when neither the response body nor the transport says anything.
pub const DEFAULT_ERROR_MESSAGE: &str = "An unknown error occurred";

/// Classification of a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No response reached the caller.
    Transport,
    /// The transport gave up waiting.
    Timeout,
    /// The server answered with a non-success HTTP status.
    Status(u16),
    /// A response arrived but its body could not be understood.
    Decode,
    /// An identity-scoped key was requested without a signed-in user.
    Unauthenticated,
    /// The fetch was aborted by a full cache reset.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transport => f.write_str("transport"),
            ErrorKind::Timeout => f.write_str("timeout"),
            ErrorKind::Status(code) => write!(f, "status {code}"),
            ErrorKind::Decode => f.write_str("decode"),
            ErrorKind::Unauthenticated => f.write_str("unauthenticated"),
            ErrorKind::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// A failed fetch or mutation.
///
/// Cloneable so one failure can be handed to every caller joined on the same
/// in-flight request and kept on the cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: ErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            DEFAULT_ERROR_MESSAGE.to_string()
        } else {
            message
        };
        Self { kind, message }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Status(code), message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decode, message)
    }

    pub fn unauthenticated() -> Self {
        Self::new(ErrorKind::Unauthenticated, "Not signed in")
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "Request cancelled by session change")
    }

    /// HTTP-like status code, when the server produced one.
    pub fn status_code(&self) -> Option<u16> {
        match self.kind {
            ErrorKind::Status(code) => Some(code),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status_code() == Some(401)
    }

    pub fn is_forbidden(&self) -> bool {
        self.status_code() == Some(403)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_message_falls_back_to_default() {
        let err = FetchError::transport("   ");
        assert_eq!(err.message, DEFAULT_ERROR_MESSAGE);
    }

    #[test]
    fn status_helpers() {
        let err = FetchError::status(401, "Session expired");
        assert_eq!(err.status_code(), Some(401));
        assert!(err.is_unauthorized());
        assert!(!err.is_forbidden());

        assert!(FetchError::status(403, "nope").is_forbidden());
        assert_eq!(FetchError::timeout("slow").status_code(), None);
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = FetchError::status(404, "Wall not found");
        assert_eq!(err.to_string(), "status 404: Wall not found");
    }
}
