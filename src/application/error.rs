use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::cache::{ErrorKind, FetchError};
use crate::domain::error::DomainError;
use crate::infra::error::InfraError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// The fetch failure behind this error, if any.
    pub fn fetch_error(&self) -> Option<&FetchError> {
        match self {
            AppError::Fetch(err) => Some(err),
            _ => None,
        }
    }

    fn presentation_title(&self) -> &'static str {
        match self {
            AppError::Domain(DomainError::Validation { .. }) => "Please check your input",
            AppError::Fetch(err) => match err.kind {
                ErrorKind::Unauthenticated | ErrorKind::Status(401) => "Please sign in",
                ErrorKind::Status(403) => "Access denied",
                ErrorKind::Status(404) => "Not found",
                ErrorKind::Status(_) => "Request failed",
                ErrorKind::Timeout => "Request timed out",
                ErrorKind::Transport => "Network error",
                ErrorKind::Decode => "Unexpected response",
                ErrorKind::Cancelled => "Request cancelled",
            },
            AppError::Infra(InfraError::Configuration { .. }) => "Client misconfigured",
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Infra(InfraError::Http { .. }) => "HTTP client could not start",
            AppError::Infra(InfraError::Io(_)) => "I/O failure",
            AppError::Unexpected(_) => "Unexpected error occurred",
        }
    }
}

/// Short title plus optional detail, ready to show to a person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Notice {
    pub fn new(title: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            title: title.into(),
            detail,
        }
    }
}

impl From<&AppError> for Notice {
    fn from(error: &AppError) -> Self {
        let detail = match error {
            AppError::Domain(DomainError::Validation { message, .. }) => message.clone(),
            AppError::Fetch(err) => err.message.clone(),
            other => other.to_string(),
        };
        let title = error.presentation_title();
        let detail = (!detail.is_empty() && detail != title).then_some(detail);
        Notice::new(title, detail)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {}", self.title, detail),
            None => f.write_str(&self.title),
        }
    }
}
