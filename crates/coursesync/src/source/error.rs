//! Error types for fetching section details.

use thiserror::Error;

/// Errors that can occur while fetching section details from the registrar.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The registrar has no record of this section's course
    #[error("Course not found: {subject} {crse} (CRN {crn})")]
    NotFound {
        subject: String,
        crse: String,
        crn: String,
    },

    /// Network/HTTP request failed
    #[error("Network error: {message}")]
    Network { message: String },

    /// Server returned an unexpected response
    #[error("Unexpected response: {message}")]
    UnexpectedResponse { message: String },

    /// Failed to parse the detail page
    #[error("Parse error: {message}")]
    Parse { message: String },
}

impl FetchError {
    /// Returns true if the registrar reported the course as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for FetchError {
    fn from(err: url::ParseError) -> Self {
        FetchError::UnexpectedResponse {
            message: format!("Invalid URL: {err}"),
        }
    }
}
