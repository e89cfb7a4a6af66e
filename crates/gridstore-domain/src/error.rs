//! Error handling types
//!
//! One transport-agnostic taxonomy for the whole engine. Operations map
//! failures onto a kind; the HTTP layer (out of tree) translates kinds to
//! status codes.

use thiserror::Error;

/// Result type alias for operations that can fail
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the record engine
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid identifier, malformed filter, bad formula in strict mode
    #[error("bad request: {message}")]
    BadRequest {
        /// Description of what was malformed
        message: String,
    },

    /// Caller is not authenticated
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Description of the failed authentication
        message: String,
    },

    /// Caller is authenticated but not allowed
    #[error("forbidden: {message}")]
    Forbidden {
        /// Description of the denied action
        message: String,
    },

    /// Record, column, table or schema lookup came up empty
    #[error("not found: {resource}")]
    NotFound {
        /// The resource that was not found
        resource: String,
    },

    /// Duplicate id or unique-key collision
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the colliding state
        message: String,
    },

    /// Constraint violation on user data
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the violated constraint
        message: String,
    },

    /// Caller exceeded a quota enforced outside the engine
    #[error("rate limited: {message}")]
    RateLimit {
        /// Description of the exceeded limit
        message: String,
    },

    /// JSON parsing or serialization error
    #[error("JSON error: {source}")]
    Json {
        /// The underlying JSON error
        #[from]
        source: serde_json::Error,
    },

    /// Backend failure or unexpected engine state
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Coarse classification of an [`Error`], used by transports and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input
    BadRequest,
    /// Not authenticated
    Unauthorized,
    /// Not allowed
    Forbidden,
    /// Missing resource
    NotFound,
    /// Duplicate / unique-key collision
    Conflict,
    /// Constraint violation
    Validation,
    /// Quota exceeded
    RateLimit,
    /// Everything else
    Internal,
}

impl Error {
    /// Build a [`Error::BadRequest`].
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Build a [`Error::NotFound`] for the given resource description.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Build a [`Error::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Build a [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Build a plain [`Error::Internal`] without a source.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Build an [`Error::Internal`] wrapping a driver or I/O error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Classify this error for transport mapping.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest { .. } => ErrorKind::BadRequest,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::Json { .. } | Self::Internal { .. } => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_classify_constructors() {
        assert_eq!(Error::bad_request("x").kind(), ErrorKind::BadRequest);
        assert_eq!(Error::not_found("record abc").kind(), ErrorKind::NotFound);
        assert_eq!(Error::conflict("dup").kind(), ErrorKind::Conflict);
        assert_eq!(Error::internal("boom").kind(), ErrorKind::Internal);
    }

    #[test]
    fn not_found_message_carries_resource() {
        let err = Error::not_found("record rec_1");
        assert_eq!(err.to_string(), "not found: record rec_1");
    }
}
