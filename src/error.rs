//! Error types for stack orchestration
//!
//! Every variant keeps the originating message intact: callers (and the API
//! layer above us) match on `to_string()`, so `Spec`, `Platform` and
//! `ConfigNotFound` display only the wrapped message. The `context` fields
//! carry the failure class for logging.

use thiserror::Error;

/// Context used for specification parse failures
pub const PARSE_YAML_ERROR: &str = "parse yaml error";

/// Main error type for mystack operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Stack specification could not be parsed or validated
    #[error("{message}")]
    Spec {
        /// Failure class (e.g. "parse yaml error")
        context: String,
        /// Underlying cause, verbatim
        message: String,
    },

    /// A platform API call failed
    #[error("{message}")]
    Platform {
        /// Failed operation (e.g. "create service error")
        context: String,
        /// Platform error text, verbatim
        message: String,
    },

    /// Create attempted against an existing namespace
    #[error("namespace for user '{username}' already exists")]
    NamespaceConflict {
        /// Owner of the namespace
        username: String,
    },

    /// Delete or Apps attempted against an absent namespace
    #[error("namespace for user '{username}' not found")]
    NamespaceNotFound {
        /// Owner of the namespace
        username: String,
    },

    /// Storage has no specification under the requested name
    #[error("{message}")]
    ConfigNotFound {
        /// Name that was looked up
        name: String,
        /// Storage message, verbatim
        message: String,
    },

    /// Storage failed for a reason other than a missing name
    #[error("{message}")]
    Storage {
        /// Name that was looked up
        name: String,
        /// Storage error text, verbatim
        message: String,
    },

    /// A readiness wait exceeded its deadline
    #[error("timed out after {timeout_seconds}s waiting for {target}")]
    Timeout {
        /// What was being waited on (e.g. "job mystack-user/setup")
        target: String,
        /// Configured timeout
        timeout_seconds: u32,
        /// Last transient error observed while polling, if any
        last_error: Option<String>,
    },

    /// A readiness target reached a terminal failure state
    #[error("{target} failed: {message}")]
    ReadinessFailed {
        /// What was being waited on
        target: String,
        /// Failure reason reported by the platform
        message: String,
    },
}

/// Coarse classification for mapping errors onto response codes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is wrong (bad specification)
    InvalidInput,
    /// Something the request refers to does not exist
    NotFound,
    /// The request collides with existing state
    Conflict,
    /// The platform failed or did not converge in time
    Unavailable,
}

impl Error {
    /// Create a specification error wrapping `cause`
    pub fn spec(context: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Spec {
            context: context.into(),
            message: cause.to_string(),
        }
    }

    /// Create a specification error in the "parse yaml error" class
    pub fn parse_yaml(cause: impl std::fmt::Display) -> Self {
        Self::spec(PARSE_YAML_ERROR, cause)
    }

    /// Create a platform error wrapping `cause`
    pub fn platform(context: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Platform {
            context: context.into(),
            message: cause.to_string(),
        }
    }

    /// Create a namespace conflict error
    pub fn namespace_conflict(username: impl Into<String>) -> Self {
        Self::NamespaceConflict {
            username: username.into(),
        }
    }

    /// Create a namespace not found error
    pub fn namespace_not_found(username: impl Into<String>) -> Self {
        Self::NamespaceNotFound {
            username: username.into(),
        }
    }

    /// Create a config not found error
    pub fn config_not_found(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigNotFound {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a storage error wrapping `cause`
    pub fn storage(name: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Storage {
            name: name.into(),
            message: cause.to_string(),
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Spec { .. } => ErrorKind::InvalidInput,
            Error::ConfigNotFound { .. } | Error::NamespaceNotFound { .. } => ErrorKind::NotFound,
            Error::NamespaceConflict { .. } => ErrorKind::Conflict,
            Error::Platform { .. }
            | Error::Storage { .. }
            | Error::Timeout { .. }
            | Error::ReadinessFailed { .. } => ErrorKind::Unavailable,
        }
    }

    /// Get the failure class if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Spec { context, .. } | Error::Platform { context, .. } => Some(context),
            _ => None,
        }
    }
}
