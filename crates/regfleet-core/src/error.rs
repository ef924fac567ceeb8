//! Error types shared by every regfleet crate.
//!
//! Adapters convert transport and decode failures into one of these kinds
//! before returning, so the reconciliation engine only ever sees [`Error`].

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The requested entity does not exist.
    NotFound,
    /// The operation cannot complete now but the run should continue.
    Recoverable,
    /// The backend lacks the capability.
    NotImplemented,
    /// Invalid configuration or missing context; aborts the unit of work.
    Configuration,
}

impl ErrorKind {
    /// Returns a string representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Recoverable => "recoverable",
            Self::NotImplemented => "not_implemented",
            Self::Configuration => "configuration",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while observing or mutating a registry fleet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Requested entity does not exist.
    #[error("{entity} '{name}' not found")]
    NotFound {
        /// Entity type (project, repository, member, ...).
        entity: &'static str,
        /// Name of the missing entity.
        name: String,
    },

    /// Operation cannot complete under current preconditions.
    #[error("{reason}")]
    Recoverable {
        /// Reason the operation could not complete.
        reason: String,
    },

    /// Backend does not support the requested capability.
    #[error("{capability} is not implemented by the {provider} provider")]
    NotImplemented {
        /// Provider name.
        provider: String,
        /// Capability that is missing.
        capability: &'static str,
    },

    /// Invalid configuration or missing context values.
    #[error("invalid configuration: {reason}")]
    Configuration {
        /// Reason the configuration is invalid.
        reason: String,
    },
}

impl Error {
    /// Creates a [`Error::NotFound`] error.
    pub fn not_found(entity: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            name: name.into(),
        }
    }

    /// Creates a [`Error::Recoverable`] error.
    pub fn recoverable(reason: impl Into<String>) -> Self {
        Self::Recoverable {
            reason: reason.into(),
        }
    }

    /// Creates a [`Error::NotImplemented`] error.
    pub fn not_implemented(provider: impl Into<String>, capability: &'static str) -> Self {
        Self::NotImplemented {
            provider: provider.into(),
            capability,
        }
    }

    /// Creates a [`Error::Configuration`] error.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Returns the kind of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Recoverable { .. } => ErrorKind::Recoverable,
            Self::NotImplemented { .. } => ErrorKind::NotImplemented,
            Self::Configuration { .. } => ErrorKind::Configuration,
        }
    }

    /// Returns true if a later reconciliation run may succeed.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable { .. } | Self::NotFound { .. })
    }

    /// Returns true if the error is a capability gap rather than a failure.
    pub const fn is_capability_gap(&self) -> bool {
        matches!(self, Self::NotImplemented { .. })
    }

    /// Returns true if the error aborts the current unit of work.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::not_found("project", "os-images");
        assert_eq!(err.to_string(), "project 'os-images' not found");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_error_display_not_implemented() {
        let err = Error::not_implemented("acr", "project creation");
        assert_eq!(
            err.to_string(),
            "project creation is not implemented by the acr provider"
        );
        assert!(err.is_capability_gap());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_configuration_is_fatal() {
        let err = Error::configuration("both registries are global hubs");
        assert!(err.is_fatal());
        assert!(!err.is_recoverable());
        assert!(err.to_string().starts_with("invalid configuration"));
    }

    #[test]
    fn test_recoverable_kinds() {
        assert!(Error::recoverable("project has repositories").is_recoverable());
        assert!(Error::not_found("member", "alice").is_recoverable());
        assert!(!Error::not_implemented("acr", "members").is_recoverable());
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::NotImplemented.to_string(), "not_implemented");
        assert_eq!(ErrorKind::Configuration.as_str(), "configuration");
    }
}
