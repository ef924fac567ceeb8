//! Transport errors of the HTTP adapters.
//!
//! These never leave the crate: [`HttpError`] is logged and converted into
//! [`regfleet_core::Error`] at the adapter boundary.

use thiserror::Error;

/// Failures of a single HTTP exchange.
#[derive(Debug, Error)]
pub(crate) enum HttpError {
    /// The request could not be sent or the response not read.
    #[error("request to {url} failed: {source}")]
    Transport {
        /// Request URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The backend answered with a non-2xx status.
    #[error("HTTP error from {url}: {status} - {message}")]
    Status {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// The request URL could not be built.
    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        /// Offending URL.
        url: String,
        /// Underlying error.
        #[source]
        source: url::ParseError,
    },
}

impl HttpError {
    /// Converts into the core taxonomy, naming the entity a 404 refers to.
    pub(crate) fn into_core(self, entity: &'static str, name: &str) -> regfleet_core::Error {
        match self {
            Self::Status { status: 404, .. } => regfleet_core::Error::not_found(entity, name),
            Self::InvalidUrl { .. } => regfleet_core::Error::configuration(self.to_string()),
            Self::Status { .. } | Self::Transport { .. } => {
                regfleet_core::Error::recoverable(self.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regfleet_core::ErrorKind;

    #[test]
    fn test_status_404_is_not_found() {
        let err = HttpError::Status {
            url: "https://hub/api".to_string(),
            status: 404,
            message: String::new(),
        };
        let core = err.into_core("project", "os-images");
        assert_eq!(core.kind(), ErrorKind::NotFound);
        assert_eq!(core.to_string(), "project 'os-images' not found");
    }

    #[test]
    fn test_other_status_is_recoverable() {
        let err = HttpError::Status {
            url: "https://hub/api".to_string(),
            status: 503,
            message: "unavailable".to_string(),
        };
        let core = err.into_core("project", "os-images");
        assert_eq!(core.kind(), ErrorKind::Recoverable);
        assert!(core.to_string().contains("503"));
    }

    #[test]
    fn test_invalid_url_is_configuration() {
        let source = url::Url::parse("not a url").unwrap_err();
        let err = HttpError::InvalidUrl {
            url: "not a url".to_string(),
            source,
        };
        assert!(err.into_core("project", "x").is_fatal());
    }
}
