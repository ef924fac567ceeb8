//! Configuration for registry API clients.

use std::time::Duration;

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size used when a vendor API paginates.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// HTTP client settings shared by every vendor adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Timeout applied to every request.
    pub timeout: Duration,

    /// User agent string.
    pub user_agent: String,

    /// Items requested per page on paginated endpoints.
    pub page_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("regfleet/{}", env!("CARGO_PKG_VERSION")),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ClientConfig {
    /// Creates a configuration with default values.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use regfleet_registry::ClientConfig;
    ///
    /// let config = ClientConfig::new().with_timeout(Duration::from_secs(5));
    /// assert_eq!(config.timeout, Duration::from_secs(5));
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the page size, clamped to at least one.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}
