//! Client configuration.

use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::error::Error;

/// Base URL template; `{subdomain}` is replaced with the instance subdomain.
pub const DEFAULT_BASE_URL_TEMPLATE: &str = "https://{subdomain}.zendesk.com/api/v2";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of attempts for transient failures (timeouts, 5xx).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default first backoff after a transient failure; doubles per attempt.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Default cap on the transient backoff.
pub const DEFAULT_MAX_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// Wait applied when a rate-limit response carries no `Retry-After`.
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Extra wait added on top of the server-advised duration.
pub const DEFAULT_RATE_LIMIT_MARGIN: Duration = Duration::from_secs(1);

/// Longest single rate-limit wait that will be honoured.
pub const DEFAULT_MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(300);

/// Consecutive rate-limit responses tolerated for one request.
pub const DEFAULT_MAX_RATE_LIMIT_WAITS: u32 = 10;

/// Default page size for collection reads.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Credentials and address of one helpdesk instance.
#[derive(Clone, Deserialize)]
pub struct InstanceConfig {
    /// Account subdomain.
    pub subdomain: String,

    /// Agent email used for token authentication.
    pub email: String,

    /// API token.
    pub token: String,

    /// Explicit API base URL, overriding the subdomain template.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl InstanceConfig {
    /// Create a configuration for the given account.
    pub fn new(
        subdomain: impl Into<String>,
        email: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            subdomain: subdomain.into(),
            email: email.into(),
            token: token.into(),
            base_url: None,
        }
    }

    /// Set an explicit API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// API base URL without a trailing slash.
    pub fn base_url(&self) -> String {
        let url = match &self.base_url {
            Some(url) => url.clone(),
            None => DEFAULT_BASE_URL_TEMPLATE.replace("{subdomain}", self.subdomain.trim()),
        };
        url.trim_end_matches('/').to_string()
    }

    /// Basic-auth user name for token authentication.
    pub fn username(&self) -> String {
        format!("{}/token", self.email.trim())
    }

    /// Check that every credential is present.
    pub fn validate(&self) -> Result<(), Error> {
        for (name, value) in [
            ("subdomain", &self.subdomain),
            ("email", &self.email),
            ("token", &self.token),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("instance {} is empty", name)));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for InstanceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceConfig")
            .field("subdomain", &self.subdomain)
            .field("email", &self.email)
            .field("token", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Retry, backoff and pagination policy of the request executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Per-request timeout enforced by the transport.
    pub request_timeout: Duration,

    /// Attempts allowed for transient failures before giving up.
    pub max_attempts: u32,

    /// First transient backoff.
    pub retry_backoff: Duration,

    /// Cap on the transient backoff.
    pub max_retry_backoff: Duration,

    /// Wait when a rate-limit response has no usable `Retry-After`.
    pub default_rate_limit_wait: Duration,

    /// Margin added to every rate-limit wait.
    pub rate_limit_margin: Duration,

    /// Longest single rate-limit wait.
    pub max_rate_limit_wait: Duration,

    /// Consecutive rate-limit responses tolerated per request.
    pub max_rate_limit_waits: u32,

    /// Page size for collection reads.
    pub page_size: usize,
}

impl ExecutorConfig {
    /// Create the default policy.
    pub fn new() -> Self {
        Self {
            request_timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            max_retry_backoff: DEFAULT_MAX_RETRY_BACKOFF,
            default_rate_limit_wait: DEFAULT_RATE_LIMIT_WAIT,
            rate_limit_margin: DEFAULT_RATE_LIMIT_MARGIN,
            max_rate_limit_wait: DEFAULT_MAX_RATE_LIMIT_WAIT,
            max_rate_limit_waits: DEFAULT_MAX_RATE_LIMIT_WAITS,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Policy with every wait set to zero. Retry ceilings are unchanged.
    pub fn without_delays() -> Self {
        Self {
            retry_backoff: Duration::ZERO,
            max_retry_backoff: Duration::ZERO,
            default_rate_limit_wait: Duration::ZERO,
            rate_limit_margin: Duration::ZERO,
            ..Self::new()
        }
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the transient attempt budget.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the transient backoff base and cap.
    pub fn with_retry_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.retry_backoff = base;
        self.max_retry_backoff = cap.max(base);
        self
    }

    /// Set the fallback rate-limit wait.
    pub fn with_default_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.default_rate_limit_wait = wait;
        self
    }

    /// Set the margin added to every rate-limit wait.
    pub fn with_rate_limit_margin(mut self, margin: Duration) -> Self {
        self.rate_limit_margin = margin;
        self
    }

    /// Set the rate-limit ceilings.
    pub fn with_rate_limit_ceiling(mut self, max_wait: Duration, max_waits: u32) -> Self {
        self.max_rate_limit_wait = max_wait;
        self.max_rate_limit_waits = max_waits;
        self
    }

    /// Set the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Backoff before transient retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_backoff
            .saturating_mul(factor)
            .min(self.max_retry_backoff)
    }

    /// Wait to apply for a rate-limit response.
    pub fn rate_limit_wait(&self, advised: Option<Duration>) -> Duration {
        let advised = advised.unwrap_or(self.default_rate_limit_wait);
        (advised + self.rate_limit_margin).min(self.max_rate_limit_wait)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::new()
    }
}
