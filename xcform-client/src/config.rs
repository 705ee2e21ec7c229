//! Client configuration
//!
//! Settings come from the environment (`F5XC_API_URL`, `F5XC_API_TOKEN`) or
//! from any lookup function, which keeps tests independent of the process
//! environment.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub const ENV_API_URL: &str = "F5XC_API_URL";
pub const ENV_API_TOKEN: &str = "F5XC_API_TOKEN";

pub const DEFAULT_API_URL: &str = "https://console.ves.volterra.io";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_WAIT_MIN: Duration = Duration::from_secs(1);
pub const DEFAULT_RETRY_WAIT_MAX: Duration = Duration::from_secs(30);
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(60);

/// Errors building a client
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("API token is required, set F5XC_API_TOKEN")]
    MissingToken,

    #[error("Invalid API URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Connection and retry settings of the HTTP transport
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL without a trailing `/` or `/api`
    pub api_url: String,
    pub api_token: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    pub retry_wait_min: Duration,
    pub retry_wait_max: Duration,
    /// Wait after an HTTP 429 answer
    pub rate_limit_delay: Duration,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn new(api_url: &str, api_token: impl Into<String>) -> Result<Self, ConfigError> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(ConfigError::MissingToken);
        }
        let api_url = normalize_api_url(api_url);
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(ConfigError::InvalidUrl {
                url: api_url,
                reason: "scheme must be http or https".to_string(),
            });
        }
        Ok(Self {
            api_url,
            api_token,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_wait_min: DEFAULT_RETRY_WAIT_MIN,
            retry_wait_max: DEFAULT_RETRY_WAIT_MAX,
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
            user_agent: format!("xcform/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    /// Build from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from a variable lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let url = get(ENV_API_URL).unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let token = get(ENV_API_TOKEN).ok_or(ConfigError::MissingToken)?;
        Self::new(url.trim(), token.trim())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_wait(mut self, min: Duration, max: Duration) -> Self {
        self.retry_wait_min = min;
        self.retry_wait_max = max;
        self
    }

    pub fn with_rate_limit_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_delay = delay;
        self
    }

    /// Exponential backoff `min * 2^attempt`, capped at `max`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.retry_wait_min
            .checked_mul(factor)
            .unwrap_or(self.retry_wait_max)
            .min(self.retry_wait_max)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url)
            .field("api_token", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_wait_min", &self.retry_wait_min)
            .field("retry_wait_max", &self.retry_wait_max)
            .field("rate_limit_delay", &self.rate_limit_delay)
            .finish()
    }
}

/// Strip trailing slashes and a trailing `/api` segment
pub fn normalize_api_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let trimmed = trimmed.strip_suffix("/api").unwrap_or(trimmed);
    trimmed.trim_end_matches('/').to_string()
}
