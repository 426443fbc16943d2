//! Immutable client configuration.
//!
//! [`ClientConfig`] is resolved once, either in code or from the process
//! environment, and then shared read-only by every call the client makes.

use crate::{retry::RetryPolicy, Error, Result};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Default upstream when `PLATFORM_API_URL` is unset.
pub const DEFAULT_BASE_URL: &str = "https://api.minepi.com";

/// Default timeout of the first attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Connection settings for the upstream platform.
///
/// The credential is excluded from `Debug` output.
///
/// # Examples
///
/// ```
/// use platform_client::ClientConfig;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), platform_client::Error> {
/// let config = ClientConfig::new("https://api.minepi.com", "secret")?
///     .with_default_timeout(Duration::from_secs(10))
///     .with_max_retries(2);
///
/// assert_eq!(config.max_retries(), 2);
/// assert!(!format!("{:?}", config).contains("secret"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    base_url: Url,
    api_key: String,
    default_timeout: Duration,
    max_retries: usize,
    backoff_unit: Duration,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"<redacted>")
            .field("default_timeout", &self.default_timeout)
            .field("max_retries", &self.max_retries)
            .field("backoff_unit", &self.backoff_unit)
            .finish()
    }
}

impl ClientConfig {
    /// Creates a configuration with the default timeout and retry budget.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the API key is empty.
    pub fn new(base_url: impl AsRef<str>, api_key: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())?;
        if base_url.cannot_be_a_base() {
            return Err(Error::ConfigurationError(format!(
                "Base URL cannot be used as a base: {}",
                base_url
            )));
        }

        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::ConfigurationError("API key is required".to_string()));
        }

        Ok(Self {
            base_url,
            api_key,
            default_timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_unit: Duration::from_secs(1),
        })
    }

    /// Reads the configuration from the process environment.
    ///
    /// * `PLATFORM_API_URL` - upstream base URL (default `https://api.minepi.com`)
    /// * `PI_API_KEY` - credential, required
    /// * `PLATFORM_API_TIMEOUT_SECS` - first-attempt timeout (default 60)
    /// * `PLATFORM_API_MAX_RETRIES` - retry budget (default 3)
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Like [`ClientConfig::from_env`], reading variables through `lookup`.
    pub fn from_env_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let base_url = var("PLATFORM_API_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let api_key = var("PI_API_KEY").ok_or_else(|| {
            Error::ConfigurationError("missing PI_API_KEY environment variable".to_string())
        })?;

        let mut config = Self::new(base_url.trim(), api_key)?;

        if let Some(raw) = var("PLATFORM_API_TIMEOUT_SECS") {
            let secs = parse_number::<u64>("PLATFORM_API_TIMEOUT_SECS", &raw)?;
            config = config.with_default_timeout(Duration::from_secs(secs));
        }
        if let Some(raw) = var("PLATFORM_API_MAX_RETRIES") {
            config = config.with_max_retries(parse_number("PLATFORM_API_MAX_RETRIES", &raw)?);
        }

        Ok(config)
    }

    /// Sets the timeout of the first attempt.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Sets the number of retries after the first attempt.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the unit of the exponential backoff (one second by default).
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// The upstream base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The static credential sent as `Authorization: Key <api_key>`.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// The timeout of the first attempt.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// The number of retries after the first attempt.
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// The unit of the exponential backoff.
    pub fn backoff_unit(&self) -> Duration {
        self.backoff_unit
    }

    /// The retry policy derived from this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.default_timeout)
            .with_backoff_unit(self.backoff_unit)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| {
            Error::ConfigurationError(format!(
                "{} must be a non-negative integer, got {:?}",
                name, raw
            ))
        })
}
