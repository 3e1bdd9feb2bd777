//! Client configuration.

use std::time::Duration;

use crate::ClientError;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "CIRRUS_API_KEY";

/// Environment variable overriding the API base URL.
pub const BASE_URL_ENV: &str = "CIRRUS_BASE_URL";

pub const DEFAULT_BASE_URL: &str = "https://api.cirrus.dev/v1";

/// Default timeout for API calls that do not set their own.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Pooled HTTP clients older than this are rebuilt on next checkout.
pub const DEFAULT_CLIENT_MAX_AGE: Duration = Duration::from_secs(300);

/// Settings for talking to the API.
///
/// Environment fallbacks are read once, in [`from_env`](Self::from_env).
/// Nothing reads the environment after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub request_timeout: Duration,
    pub client_max_age: Duration,
    pub default_headers: Vec<(String, String)>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            client_max_age: DEFAULT_CLIENT_MAX_AGE,
            default_headers: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Builds a config from `CIRRUS_API_KEY` and `CIRRUS_BASE_URL`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            api_key: non_empty(API_KEY_ENV),
            base_url: non_empty(BASE_URL_ENV).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_client_max_age(mut self, age: Duration) -> Self {
        self.client_max_age = age;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Checks the parts of the config that cannot be fixed later.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.api_key.is_none() {
            return Err(ClientError::Config(format!(
                "no API key: set {API_KEY_ENV} or pass one explicitly"
            )));
        }
        if !is_absolute_url(&self.base_url) {
            return Err(ClientError::Config(format!(
                "base URL must start with http:// or https://, got {:?}",
                self.base_url
            )));
        }
        Ok(())
    }

    /// Joins an endpoint onto the base URL. Absolute URLs pass through.
    pub fn resolve_url(&self, url: &str) -> String {
        if is_absolute_url(url) {
            return url.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    }

    /// True for endpoints relative to the base URL and for absolute URLs
    /// under it. Only these carry the API key.
    pub fn is_api_url(&self, url: &str) -> bool {
        if !is_absolute_url(url) {
            return true;
        }
        let base = self.base_url.trim_end_matches('/');
        url.strip_prefix(base)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?']))
    }
}

/// True for `http://` and `https://` URLs (presigned storage URLs included).
pub fn is_absolute_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
