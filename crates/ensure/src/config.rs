//! Client configuration and spec file loading.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::spec::ResourceSpec;

/// Environment variable for the API username.
pub const ENV_USERNAME: &str = "SL_USERNAME";

/// Environment variable for the API key.
pub const ENV_API_KEY: &str = "SL_API_KEY";

/// Environment variable for the REST endpoint.
pub const ENV_ENDPOINT: &str = "SL_API_ENDPOINT";

/// Environment variable for the per-request timeout in seconds.
pub const ENV_REQUEST_TIMEOUT: &str = "SL_REQUEST_TIMEOUT";

/// Default REST endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.softlayer.com/rest/v3.1";

/// Default timeout for API requests.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Username or API key missing.
    #[error("SoftLayer credentials missing: set {ENV_USERNAME} and {ENV_API_KEY}")]
    MissingCredentials,

    /// Endpoint is not a valid URL.
    #[error("Invalid endpoint '{endpoint}': {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    /// Timeout value could not be parsed.
    #[error("Invalid request timeout '{0}'")]
    InvalidTimeout(String),

    /// HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    /// Spec file could not be read.
    #[error("Failed to read spec file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Spec file could not be parsed.
    #[error("Failed to parse spec file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Connection settings for the SoftLayer REST API.
#[derive(Clone)]
pub struct ClientConfig {
    /// API username.
    pub username: String,
    /// API key.
    pub api_key: String,
    /// REST endpoint, without trailing slash.
    pub endpoint: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("username", &self.username)
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ClientConfig {
    /// Create a config for the default endpoint.
    pub fn new(username: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Use a different endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Use a different request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Read settings from the environment.
    ///
    /// # Errors
    /// Returns an error if credentials are missing or a value is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let username = std::env::var(ENV_USERNAME).unwrap_or_default();
        let api_key = std::env::var(ENV_API_KEY).unwrap_or_default();
        let mut config = Self::new(username, api_key);

        if let Ok(endpoint) = std::env::var(ENV_ENDPOINT) {
            config.endpoint = endpoint;
        }
        if let Ok(raw) = std::env::var(ENV_REQUEST_TIMEOUT) {
            let secs = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?;
            config.request_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that credentials are present and the endpoint parses.
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.username.trim().is_empty() || self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredentials);
        }
        Url::parse(&self.endpoint).map_err(|source| ConfigError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            source,
        })?;
        Ok(())
    }

    /// Endpoint without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }
}

/// Load a [`ResourceSpec`] from a YAML or JSON file.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn load_spec(path: &Path) -> Result<ResourceSpec, ConfigError> {
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: display.clone(),
        source,
    })?;
    let spec: ResourceSpec = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: display,
        source,
    })?;
    debug!(kind = %spec.kind(), state = %spec.state, "Loaded spec file");
    Ok(spec)
}
