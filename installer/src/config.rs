//! Installer configuration.
//!
//! Settings are read from an optional TOML file and may be overridden from
//! the environment. Every field falls back to its default when omitted, and
//! unknown keys are rejected so a misspelt setting is never silently
//! ignored.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding [`InstallerConfig::base_url`].
pub const BASE_URL_ENV: &str = "TFINSTALL_BASE_URL";

/// Environment variable overriding [`InstallerConfig::timeout_secs`].
pub const TIMEOUT_ENV: &str = "TFINSTALL_TIMEOUT_SECS";

/// Errors arising from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file that was read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A setting has an unusable value.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Name of the setting.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Settings for the acquisition pipeline.
///
/// # Examples
///
/// ```
/// use tfinstall::config::InstallerConfig;
///
/// let config = InstallerConfig::from_toml_str("timeout_secs = 30\n").expect("valid");
/// assert_eq!(config.timeout_secs, 30);
/// assert_eq!(config.base_url, "https://releases.hashicorp.com/terraform");
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct InstallerConfig {
    /// Root of the release distribution point. Each release lives under
    /// `{base_url}/{version}/`.
    pub base_url: String,
    /// Timeout in seconds applied to each whole request.
    pub timeout_secs: u64,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
    /// Parent directory for per-call scratch directories. Uses the system
    /// temporary directory when unset.
    pub scratch_root: Option<PathBuf>,
    /// `.netrc` file supplying basic-auth credentials for mirrors. When
    /// unset, `$NETRC` and then `~/.netrc` are consulted.
    pub netrc: Option<PathBuf>,
}

impl InstallerConfig {
    /// Default distribution point.
    pub const DEFAULT_BASE_URL: &'static str = "https://releases.hashicorp.com/terraform";

    /// Default request timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

    /// Parse and validate configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys and
    /// [`ConfigError::InvalidValue`] when validation fails.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read, otherwise as
    /// for [`Self::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Apply overrides from [`BASE_URL_ENV`] and [`TIMEOUT_ENV`].
    ///
    /// Unset or blank variables leave the current value in place.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when an override cannot be
    /// parsed or fails validation.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(base_url) = env_value(BASE_URL_ENV) {
            self.base_url = base_url;
        }
        if let Some(timeout) = env_value(TIMEOUT_ENV) {
            self.timeout_secs = timeout.parse().map_err(|err| ConfigError::InvalidValue {
                key: TIMEOUT_ENV,
                reason: format!("{timeout:?} is not a whole number of seconds: {err}"),
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    /// The request timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check that every setting is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.base_url.trim();
        if base_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "base_url",
                reason: "must not be empty".to_owned(),
            });
        }
        if !base_url.contains("://") {
            return Err(ConfigError::InvalidValue {
                key: "base_url",
                reason: format!("{base_url:?} has no URL scheme"),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timeout_secs",
                reason: "must be greater than zero".to_owned(),
            });
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "user_agent",
                reason: "must not be empty".to_owned(),
            });
        }
        Ok(())
    }
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_owned(),
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_owned(),
            scratch_root: None,
            netrc: None,
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
