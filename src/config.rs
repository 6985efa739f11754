/*!
 * Configuration types for tcptee
 */

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::zero_copy::ZeroCopyCapabilities;
use crate::error::{RelayError, Result};

/// Default mirror connect timeout in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 500;

/// Default mirror write timeout in milliseconds (copy transport)
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 20;

/// Default delay before retrying a failed mirror, in milliseconds (reserved)
pub const DEFAULT_RETRY_DELAY_MS: u64 = 20_000;

/// Runtime configuration for the duplicator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Listen address, e.g. "127.0.0.1:7000"
    pub listen: String,

    /// Forwardee address: the primary endpoint whose replies return to the client
    pub forward: String,

    /// Mirror addresses; each receives a one-way copy of the ingress stream
    #[serde(default)]
    pub mirrors: Vec<String>,

    /// Use the kernel zero-copy transport (splice/tee) instead of the copy loop
    #[serde(default)]
    pub zero_copy: bool,

    /// Mirror connect timeout in milliseconds; a mirror that cannot be dialed
    /// within this bound is omitted from the session
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Mirror write timeout in milliseconds for the copy transport; a write
    /// that does not complete within this bound kills the mirror. Zero
    /// disables the deadline.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Delay before retrying a failed mirror, in milliseconds. Reserved: no
    /// in-session retry is performed.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_write_timeout_ms() -> u64 {
    DEFAULT_WRITE_TIMEOUT_MS
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

impl RelayConfig {
    /// Create a configuration with default timeouts and no mirrors
    pub fn new(listen: impl Into<String>, forward: impl Into<String>) -> Self {
        Self {
            listen: listen.into(),
            forward: forward.into(),
            mirrors: Vec::new(),
            zero_copy: false,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Validate the configuration before binding.
    ///
    /// The zero-copy transport is rejected here when the platform offers no
    /// splice/tee so that startup fails with a clear error instead of the
    /// first session failing.
    pub fn validate(&self) -> Result<()> {
        if self.listen.is_empty() {
            return Err(RelayError::Config(
                "listen address is required (-l/--listen)".to_string(),
            ));
        }
        if self.forward.is_empty() {
            return Err(RelayError::Config(
                "forward address is required (-f/--forward)".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(RelayError::Config(
                "mirror connect timeout must be positive".to_string(),
            ));
        }
        if self.zero_copy && !ZeroCopyCapabilities::detect().available {
            return Err(RelayError::ZeroCopyUnsupported);
        }
        Ok(())
    }
}

/// Optional TOML configuration file; command-line flags take precedence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub listen: Option<String>,
    pub forward: Option<String>,
    #[serde(default)]
    pub mirrors: Vec<String>,
    pub zero_copy: Option<bool>,
    pub connect_timeout_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
    pub retry_delay_ms: Option<u64>,
}

impl ConfigFile {
    /// Load a configuration file from the given path
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&raw).map_err(|e| {
            RelayError::Config(format!(
                "failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::new("127.0.0.1:7000", "127.0.0.1:7001");
        assert_eq!(config.connect_timeout(), Duration::from_millis(500));
        assert_eq!(config.write_timeout(), Duration::from_millis(20));
        assert!(!config.zero_copy);
        assert!(config.mirrors.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_addresses() {
        let config = RelayConfig::new("", "127.0.0.1:7001");
        assert!(matches!(config.validate(), Err(RelayError::Config(_))));

        let config = RelayConfig::new("127.0.0.1:7000", "");
        assert!(matches!(config.validate(), Err(RelayError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_connect_timeout() {
        let mut config = RelayConfig::new("127.0.0.1:7000", "127.0.0.1:7001");
        config.connect_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(RelayError::Config(_))));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_validate_accepts_zero_copy_on_linux() {
        let mut config = RelayConfig::new("127.0.0.1:7000", "127.0.0.1:7001");
        config.zero_copy = true;
        assert!(config.validate().is_ok());
    }

    #[cfg(not(target_os = "linux"))]
    #[test]
    fn test_validate_rejects_zero_copy_without_splice() {
        let mut config = RelayConfig::new("127.0.0.1:7000", "127.0.0.1:7001");
        config.zero_copy = true;
        assert!(matches!(
            config.validate(),
            Err(RelayError::ZeroCopyUnsupported)
        ));
    }

    #[test]
    fn test_config_file_parse() {
        let raw = r#"
            listen = "127.0.0.1:7000"
            forward = "127.0.0.1:7001"
            mirrors = ["127.0.0.1:7002", "127.0.0.1:7003"]
            zero_copy = true
            write_timeout_ms = 50
        "#;
        let file: ConfigFile = toml::from_str(raw).unwrap();
        assert_eq!(file.listen.as_deref(), Some("127.0.0.1:7000"));
        assert_eq!(file.mirrors.len(), 2);
        assert_eq!(file.zero_copy, Some(true));
        assert_eq!(file.write_timeout_ms, Some(50));
        assert_eq!(file.connect_timeout_ms, None);
    }
}
