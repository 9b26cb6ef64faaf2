//! Configuration file support for the route table cache
//!
//! Loads and validates settings from a TOML file.
//! Default location: /etc/sonic/route-table.conf

use crate::error::{Result, RouteTableError};
use crate::rate_limit::RateLimitConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/route-table.conf";

/// Netlink socket configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetlinkConfig {
    /// Receive buffer for one notification datagram (bytes)
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: usize,

    /// Kernel SO_RCVBUF for the subscription socket (bytes, 0 = kernel default)
    /// NIST: SC-5 - Adequate buffering reduces overruns under route churn
    #[serde(default = "default_socket_rcvbuf")]
    pub socket_rcvbuf: usize,

    /// Receive buffer for route dump replies (bytes)
    #[serde(default = "default_dump_buffer_size")]
    pub dump_buffer_size: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Rate-limited messages allowed per minute
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,

    /// Rate-limited messages allowed in a burst
    #[serde(default = "default_rate_limit_burst")]
    pub rate_limit_burst: u32,
}

/// Complete route table configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteTableConfig {
    #[serde(default)]
    pub netlink: NetlinkConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_recv_buffer_size() -> usize {
    64 * 1024
}

fn default_socket_rcvbuf() -> usize {
    1024 * 1024
}

fn default_dump_buffer_size() -> usize {
    64 * 1024
}

fn default_rate_limit_per_minute() -> u32 {
    5
}

fn default_rate_limit_burst() -> u32 {
    20
}

impl Default for NetlinkConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: default_recv_buffer_size(),
            socket_rcvbuf: default_socket_rcvbuf(),
            dump_buffer_size: default_dump_buffer_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: default_rate_limit_per_minute(),
            rate_limit_burst: default_rate_limit_burst(),
        }
    }
}

impl RouteTableConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let config: Self = match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                RouteTableError::Config(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(RouteTableError::Io(e)),
        };

        config.validate()?;
        Ok(config)
    }

    /// Load from default location or defaults
    pub fn load() -> Result<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Limiter settings for hot-path log messages
    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            burst: self.logging.rate_limit_burst,
            per_minute: self.logging.rate_limit_per_minute,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        // One netlink message header plus rtmsg must fit
        if self.netlink.recv_buffer_size < 4096 {
            return Err(RouteTableError::Config(
                "recv_buffer_size must be >= 4096".to_string(),
            ));
        }

        if self.netlink.dump_buffer_size < 4096 {
            return Err(RouteTableError::Config(
                "dump_buffer_size must be >= 4096".to_string(),
            ));
        }

        if self.logging.rate_limit_burst == 0 {
            return Err(RouteTableError::Config(
                "rate_limit_burst must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RouteTableConfig::default();
        assert_eq!(config.netlink.recv_buffer_size, 65536);
        assert_eq!(config.netlink.socket_rcvbuf, 1024 * 1024);
        assert_eq!(config.logging.rate_limit_per_minute, 5);
        assert_eq!(config.logging.rate_limit_burst, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rate_limit_mapping() {
        let config = RouteTableConfig::default();
        assert_eq!(config.rate_limit(), RateLimitConfig::default());
    }

    #[test]
    fn test_validate_small_buffer() {
        let mut config = RouteTableConfig::default();
        config.netlink.recv_buffer_size = 128;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_burst() {
        let mut config = RouteTableConfig::default();
        config.logging.rate_limit_burst = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[netlink]
socket_rcvbuf = 4194304

[logging]
rate_limit_burst = 50
"#;
        let config: RouteTableConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.netlink.socket_rcvbuf, 4 * 1024 * 1024);
        assert_eq!(config.logging.rate_limit_burst, 50);
        // Unspecified values should use defaults
        assert_eq!(config.netlink.recv_buffer_size, 65536);
        assert_eq!(config.logging.rate_limit_per_minute, 5);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[netlink]\ndump_buffer_size = 131072").unwrap();

        let config = RouteTableConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config.netlink.dump_buffer_size, 131072);
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[netlink\nbroken").unwrap();

        let err = RouteTableConfig::load_or_default(file.path()).unwrap_err();
        assert!(matches!(err, RouteTableError::Config(_)));
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = RouteTableConfig::load_or_default("/nonexistent/route-table.conf").unwrap();
        assert_eq!(config.netlink.recv_buffer_size, 65536);
    }
}
