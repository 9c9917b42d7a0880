//! Configuration management.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Smallest numeral field that fits "1023.9".
pub const MIN_RATE_WIDTH: usize = 6;

/// Main configuration structure.
///
/// Unknown keys are ignored so that configuration files written for newer
/// versions still load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Refresh interval in seconds
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Maximum rendered line width in characters
    #[serde(default = "default_max_label_len")]
    pub max_label_len: usize,

    /// Tray icon override (only used by the applet)
    #[serde(default)]
    pub icon: Option<PathBuf>,

    /// Width of the numeral field in byte-rate tokens
    #[serde(default = "default_rate_width")]
    pub rate_width: usize,

    /// Upper bound for a single backend call in milliseconds
    #[serde(default = "default_backend_timeout_ms")]
    pub backend_timeout_ms: u64,

    /// Host filesystem root that holds `proc/` and `sys/`
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// RAPL energy counter wrap modulus in microjoules.
    /// When unset the value of `max_energy_range_uj` is used.
    #[serde(default)]
    pub rapl_wrap_uj: Option<u64>,
}

// Default value functions
fn default_interval() -> u64 {
    1
}

fn default_max_label_len() -> usize {
    140
}

fn default_rate_width() -> usize {
    MIN_RATE_WIDTH
}

fn default_backend_timeout_ms() -> u64 {
    800
}

fn default_root() -> PathBuf {
    PathBuf::from("/")
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Loads configuration from a TOML file, or defaults if the file does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parses and validates configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(Error::Config("interval must be at least 1 second".into()));
        }
        if self.rate_width < MIN_RATE_WIDTH {
            return Err(Error::Config(format!(
                "rate_width must be at least {}",
                MIN_RATE_WIDTH
            )));
        }
        if self.backend_timeout_ms == 0 {
            return Err(Error::Config("backend_timeout_ms must be positive".into()));
        }
        if self.rapl_wrap_uj == Some(0) {
            return Err(Error::Config("rapl_wrap_uj must be positive".into()));
        }
        Ok(())
    }

    /// Default configuration file location under the XDG config directory.
    pub fn default_path() -> PathBuf {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .filter(|p| p.is_absolute())
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("sysline").join("config.toml")
    }

    /// Refresh interval as a duration.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// Backend timeout as a duration.
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            max_label_len: default_max_label_len(),
            icon: None,
            rate_width: default_rate_width(),
            backend_timeout_ms: default_backend_timeout_ms(),
            root: default_root(),
            rapl_wrap_uj: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.interval, 1);
        assert_eq!(config.max_label_len, 140);
        assert_eq!(config.rate_width, MIN_RATE_WIDTH);
        assert_eq!(config.root, PathBuf::from("/"));
        assert!(config.icon.is_none());
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let config = Config::parse("interval = 2\nfancy_colors = true\n[extra]\nx = 1\n").unwrap();
        assert_eq!(config.interval, 2);
    }

    #[test]
    fn test_overrides() {
        let config = Config::parse(
            "max_label_len = 90\nicon = \"/tmp/blank.png\"\nbackend_timeout_ms = 250\nrapl_wrap_uj = 262143328850\n",
        )
        .unwrap();
        assert_eq!(config.max_label_len, 90);
        assert_eq!(config.icon, Some(PathBuf::from("/tmp/blank.png")));
        assert_eq!(config.backend_timeout(), Duration::from_millis(250));
        assert_eq!(config.rapl_wrap_uj, Some(262_143_328_850));
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            Config::parse("interval = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::parse("rate_width = 4"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::parse("interval = \"fast\""),
            Err(Error::TomlParse(_))
        ));
    }

    #[test]
    fn test_missing_file_defaults() {
        let config = Config::load_or_default("/nonexistent/sysline/config.toml").unwrap();
        assert_eq!(config.interval, 1);
    }
}
