//! Library configuration management

use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HidConfig {
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub backend: BackendSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "LoggingSettings::default_level")]
    pub log_level: String,
    /// Include thread names in log lines
    #[serde(default = "default_true")]
    pub thread_names: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_level(),
            thread_names: true,
        }
    }
}

impl LoggingSettings {
    fn default_level() -> String {
        "info".to_string()
    }
}

/// Per-session tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Upper bound on a single transfer-loop submit before the shutdown flag
    /// is checked again
    #[serde(default = "SessionSettings::default_poll_interval")]
    pub transfer_poll_interval_ms: u64,
    /// Reports kept per session before the oldest is dropped
    #[serde(default = "SessionSettings::default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "SessionSettings::default_control_timeout")]
    pub control_timeout_ms: u64,
    #[serde(default = "SessionSettings::default_write_timeout")]
    pub write_timeout_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            transfer_poll_interval_ms: Self::default_poll_interval(),
            queue_capacity: Self::default_queue_capacity(),
            control_timeout_ms: Self::default_control_timeout(),
            write_timeout_ms: Self::default_write_timeout(),
        }
    }
}

impl SessionSettings {
    fn default_poll_interval() -> u64 {
        100
    }

    fn default_queue_capacity() -> usize {
        30
    }

    fn default_control_timeout() -> u64 {
        1000
    }

    fn default_write_timeout() -> u64 {
        1000
    }

    // Zero means "no timeout" to libusb, so these never return it.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.transfer_poll_interval_ms.max(1))
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms.max(1))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Initialize the context implicitly on first enumerate/open
    #[serde(default = "default_true")]
    pub auto_initialize: bool,
    /// Detach an active kernel driver before claiming the HID interface
    #[serde(default = "default_true")]
    pub detach_kernel_driver: bool,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            auto_initialize: true,
            detach_kernel_driver: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Log levels accepted in `[logging] log_level`
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// System-wide fallback consulted after the per-user file
const SYSTEM_CONFIG_PATH: &str = "/etc/hidlink/config.toml";

impl HidConfig {
    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: HidConfig = toml::from_str(content).context("Invalid TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// First existing file among the per-user and system locations
    fn locate() -> Option<PathBuf> {
        [Self::default_path(), PathBuf::from(SYSTEM_CONFIG_PATH)]
            .into_iter()
            .find(|candidate| candidate.is_file())
    }

    /// Load from `path`, or from the first standard location that exists
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = match path.or_else(Self::locate) {
            Some(path) => path,
            None => bail!("No hidlink configuration file found"),
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Bad configuration in {}", path.display()))?;

        tracing::debug!(
            "Configuration {}: poll every {}ms, queue {} reports",
            path.display(),
            config.session.transfer_poll_interval_ms,
            config.session.queue_capacity
        );
        Ok(config)
    }

    /// Like [`HidConfig::load`] with no path, falling back to defaults
    pub fn load_or_default() -> Self {
        Self::load(None).unwrap_or_else(|e| {
            // Runs before logging exists, since logging is configured from here
            eprintln!("hidlink: {:#}", e);
            Self::default()
        })
    }

    /// Write the configuration as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;
        }
        fs::write(path, content).with_context(|| format!("Cannot write {}", path.display()))?;

        tracing::debug!("Configuration written to {}", path.display());
        Ok(())
    }

    /// `<config dir>/hidlink/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("hidlink")
            .join("config.toml")
    }

    pub fn validate(&self) -> Result<()> {
        let level = self.logging.log_level.as_str();
        ensure!(
            LOG_LEVELS.contains(&level),
            "log_level '{}' is not one of {}",
            level,
            LOG_LEVELS.join("/")
        );
        ensure!(
            self.session.transfer_poll_interval_ms > 0,
            "transfer_poll_interval_ms must be at least 1"
        );
        ensure!(
            self.session.queue_capacity > 0,
            "queue_capacity must be at least 1"
        );
        ensure!(
            self.session.control_timeout_ms > 0,
            "control_timeout_ms must be at least 1"
        );
        ensure!(
            self.session.write_timeout_ms > 0,
            "write_timeout_ms must be at least 1"
        );
        Ok(())
    }
}

/// Load configuration from a path that may start with `~`
pub fn load_config(path: &str) -> Result<HidConfig> {
    let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
    HidConfig::load(Some(path_buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = HidConfig::default();
        assert_eq!(config.logging.log_level, "info");
        assert!(config.logging.thread_names);
        assert_eq!(config.session.queue_capacity, 30);
        assert_eq!(config.session.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.session.control_timeout(), Duration::from_secs(1));
        assert!(config.backend.auto_initialize);
        config.validate().unwrap();
    }

    #[test]
    fn test_pretty_toml_reparses() {
        let mut config = HidConfig::default();
        config.session.write_timeout_ms = 40;
        let text = toml::to_string_pretty(&config).unwrap();

        let parsed = HidConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.session.write_timeout_ms, 40);
        assert_eq!(parsed.logging.log_level, config.logging.log_level);
    }

    #[test]
    fn test_missing_tables_take_defaults() {
        let parsed = HidConfig::from_toml("[session]\nqueue_capacity = 8\n").unwrap();
        assert_eq!(parsed.session.queue_capacity, 8);
        assert_eq!(parsed.session.transfer_poll_interval_ms, 100);
        assert_eq!(parsed.logging.log_level, "info");
        assert!(parsed.backend.detach_kernel_driver);

        let empty = HidConfig::from_toml("").unwrap();
        assert_eq!(empty.session.write_timeout_ms, 1000);
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let err = HidConfig::from_toml("[logging]\nlog_level = \"loud\"\n").unwrap_err();
        assert!(err.to_string().contains("loud"));

        assert!(HidConfig::from_toml("[logging]\nlog_level = \"trace\"\n").is_ok());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let mut config = HidConfig::default();
        config.session.transfer_poll_interval_ms = 0;
        assert!(config.validate().is_err());

        config.session.transfer_poll_interval_ms = 1;
        config.session.queue_capacity = 0;
        assert!(config.validate().is_err());

        config.session.queue_capacity = 1;
        config.session.write_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("write_timeout_ms"));
    }

    #[test]
    fn test_zero_timeouts_never_mean_forever() {
        let session = SessionSettings {
            transfer_poll_interval_ms: 0,
            queue_capacity: 1,
            control_timeout_ms: 0,
            write_timeout_ms: 0,
        };
        assert_eq!(session.poll_interval(), Duration::from_millis(1));
        assert_eq!(session.control_timeout(), Duration::from_millis(1));
        assert_eq!(session.write_timeout(), Duration::from_millis(1));
    }

    #[test]
    fn test_default_path_ends_with_crate_dir() {
        let path = HidConfig::default_path();
        assert!(path.ends_with("hidlink/config.toml"));
    }
}
