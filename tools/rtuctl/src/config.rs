//! rtuctl configuration
//!
//! Layered with figment: built-in defaults, then the YAML file, then
//! `RTUCTL_` environment variables (`__` separates nested keys, e.g.
//! `RTUCTL_SERIAL__BAUD_RATE=9600`). Command-line flags are applied last by
//! the subcommands themselves.

use std::path::Path;

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use voltage_rtu::constants::DEFAULT_TIMEOUT;
use voltage_rtu::SerialConfig;

/// Config file looked up in the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "rtuctl.yaml";

/// Environment prefix
pub const ENV_PREFIX: &str = "RTUCTL_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtuctlConfig {
    /// Serial device used when `-d` is not given
    pub device: Option<String>,
    pub serial: SerialConfig,
    pub log_level: String,
    /// Per-slave reply deadline for `probe`
    pub probe_timeout_ms: u64,
}

impl Default for RtuctlConfig {
    fn default() -> Self {
        Self {
            device: None,
            serial: SerialConfig::default(),
            log_level: "info".to_string(),
            probe_timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl RtuctlConfig {
    /// Load from `path`, or from `rtuctl.yaml` if it exists
    ///
    /// An explicitly named file must exist; the default one is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let figment = match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                Self::figment(path)
            },
            None => Self::figment(Path::new(DEFAULT_CONFIG_FILE)),
        };

        figment
            .extract()
            .context("Failed to load rtuctl configuration")
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Device from the command line, else from the configuration
    pub fn device<'a>(&'a self, flag: Option<&'a str>) -> Result<&'a str> {
        flag.or(self.device.as_deref())
            .context("No serial device given (use -d or set `device` in the config)")
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize configuration")
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use voltage_rtu::{BaudRate, Parity, StopBits};

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = RtuctlConfig::figment(&dir.path().join("absent.yaml"))
            .extract::<RtuctlConfig>()
            .unwrap();

        assert_eq!(config.serial, SerialConfig::default());
        assert_eq!(config.log_level, "info");
        assert_eq!(config.probe_timeout_ms, 500);
        assert!(config.device.is_none());
    }

    #[test]
    fn test_yaml_overrides_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "device: /dev/ttyUSB1\nserial:\n  baud_rate: 9600\n  parity: none\n  stop_bits: 2\nlog_level: debug"
        )
        .unwrap();

        let config = RtuctlConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.device.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(config.serial.baud_rate, BaudRate::B9600);
        assert_eq!(config.serial.parity, Parity::None);
        assert_eq!(config.serial.stop_bits, StopBits::Two);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.probe_timeout_ms, 500);
    }

    #[test]
    fn test_invalid_baud_rate_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "serial:\n  baud_rate: 12345").unwrap();

        assert!(RtuctlConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = RtuctlConfig::load(Some(Path::new("/nonexistent/rtuctl.yaml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_device_flag_wins() {
        let config = RtuctlConfig {
            device: Some("/dev/ttyS0".to_string()),
            ..Default::default()
        };
        assert_eq!(config.device(Some("/dev/ttyS1")).unwrap(), "/dev/ttyS1");
        assert_eq!(config.device(None).unwrap(), "/dev/ttyS0");
        assert!(RtuctlConfig::default().device(None).is_err());
    }

    #[test]
    fn test_yaml_output_reloads() {
        let config = RtuctlConfig::default();
        let yaml = config.to_yaml().unwrap();
        let back: RtuctlConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, config);
    }
}
