//! Persisted defaults (spec §6's option set doubles as config-file keys):
//! host, user, output format, timeout and cache path, loaded once at startup
//! and overridden by any CLI flag the user actually passed.

use crate::error::ConfigError;
use crate::transport::TIMEOUT_RESOLUTION;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default_user: Option<String>,
    #[serde(default = "Config::default_format")]
    pub default_format: String,
    #[serde(default = "Config::default_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default_cache_path: Option<PathBuf>,
}

impl Config {
    fn default_format() -> String {
        "CSV".to_string()
    }

    fn default_timeout_ms() -> u64 {
        5000
    }

    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path();
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).expect("Config always serializes");
        std::fs::write(&path, content)?;
        Ok(())
    }

    pub fn create_default() -> Result<PathBuf, ConfigError> {
        let config = Config::default();
        config.save()?;
        Ok(config_path())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_host: None,
            default_user: None,
            default_format: Self::default_format(),
            default_timeout_ms: Self::default_timeout_ms(),
            default_cache_path: None,
        }
    }
}

/// Reject a timeout below [`TIMEOUT_RESOLUTION`] (spec §6: `-t|--timeout`).
pub fn validate_timeout_ms(ms: u64) -> Result<(), ConfigError> {
    let min = TIMEOUT_RESOLUTION.as_millis() as u64;
    if ms < min {
        return Err(ConfigError::TimeoutTooSmall { min, got: ms });
    }
    Ok(())
}

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tr64c")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_no_host_or_user_but_a_usable_format_and_timeout() {
        let cfg = Config::default();
        assert_eq!(cfg.default_host, None);
        assert_eq!(cfg.default_user, None);
        assert_eq!(cfg.default_format, "CSV");
        assert_eq!(cfg.default_timeout_ms, 5000);
    }

    #[test]
    fn timeout_below_resolution_is_rejected() {
        let err = validate_timeout_ms(50).unwrap_err();
        assert!(matches!(err, ConfigError::TimeoutTooSmall { .. }));
    }

    #[test]
    fn timeout_at_resolution_is_accepted() {
        assert!(validate_timeout_ms(TIMEOUT_RESOLUTION.as_millis() as u64).is_ok());
    }

    #[test]
    fn round_trips_through_toml() {
        let mut cfg = Config::default();
        cfg.default_host = Some("192.168.1.1".to_string());
        let text = toml::to_string_pretty(&cfg).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.default_host.as_deref(), Some("192.168.1.1"));
        assert_eq!(back.default_format, "CSV");
    }
}
