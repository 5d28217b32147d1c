use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, Result};

const APP_DIR: &str = "daily-rhythm";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    pub claude_api_key: Option<String>,

    #[serde(default = "default_storage_timeout")]
    pub storage_timeout_ms: u64,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub weather: WeatherConfig,

    #[serde(default)]
    pub reminders: ReminderConfig,

    #[serde(default)]
    pub google: Option<OAuthConfig>,

    #[serde(default)]
    pub strava: Option<OAuthConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub base_url: Option<String>,
    pub token: Option<String>,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeatherConfig {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Place name resolved through geocoding when coordinates are missing
    pub location: Option<String>,
    /// Open-Meteo endpoint overrides, e.g. for a self-hosted instance
    pub forecast_url: Option<String>,
    pub geocoding_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_lead_minutes")]
    pub lead_minutes: u32,
}

/// Refresh-token credentials for Google Calendar or Strava
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub calendar_id: Option<String>,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR);
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("rhythm.db").to_string_lossy().to_string()
}

fn default_storage_timeout() -> u64 {
    3000
}

fn default_debounce_ms() -> u64 {
    1500
}

fn default_poll_interval() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_lead_minutes() -> u32 {
    30
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            debounce_ms: default_debounce_ms(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl SyncConfig {
    pub fn is_configured(&self) -> bool {
        self.base_url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }
}

impl WeatherConfig {
    pub fn is_configured(&self) -> bool {
        self.location.is_some() || (self.latitude.is_some() && self.longitude.is_some())
    }
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lead_minutes: default_lead_minutes(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            claude_api_key: None,
            storage_timeout_ms: default_storage_timeout(),
            sync: SyncConfig::default(),
            weather: WeatherConfig::default(),
            reminders: ReminderConfig::default(),
            google: None,
            strava: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &PathBuf) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, config_path: &PathBuf) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
db_path = "/tmp/rhythm.db"

[sync]
base_url = "https://rhythm.example.com"

[weather]
location = "Lisbon"
"#,
        )
        .unwrap();

        assert_eq!(config.db_path, "/tmp/rhythm.db");
        assert!(config.sync.is_configured());
        assert_eq!(config.sync.debounce_ms, 1500);
        assert_eq!(config.sync.poll_interval_secs, 30);
        assert_eq!(config.storage_timeout_ms, 3000);
        assert!(config.reminders.enabled);
        assert_eq!(config.reminders.lead_minutes, 30);
        assert_eq!(config.weather.location.as_deref(), Some("Lisbon"));
        assert!(config.google.is_none());
    }

    #[test]
    fn weather_needs_a_place() {
        let mut weather = WeatherConfig::default();
        assert!(!weather.is_configured());
        weather.latitude = Some(38.7);
        assert!(!weather.is_configured());
        weather.longitude = Some(-9.1);
        assert!(weather.is_configured());
    }

    #[test]
    fn missing_file_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert!(!config.sync.is_configured());

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.db_path, config.db_path);
    }
}
