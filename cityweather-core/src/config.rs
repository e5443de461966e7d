use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf, sync::Arc, time::Duration};

use crate::{
    city_source::{BundledCitySource, CitySource, JsonFileCitySource},
    coordinator::{CoordinatorOptions, DEFAULT_REFRESH_INTERVAL, OverlapPolicy},
    weather_service::Units,
};

/// Environment variable that overrides the stored API key.
pub const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

fn default_refresh_interval_secs() -> u64 {
    DEFAULT_REFRESH_INTERVAL.as_secs()
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// OpenWeather API key.
    pub api_key: Option<String>,

    #[serde(default)]
    pub units: Units,

    /// Seconds between full refreshes of the city list.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Directory with `StartCity.json` and `CityList.json`.
    /// The bundled lists are used when unset.
    pub city_dir: Option<PathBuf>,

    /// Overrides the OpenWeather API root, e.g. for a local proxy.
    pub base_url: Option<String>,

    #[serde(default)]
    pub overlap: OverlapPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            units: Units::default(),
            refresh_interval_secs: default_refresh_interval_secs(),
            city_dir: None,
            base_url: None,
            overlap: OverlapPolicy::default(),
        }
    }
}

impl Config {
    /// Load config from disk, or return an empty default if it doesn't exist yet.
    /// The API key from the environment, when set, wins over the stored one.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        let mut cfg = Self::load_from(&path)?;

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                cfg.api_key = Some(key);
            }
        }

        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "cityweather", "cityweather-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn set_api_key(&mut self, api_key: String) {
        self.api_key = Some(api_key);
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.trim().is_empty())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn coordinator_options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            refresh_interval: self.refresh_interval(),
            overlap: self.overlap,
            ..CoordinatorOptions::default()
        }
    }

    pub fn city_source(&self) -> Arc<dyn CitySource> {
        match &self.city_dir {
            Some(dir) => Arc::new(JsonFileCitySource::new(dir)),
            None => Arc::new(BundledCitySource),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_key_and_default_interval() {
        let cfg = Config::default();

        assert!(cfg.api_key().is_none());
        assert_eq!(cfg.refresh_interval(), Duration::from_secs(200));
        assert_eq!(cfg.units, Units::Metric);
        assert_eq!(cfg.overlap, OverlapPolicy::Allow);
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let mut cfg = Config::default();
        cfg.set_api_key("   ".into());
        assert!(cfg.api_key().is_none());

        cfg.set_api_key("OPEN_KEY".into());
        assert_eq!(cfg.api_key(), Some("OPEN_KEY"));
    }

    #[test]
    fn zero_interval_is_clamped() {
        let cfg = Config {
            refresh_interval_secs: 0,
            ..Config::default()
        };
        assert_eq!(cfg.refresh_interval(), Duration::from_secs(1));
    }

    #[test]
    fn load_from_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert!(cfg.api_key.is_none());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.set_api_key("OPEN_KEY".into());
        cfg.units = Units::Imperial;
        cfg.refresh_interval_secs = 60;
        cfg.overlap = OverlapPolicy::SkipWhileInFlight;
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.api_key(), Some("OPEN_KEY"));
        assert_eq!(loaded.units, Units::Imperial);
        assert_eq!(loaded.refresh_interval(), Duration::from_secs(60));
        assert_eq!(loaded.overlap, OverlapPolicy::SkipWhileInFlight);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "api_key = \"K\"\nunits = \"standard\"\noverlap = \"skip-while-in-flight\"\n",
        )
        .unwrap();

        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.units, Units::Standard);
        assert_eq!(cfg.refresh_interval_secs, 200);
        assert_eq!(cfg.overlap, OverlapPolicy::SkipWhileInFlight);
        assert!(cfg.city_dir.is_none());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "units = [").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn coordinator_options_follow_config() {
        let cfg = Config {
            refresh_interval_secs: 30,
            overlap: OverlapPolicy::SkipWhileInFlight,
            ..Config::default()
        };

        let options = cfg.coordinator_options();
        assert_eq!(options.refresh_interval, Duration::from_secs(30));
        assert_eq!(options.overlap, OverlapPolicy::SkipWhileInFlight);
        assert_eq!(options.city_file, "StartCity");
    }
}
