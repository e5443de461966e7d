use crate::{
    Config,
    model::{CityListWeather, WeatherResult},
    weather_service::openweather::OpenWeatherService,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

pub mod openweather;

/// Measurement system requested from the weather API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
    Standard,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
            Units::Standard => "standard",
        }
    }

    pub const fn all() -> &'static [Units] {
        &[Units::Metric, Units::Imperial, Units::Standard]
    }

    pub fn temperature_suffix(&self) -> &'static str {
        match self {
            Units::Metric => "°C",
            Units::Imperial => "°F",
            Units::Standard => "K",
        }
    }

    pub fn wind_speed_suffix(&self) -> &'static str {
        match self {
            Units::Imperial => "mph",
            Units::Metric | Units::Standard => "m/s",
        }
    }
}

impl std::fmt::Display for Units {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Units {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "metric" => Ok(Units::Metric),
            "imperial" => Ok(Units::Imperial),
            "standard" => Ok(Units::Standard),
            _ => Err(anyhow::anyhow!(
                "Unknown units '{value}'. Supported units: metric, imperial, standard."
            )),
        }
    }
}

#[async_trait]
pub trait WeatherService: Send + Sync + Debug {
    /// Batch lookup; `city_ids` is a comma-joined list of city ids.
    async fn get_weather_by_ids(&self, city_ids: &str) -> anyhow::Result<CityListWeather>;

    /// Single lookup by free-form query, usually a city name.
    async fn get_weather_by_query(&self, query: &str) -> anyhow::Result<Option<WeatherResult>>;
}

/// Construct the weather service described by config.
pub fn weather_service_from_config(config: &Config) -> anyhow::Result<Box<dyn WeatherService>> {
    let api_key = config.api_key().ok_or_else(|| {
        anyhow::anyhow!(
            "No OpenWeather API key configured.\n\
                 Hint: run `cityweather configure` or set OPENWEATHER_API_KEY."
        )
    })?;

    let mut service = OpenWeatherService::new(api_key).with_units(config.units);
    if let Some(base_url) = &config.base_url {
        service = service.with_base_url(base_url.clone());
    }

    Ok(Box::new(service))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn units_as_str_roundtrip() {
        for units in Units::all() {
            let parsed = Units::try_from(units.as_str()).expect("roundtrip should succeed");
            assert_eq!(*units, parsed);
        }
    }

    #[test]
    fn unknown_units_error() {
        let err = Units::try_from("furlongs").unwrap_err();
        assert!(err.to_string().contains("Unknown units"));
    }

    #[test]
    fn weather_service_from_config_errors_when_missing_api_key() {
        let cfg = Config::default();
        let err = weather_service_from_config(&cfg).unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("No OpenWeather API key configured"));
        assert!(msg.contains("Hint: run `cityweather configure`"));
    }

    #[test]
    fn weather_service_from_config_works_when_key_set() {
        let mut cfg = Config::default();
        cfg.set_api_key("KEY".to_string());

        assert!(weather_service_from_config(&cfg).is_ok());
    }
}
