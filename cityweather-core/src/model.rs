use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub lon: f64,
    pub lat: f64,
}

/// A city the coordinator tracks.
///
/// Matches the shape of OpenWeather's `city.list.json` entries, so the
/// bundled files and user-provided files can be deserialized directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct City {
    pub id: Option<i64>,
    pub name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub coord: Option<Coord>,
}

impl City {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: Some(name.into()),
            country: None,
            coord: None,
        }
    }

    pub fn display_name(&self) -> String {
        match (&self.name, &self.country) {
            (Some(name), Some(country)) => format!("{name}, {country}"),
            (Some(name), None) => name.clone(),
            (None, _) => match self.id {
                Some(id) => format!("#{id}"),
                None => "<unnamed>".to_string(),
            },
        }
    }
}

/// Current weather for one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherResult {
    /// Links back to [`City::id`].
    pub id: Option<i64>,
    pub name: String,
    /// Temperatures and wind speed are in the units the lookup was made with.
    pub temperature: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub condition: String,
    pub humidity_pct: u8,
    pub pressure_hpa: Option<u32>,
    pub wind_speed: f64,
    pub observation_time: DateTime<Utc>,
}

/// Envelope returned by a batch lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CityListWeather {
    pub cnt: Option<usize>,
    pub list: Option<Vec<WeatherResult>>,
}
