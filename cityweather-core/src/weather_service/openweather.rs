use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::model::{CityListWeather, WeatherResult};

use super::{Units, WeatherService};

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

#[derive(Debug, Clone)]
pub struct OpenWeatherService {
    api_key: String,
    base_url: String,
    units: Units,
    http: Client,
}

impl OpenWeatherService {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            units: Units::default(),
            http: Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_units(mut self, units: Units) -> Self {
        self.units = units;
        self
    }

    /// Sends a GET and returns status plus body text.
    async fn get(
        &self,
        path: &str,
        params: &[(&str, &str)],
        what: &str,
    ) -> Result<(StatusCode, String)> {
        let url = format!("{}{}", self.base_url, path);

        let mut query: Vec<(&str, &str)> = params.to_vec();
        query.push(("appid", self.api_key.as_str()));
        query.push(("units", self.units.as_str()));

        tracing::debug!(%url, what, "sending OpenWeather request");

        let res = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .with_context(|| format!("Failed to send request to OpenWeather ({what})"))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .with_context(|| format!("Failed to read OpenWeather {what} response body"))?;

        Ok((status, body))
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    feels_like: f64,
    temp_min: f64,
    temp_max: f64,
    #[serde(default)]
    pressure: Option<u32>,
    humidity: u8,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
}

#[derive(Debug, Deserialize, Default)]
struct OwWind {
    #[serde(default)]
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwCurrent {
    id: Option<i64>,
    name: String,
    dt: i64,
    main: OwMain,
    #[serde(default)]
    weather: Vec<OwWeather>,
    #[serde(default)]
    wind: OwWind,
}

#[derive(Debug, Deserialize)]
struct OwGroupResponse {
    cnt: Option<usize>,
    list: Option<Vec<OwCurrent>>,
}

impl From<OwCurrent> for WeatherResult {
    fn from(ow: OwCurrent) -> Self {
        let condition = ow
            .weather
            .first()
            .map(|w| w.description.clone())
            .unwrap_or_else(|| "Unknown".to_string());

        WeatherResult {
            id: ow.id,
            name: ow.name,
            temperature: ow.main.temp,
            feels_like: ow.main.feels_like,
            temp_min: ow.main.temp_min,
            temp_max: ow.main.temp_max,
            condition,
            humidity_pct: ow.main.humidity,
            pressure_hpa: ow.main.pressure,
            wind_speed: ow.wind.speed,
            observation_time: unix_to_utc(ow.dt).unwrap_or_else(Utc::now),
        }
    }
}

pub(crate) fn parse_group_body(body: &str) -> Result<CityListWeather> {
    let parsed: OwGroupResponse =
        serde_json::from_str(body).context("Failed to parse OpenWeather group JSON")?;

    Ok(CityListWeather {
        cnt: parsed.cnt,
        list: parsed
            .list
            .map(|list| list.into_iter().map(WeatherResult::from).collect()),
    })
}

pub(crate) fn parse_current_body(body: &str) -> Result<WeatherResult> {
    let parsed: OwCurrent =
        serde_json::from_str(body).context("Failed to parse OpenWeather current JSON")?;
    Ok(parsed.into())
}

#[async_trait]
impl WeatherService for OpenWeatherService {
    async fn get_weather_by_ids(&self, city_ids: &str) -> Result<CityListWeather> {
        let (status, body) = self
            .get("/data/2.5/group", &[("id", city_ids)], "group")
            .await?;

        if !status.is_success() {
            return Err(anyhow!(
                "OpenWeather group request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        parse_group_body(&body)
    }

    async fn get_weather_by_query(&self, query: &str) -> Result<Option<WeatherResult>> {
        let (status, body) = self
            .get("/data/2.5/weather", &[("q", query)], "current")
            .await?;

        if status == StatusCode::NOT_FOUND {
            tracing::debug!(query, "OpenWeather has no city matching query");
            return Ok(None);
        }

        if !status.is_success() {
            return Err(anyhow!(
                "OpenWeather current request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        parse_current_body(&body).map(Some)
    }
}

fn unix_to_utc(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(ts, 0)
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KATHMANDU: &str = r#"{
        "coord": {"lon": 85.32, "lat": 27.72},
        "weather": [{"id": 801, "main": "Clouds", "description": "few clouds", "icon": "02d"}],
        "main": {"temp": 20.0, "feels_like": 19.4, "temp_min": 18.0, "temp_max": 22.0, "pressure": 1012, "humidity": 56},
        "wind": {"speed": 1.5, "deg": 90},
        "dt": 1560350645,
        "id": 1283240,
        "name": "Kathmandu"
    }"#;

    #[test]
    fn parses_current_weather() {
        let result = parse_current_body(KATHMANDU).unwrap();

        assert_eq!(result.id, Some(1283240));
        assert_eq!(result.name, "Kathmandu");
        assert_eq!(result.temperature, 20.0);
        assert_eq!(result.condition, "few clouds");
        assert_eq!(result.humidity_pct, 56);
        assert_eq!(result.pressure_hpa, Some(1012));
        assert_eq!(result.wind_speed, 1.5);
        assert_eq!(result.observation_time.timestamp(), 1560350645);
    }

    #[test]
    fn parses_group_envelope() {
        let body = format!(r#"{{"cnt": 1, "list": [{KATHMANDU}]}}"#);
        let weather = parse_group_body(&body).unwrap();

        assert_eq!(weather.cnt, Some(1));
        let list = weather.list.expect("list present");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, Some(1283240));
    }

    #[test]
    fn group_without_list_is_not_an_error() {
        let weather = parse_group_body(r#"{"cnt": 0}"#).unwrap();
        assert!(weather.list.is_none());
    }

    #[test]
    fn missing_description_becomes_unknown() {
        let body = r#"{"id": 2, "name": "Pokhara", "dt": 0,
            "main": {"temp": 25.0, "feels_like": 26.0, "temp_min": 24.0, "temp_max": 27.0, "humidity": 70}}"#;
        let result = parse_current_body(body).unwrap();

        assert_eq!(result.condition, "Unknown");
        assert_eq!(result.wind_speed, 0.0);
        assert_eq!(result.pressure_hpa, None);
    }

    #[test]
    fn malformed_body_is_an_error() {
        let err = parse_current_body("<html>").unwrap_err();
        assert!(err.to_string().contains("Failed to parse OpenWeather current JSON"));
    }

    #[test]
    fn truncate_body_limits_length() {
        let long = "x".repeat(500);
        let truncated = truncate_body(&long);
        assert_eq!(truncated.len(), 203);
        assert!(truncated.ends_with("..."));

        assert_eq!(truncate_body("short"), "short");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let service = OpenWeatherService::new("KEY").with_base_url("http://localhost:8080/");
        assert_eq!(service.base_url, "http://localhost:8080");
    }
}
