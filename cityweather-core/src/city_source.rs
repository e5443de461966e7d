use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use std::{fmt::Debug, path::PathBuf};

use crate::model::City;

/// Name of the file holding the cities tracked at startup.
pub const START_CITY_FILE: &str = "StartCity";

/// Name of the file holding every city a user can pick from.
pub const CITY_CATALOG_FILE: &str = "CityList";

const BUNDLED_START_CITY: &str = include_str!("../data/StartCity.json");
const BUNDLED_CITY_CATALOG: &str = include_str!("../data/CityList.json");

#[async_trait]
pub trait CitySource: Send + Sync + Debug {
    async fn get_city_info(&self, filename: &str) -> Result<Vec<City>>;
}

/// City lists compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledCitySource;

#[async_trait]
impl CitySource for BundledCitySource {
    async fn get_city_info(&self, filename: &str) -> Result<Vec<City>> {
        let contents = match filename {
            START_CITY_FILE => BUNDLED_START_CITY,
            CITY_CATALOG_FILE => BUNDLED_CITY_CATALOG,
            other => return Err(anyhow!("No bundled city file named '{other}'")),
        };

        serde_json::from_str(contents)
            .with_context(|| format!("Failed to parse bundled city file '{filename}'"))
    }
}

/// Reads `<dir>/<filename>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileCitySource {
    dir: PathBuf,
}

impl JsonFileCitySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.dir.join(format!("{filename}.json"))
    }
}

#[async_trait]
impl CitySource for JsonFileCitySource {
    async fn get_city_info(&self, filename: &str) -> Result<Vec<City>> {
        let path = self.file_path(filename);

        let contents = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read city file: {}", path.display()))?;

        let cities: Vec<City> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse city file: {}", path.display()))?;

        tracing::debug!(path = %path.display(), count = cities.len(), "loaded city file");
        Ok(cities)
    }
}

/// Case-insensitive lookup by city name.
pub fn find_city<'a>(cities: &'a [City], name: &str) -> Option<&'a City> {
    let needle = name.trim();
    cities.iter().find(|city| {
        city.name
            .as_deref()
            .is_some_and(|n| n.eq_ignore_ascii_case(needle))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bundled_source_serves_start_list_and_catalog() {
        let source = BundledCitySource;

        let start = source.get_city_info(START_CITY_FILE).await.unwrap();
        let catalog = source.get_city_info(CITY_CATALOG_FILE).await.unwrap();

        assert!(!start.is_empty());
        assert!(catalog.len() > start.len());
        assert!(start.iter().all(|c| c.id.is_some() && c.name.is_some()));
    }

    #[tokio::test]
    async fn bundled_source_rejects_unknown_file() {
        let err = BundledCitySource.get_city_info("Nowhere").await.unwrap_err();
        assert!(err.to_string().contains("No bundled city file"));
    }

    #[tokio::test]
    async fn file_source_reads_json_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("StartCity.json"),
            r#"[{"id":1,"name":"Kathmandu"}]"#,
        )
        .unwrap();

        let source = JsonFileCitySource::new(dir.path());
        let cities = source.get_city_info(START_CITY_FILE).await.unwrap();

        assert_eq!(cities, vec![City::new(1, "Kathmandu")]);
    }

    #[tokio::test]
    async fn file_source_reports_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonFileCitySource::new(dir.path());

        let err = source.get_city_info("Missing").await.unwrap_err();
        assert!(err.to_string().contains("Failed to read city file"));

        std::fs::write(dir.path().join("Broken.json"), "{ not json").unwrap();
        let err = source.get_city_info("Broken").await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse city file"));
    }

    #[test]
    fn find_city_ignores_case_and_whitespace() {
        let cities = vec![City::new(1, "Kathmandu"), City::new(2, "Pokhara")];

        assert_eq!(find_city(&cities, "  pokhara ").and_then(|c| c.id), Some(2));
        assert!(find_city(&cities, "Lalitpur").is_none());
    }
}
