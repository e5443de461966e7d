//! Keeps the tracked city list and the latest weather for those cities.
//!
//! The coordinator pulls the start list from a [`CitySource`], refreshes the
//! whole list from a [`WeatherService`] on a fixed interval, and appends single
//! lookups when a city is added. Results are published on a `watch` channel
//! (late subscribers see the latest list) and failures on a `broadcast`
//! channel (one-shot, not replayed).

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{
    sync::{Mutex, broadcast, watch},
    task::{JoinHandle, JoinSet},
    time::{Instant, MissedTickBehavior},
};

use crate::{
    city_source::{CitySource, START_CITY_FILE},
    model::{City, WeatherResult},
    weather_service::WeatherService,
};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(200);

const ERROR_CHANNEL_CAPACITY: usize = 16;

/// User-facing failures published on the error stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("Unable to get city list.")]
    CityListUnavailable,
    #[error("Unable to get weather information for city list.")]
    CityListWeatherUnavailable,
    #[error("Unable to get weather information for selected city.")]
    SelectedCityWeatherUnavailable,
    #[error("City already added in city list.")]
    CityAlreadyAdded,
}

/// What a periodic refresh does when the previous one has not finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlapPolicy {
    /// Start another batch fetch anyway; the last response to arrive wins.
    #[default]
    Allow,
    /// Skip the refresh while a batch fetch is outstanding.
    SkipWhileInFlight,
}

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub refresh_interval: Duration,
    pub city_file: String,
    pub overlap: OverlapPolicy,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            city_file: START_CITY_FILE.to_string(),
            overlap: OverlapPolicy::default(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    city_source: Arc<dyn CitySource>,
    weather_service: Arc<dyn WeatherService>,
    options: CoordinatorOptions,
    cities: Mutex<Vec<City>>,
    weather_tx: watch::Sender<Vec<WeatherResult>>,
    error_tx: broadcast::Sender<CoordinatorError>,
    batch_in_flight: AtomicBool,
}

/// Cheap to clone; clones share the same state.
#[derive(Debug, Clone)]
pub struct CityWeatherCoordinator {
    inner: Arc<Inner>,
}

/// Handle to the background sync task. Dropping it stops the timer and
/// discards any fetch the task started that has not completed.
#[derive(Debug)]
pub struct SyncTask {
    handle: JoinHandle<()>,
}

impl SyncTask {
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SyncTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl CityWeatherCoordinator {
    pub fn new(
        city_source: Arc<dyn CitySource>,
        weather_service: Arc<dyn WeatherService>,
        options: CoordinatorOptions,
    ) -> Self {
        let (weather_tx, _) = watch::channel(Vec::new());
        let (error_tx, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                city_source,
                weather_service,
                options,
                cities: Mutex::new(Vec::new()),
                weather_tx,
                error_tx,
                batch_in_flight: AtomicBool::new(false),
            }),
        }
    }

    pub fn options(&self) -> &CoordinatorOptions {
        &self.inner.options
    }

    /// Stream of the full published weather list.
    pub fn weather_list(&self) -> watch::Receiver<Vec<WeatherResult>> {
        self.inner.weather_tx.subscribe()
    }

    /// Stream of failures. Only errors emitted after subscribing are seen.
    pub fn errors(&self) -> broadcast::Receiver<CoordinatorError> {
        self.inner.error_tx.subscribe()
    }

    pub fn current_weather(&self) -> Vec<WeatherResult> {
        self.inner.weather_tx.borrow().clone()
    }

    pub async fn city_list(&self) -> Vec<City> {
        self.inner.cities.lock().await.clone()
    }

    /// Loads the start list, then refreshes weather for it.
    ///
    /// On failure the city list is left empty and no fetch is issued.
    pub async fn load_cities(&self) {
        let filename = self.inner.options.city_file.as_str();

        match self.inner.city_source.get_city_info(filename).await {
            Ok(cities) => {
                tracing::info!(count = cities.len(), filename, "loaded city list");
                *self.inner.cities.lock().await = cities;
                self.refresh().await;
            }
            Err(err) => {
                tracing::warn!(filename, error = %format!("{err:#}"), "getCityInfo failed");
                self.inner.cities.lock().await.clear();
                self.emit(CoordinatorError::CityListUnavailable);
            }
        }
    }

    /// Fetches weather for every tracked city and replaces the published list.
    pub async fn refresh(&self) {
        let city_ids = {
            let cities = self.inner.cities.lock().await;
            join_city_ids(&cities)
        };

        if city_ids.is_empty() {
            tracing::debug!("no city ids to refresh");
            return;
        }

        let _guard = match self.inner.options.overlap {
            OverlapPolicy::Allow => None,
            OverlapPolicy::SkipWhileInFlight => {
                match InFlightGuard::acquire(&self.inner.batch_in_flight) {
                    Some(guard) => Some(guard),
                    None => {
                        tracing::debug!("batch refresh already in flight, skipping");
                        return;
                    }
                }
            }
        };

        tracing::debug!(%city_ids, "refreshing weather for city list");

        match self.inner.weather_service.get_weather_by_ids(&city_ids).await {
            Ok(response) => match response.list {
                Some(list) => {
                    tracing::info!(count = list.len(), "published weather for city list");
                    self.inner.weather_tx.send_replace(list);
                }
                None => tracing::debug!("batch response carried no list"),
            },
            Err(err) => {
                tracing::warn!(%city_ids, error = %format!("{err:#}"), "weather for city list failed");
                self.emit(CoordinatorError::CityListWeatherUnavailable);
            }
        }
    }

    /// Adds `city` unless a city with the same id is already tracked or it
    /// has no name, then appends its weather to the published list.
    ///
    /// The city stays in the list even if the lookup fails.
    pub async fn add_city(&self, city: City) {
        let query = {
            let mut cities = self.inner.cities.lock().await;

            // A city without a name cannot be looked up and is refused the
            // same way as a duplicate.
            let name = match &city.name {
                Some(name) if !cities.iter().any(|existing| existing.id == city.id) => {
                    name.clone()
                }
                _ => {
                    drop(cities);
                    tracing::debug!(id = ?city.id, name = ?city.name, "city not added");
                    self.emit(CoordinatorError::CityAlreadyAdded);
                    return;
                }
            };

            cities.push(city);
            name
        };

        tracing::debug!(%query, "fetching weather for added city");

        match self.inner.weather_service.get_weather_by_query(&query).await {
            Ok(Some(result)) => {
                tracing::info!(name = %result.name, "appended weather for added city");
                self.inner.weather_tx.send_modify(|list| list.push(result));
            }
            Ok(None) => tracing::debug!(%query, "no weather returned for added city"),
            Err(err) => {
                tracing::warn!(%query, error = %format!("{err:#}"), "weather for selected city failed");
                self.emit(CoordinatorError::SelectedCityWeatherUnavailable);
            }
        }
    }

    /// Runs [`add_city`](Self::add_city) in the background.
    pub fn request_add_city(&self, city: City) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.add_city(city).await })
    }

    /// Starts the background sync: loads the city list, then refreshes on
    /// every interval. The first tick fires one full interval after start.
    ///
    /// Periodic refreshes are spawned independently, so a slow fetch does not
    /// delay the next tick.
    pub fn start(&self) -> SyncTask {
        self.spawn_sync(true)
    }

    /// Like [`start`](Self::start) for a coordinator whose city list was
    /// already loaded with [`load_cities`](Self::load_cities).
    pub fn start_periodic(&self) -> SyncTask {
        self.spawn_sync(false)
    }

    fn spawn_sync(&self, load_first: bool) -> SyncTask {
        let this = self.clone();
        let period = self.inner.options.refresh_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // Dropping the set aborts every outstanding fetch with it.
            let mut in_flight = JoinSet::new();

            if load_first {
                let loader = this.clone();
                in_flight.spawn(async move { loader.load_cities().await });
            }

            loop {
                ticker.tick().await;
                while in_flight.try_join_next().is_some() {}

                let refresher = this.clone();
                in_flight.spawn(async move { refresher.refresh().await });
            }
        });

        SyncTask { handle }
    }

    fn emit(&self, error: CoordinatorError) {
        // No subscribers is fine; errors are not retained.
        let _ = self.inner.error_tx.send(error);
    }
}

/// Comma-joined ids of the cities that have one.
pub fn join_city_ids(cities: &[City]) -> String {
    cities
        .iter()
        .filter_map(|city| city.id)
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
