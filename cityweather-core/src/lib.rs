//! Core library for the `cityweather` CLI.
//!
//! This crate defines:
//! - Configuration handling
//! - The city list source and the weather service abstractions
//! - The coordinator that keeps weather for the tracked cities up to date
//! - Shared domain models (cities, weather results)
//!
//! It is used by `cityweather-cli`, but can also be reused by other binaries or services.

pub mod city_source;
pub mod config;
pub mod coordinator;
pub mod model;
pub mod weather_service;

pub use city_source::{BundledCitySource, CitySource, JsonFileCitySource};
pub use config::Config;
pub use coordinator::{
    CityWeatherCoordinator, CoordinatorError, CoordinatorOptions, OverlapPolicy, SyncTask,
};
pub use model::{City, CityListWeather, Coord, WeatherResult};
pub use weather_service::{Units, WeatherService};
