use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use cityweather_core::{
    City, CityWeatherCoordinator, Config, Units, WeatherService,
    city_source::{CITY_CATALOG_FILE, find_city},
    weather_service::weather_service_from_config,
};
use inquire::{CustomType, Password, PasswordDisplayMode, Select};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};

use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "cityweather", version, about = "Track current weather for a list of cities")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure the API key, units and refresh interval.
    Configure,

    /// Fetch weather for the start city list once and print it.
    Show,

    /// Keep refreshing weather; type a city name and press Enter to add it.
    Watch {
        /// City to add once the start list is loaded. Repeatable.
        #[arg(long = "add", value_name = "NAME")]
        add: Vec<String>,
    },

    /// List the cities that can be added.
    Cities,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Show => show().await,
            Command::Watch { add } => watch(add).await,
            Command::Cities => cities().await,
        }
    }
}

fn configure() -> anyhow::Result<()> {
    let mut cfg = Config::load()?;

    let api_key = Password::new("OpenWeather API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;
    if !api_key.trim().is_empty() {
        cfg.set_api_key(api_key.trim().to_string());
    }

    let start = Units::all().iter().position(|u| *u == cfg.units).unwrap_or(0);
    cfg.units = Select::new("Units:", Units::all().to_vec())
        .with_starting_cursor(start)
        .prompt()
        .context("Failed to read units")?;

    cfg.refresh_interval_secs = CustomType::<u64>::new("Refresh interval (seconds):")
        .with_default(cfg.refresh_interval_secs)
        .with_error_message("Please enter a whole number of seconds")
        .prompt()
        .context("Failed to read refresh interval")?;

    cfg.save()?;
    println!("Saved configuration to {}", Config::config_file_path()?.display());

    Ok(())
}

fn build_coordinator(cfg: &Config) -> anyhow::Result<CityWeatherCoordinator> {
    let weather_service: Arc<dyn WeatherService> = Arc::from(weather_service_from_config(cfg)?);

    Ok(CityWeatherCoordinator::new(
        cfg.city_source(),
        weather_service,
        cfg.coordinator_options(),
    ))
}

async fn show() -> anyhow::Result<()> {
    let cfg = Config::load()?;
    let coordinator = build_coordinator(&cfg)?;
    let mut errors = coordinator.errors();

    coordinator.load_cities().await;

    while let Ok(err) = errors.try_recv() {
        eprintln!("error: {err}");
    }
    print!("{}", render::weather_table(&coordinator.current_weather(), cfg.units));
    println!();

    Ok(())
}

async fn load_catalog(cfg: &Config) -> anyhow::Result<Vec<City>> {
    cfg.city_source()
        .get_city_info(CITY_CATALOG_FILE)
        .await
        .context("Failed to load city catalog")
}

async fn cities() -> anyhow::Result<()> {
    let cfg = Config::load()?;

    for city in load_catalog(&cfg).await? {
        println!("{}", render::city_line(&city));
    }

    Ok(())
}

async fn watch(add: Vec<String>) -> anyhow::Result<()> {
    let cfg = Config::load()?;
    let coordinator = build_coordinator(&cfg)?;
    let catalog = load_catalog(&cfg).await?;

    let mut weather = coordinator.weather_list();
    let mut errors = coordinator.errors();

    // Load first so `--add` is checked against the start list.
    coordinator.load_cities().await;
    for name in &add {
        match find_city(&catalog, name) {
            Some(city) => coordinator.add_city(city.clone()).await,
            None => eprintln!("Unknown city '{name}'. Run `cityweather cities` to see the list."),
        }
    }
    println!("{}", render::weather_table(&weather.borrow_and_update(), cfg.units));

    let _sync = coordinator.start_periodic();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            changed = weather.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("{}", render::weather_table(&weather.borrow_and_update(), cfg.units));
            }
            err = errors.recv() => match err {
                Ok(err) => eprintln!("error: {err}"),
                Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "error stream lagged"),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => match line.context("Failed to read stdin")? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match find_city(&catalog, &line) {
                    Some(city) => {
                        coordinator.request_add_city(city.clone());
                    }
                    None => eprintln!(
                        "Unknown city '{}'. Run `cityweather cities` to see the list.",
                        line.trim()
                    ),
                },
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}
