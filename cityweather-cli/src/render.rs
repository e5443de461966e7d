use chrono::Local;
use cityweather_core::{City, Units, WeatherResult};

/// Renders the published weather list as a fixed-width table.
pub fn weather_table(list: &[WeatherResult], units: Units) -> String {
    if list.is_empty() {
        return "No weather yet.".to_string();
    }

    let temp = units.temperature_suffix();
    let wind = units.wind_speed_suffix();

    let mut out = format!(
        "{:<20} {:>9} {:>9} {:>15} {:>5} {:>9}  {:<22} {}\n",
        "City", "Temp", "Feels", "Min/Max", "Hum", "Wind", "Condition", "Observed"
    );

    for w in list {
        out.push_str(&format!(
            "{:<20} {:>9} {:>9} {:>15} {:>4}% {:>9}  {:<22} {}\n",
            truncate(&w.name, 20),
            format!("{:.1}{temp}", w.temperature),
            format!("{:.1}{temp}", w.feels_like),
            format!("{:.0}/{:.0}{temp}", w.temp_min, w.temp_max),
            w.humidity_pct,
            format!("{:.1}{wind}", w.wind_speed),
            truncate(&w.condition, 22),
            w.observation_time.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        ));
    }

    out
}

pub fn city_line(city: &City) -> String {
    match city.id {
        Some(id) => format!("{:>9}  {}", id, city.display_name()),
        None => format!("{:>9}  {}", "-", city.display_name()),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max - 1).collect();
        format!("{cut}…")
    } else {
        s.to_string()
    }
}
