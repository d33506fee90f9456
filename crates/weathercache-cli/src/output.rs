//! Terminal rendering for forecasts and cache listings.

use weathercache_core::api::{ForecastEntry, ForecastResult};

/// One line per forecast step: local time, temperature, conditions, rain chance
pub fn format_entry(entry: &ForecastEntry) -> String {
    let time = entry
        .local_dt_txt
        .as_deref()
        .or(entry.dt_txt.as_deref())
        .unwrap_or("-");
    let mut line = format!("{}  {:>6.1}°C  {}", time, entry.main.temp, entry.description());
    if let Some(pop) = entry.pop {
        line.push_str(&format!("  ☂ {:.0}%", pop * 100.0));
    }
    line
}

pub fn format_forecast(result: &ForecastResult) -> String {
    let city = &result.forecast.city;
    let mut header = city.name.clone();
    if let Some(ref country) = city.country {
        header.push_str(&format!(" ({})", country));
    }
    if result.from_cache {
        header.push_str("  [offline - cached forecast]");
    }

    let mut lines = vec![header];
    lines.extend(result.forecast.list.iter().map(format_entry));
    lines.join("\n")
}
