//! Forecast response models.
//!
//! Only the fields the CLI reads are typed; everything else the API sends is
//! kept in `extra` so JSON output round-trips the full document.

use chrono::{DateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Display format for local forecast times
const LOCAL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Forecast {
    #[serde(default)]
    pub city: City,
    #[serde(default)]
    pub list: Vec<ForecastEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct City {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Offset from UTC in seconds (Tokyo is 32400)
    #[serde(default)]
    pub timezone: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastEntry {
    /// Forecast time, unix seconds UTC
    pub dt: i64,
    #[serde(default)]
    pub main: Readings,
    #[serde(default)]
    pub weather: Vec<Condition>,
    /// Probability of precipitation, 0.0 to 1.0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pop: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dt_txt: Option<String>,
    /// `dt` shifted into the city's timezone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_dt_txt: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Readings {
    #[serde(default)]
    pub temp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feels_like: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ForecastEntry {
    pub fn description(&self) -> &str {
        self.weather
            .first()
            .map(|w| w.description.as_str())
            .unwrap_or("")
    }
}

impl Forecast {
    /// Fill in `local_dt_txt` for every entry and put the list in reverse
    /// order, latest forecast first. Entries whose time cannot be
    /// represented are left without a local time.
    pub fn localize(&mut self) {
        let offset = TimeDelta::try_seconds(self.city.timezone);
        for entry in &mut self.list {
            entry.local_dt_txt = DateTime::from_timestamp(entry.dt, 0)
                .zip(offset)
                .and_then(|(utc, offset)| utc.checked_add_signed(offset))
                .map(|local| local.format(LOCAL_TIME_FORMAT).to_string());
        }
        self.list.reverse();
    }
}
