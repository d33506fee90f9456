//! OpenWeatherMap forecast client.
//!
//! This module provides the `WeatherClient`, which builds 5-day/3-hour
//! forecast requests and sends them through the `Registration`, so a
//! failed network call falls back to the last stored forecast for the
//! same city.

pub mod client;
pub mod error;
pub mod models;

pub use client::{ForecastResult, WeatherClient};
pub use error::ApiError;
pub use models::{City, Forecast, ForecastEntry};
