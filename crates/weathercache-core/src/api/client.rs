//! Forecast client routed through the request interceptor.

use std::sync::Arc;

use reqwest::Url;
use tracing::{debug, info};

use super::models::Forecast;
use super::ApiError;
use crate::http::Request;
use crate::interceptor::Registration;

// ============================================================================
// Constants
// ============================================================================

/// 5-day / 3-hour forecast endpoint
const FORECAST_URL: &str = "https://api.openweathermap.org/data/2.5/forecast";

/// Language for condition descriptions
const FORECAST_LANG: &str = "ja";

const FORECAST_UNITS: &str = "metric";

/// Number of 3-hour steps to request (8 steps = 24 hours)
const FORECAST_STEPS: u32 = 8;

/// A forecast and whether it was served from the local cache.
#[derive(Debug, Clone)]
pub struct ForecastResult {
    pub forecast: Forecast,
    pub from_cache: bool,
}

pub struct WeatherClient {
    registration: Arc<Registration>,
    api_key: Option<String>,
    base_url: String,
}

impl WeatherClient {
    pub fn new(registration: Arc<Registration>, api_key: Option<String>) -> Self {
        Self {
            registration,
            api_key: api_key
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            base_url: FORECAST_URL.to_string(),
        }
    }

    /// Point the client at a different forecast endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build the forecast request for `city`, e.g. `Tokyo,JP`.
    pub fn forecast_request(&self, city: &str) -> Result<Request, ApiError> {
        let api_key = self.api_key.as_deref().ok_or(ApiError::MissingApiKey)?;
        let steps = FORECAST_STEPS.to_string();
        let url = Url::parse_with_params(
            &self.base_url,
            &[
                ("q", city),
                ("appid", api_key),
                ("lang", FORECAST_LANG),
                ("units", FORECAST_UNITS),
                ("cnt", steps.as_str()),
            ],
        )
        .map_err(|e| ApiError::InvalidResponse(format!("Invalid forecast URL: {}", e)))?;
        Ok(Request::from_url(url).with_header("accept", "application/json"))
    }

    /// Fetch the forecast for `city`.
    ///
    /// Goes through the active worker, so when the network is down the last
    /// stored forecast for the same city is returned with `from_cache` set.
    pub async fn forecast(&self, city: &str) -> Result<ForecastResult, ApiError> {
        let request = self.forecast_request(city)?;
        debug!(city = city, "Fetching forecast");

        let response = self.registration.fetch(request).await?;
        let from_cache = response.is_from_cache();
        if !response.ok() {
            let status = response.status();
            return Err(ApiError::from_status(status, &response.text()));
        }

        let mut forecast: Forecast = response
            .json()
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse forecast: {}", e)))?;
        forecast.localize();

        info!(
            city = %forecast.city.name,
            entries = forecast.list.len(),
            from_cache = from_cache,
            "Forecast loaded"
        );
        Ok(ForecastResult {
            forecast,
            from_cache,
        })
    }
}
