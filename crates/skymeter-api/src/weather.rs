//! Upstream weather provider client
//!
//! Thin collaborator around the forecast provider. The wire format is
//! treated as opaque: the gateway forwards the provider's `hourly` block to
//! callers without interpreting it. The base URL is configurable via
//! `SKYMETER_WEATHER_URL` for testing and provider changes.

use serde_json::Value;

/// Default upstream forecast endpoint
pub const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Errors from the upstream weather fetch
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream response missing '{0}' block")]
    MalformedResponse(&'static str),
}

/// Client for the upstream forecast provider
#[derive(Debug, Clone)]
pub struct WeatherClient {
    http: reqwest::Client,
    base_url: String,
}

fn hourly_block(body: Value) -> Result<Value, WeatherError> {
    match body {
        Value::Object(mut map) => map
            .remove("hourly")
            .ok_or(WeatherError::MalformedResponse("hourly")),
        _ => Err(WeatherError::MalformedResponse("hourly")),
    }
}

impl WeatherClient {
    /// Create a client against `SKYMETER_WEATHER_URL`, falling back to the
    /// default provider endpoint.
    pub fn from_env() -> Self {
        let base_url = std::env::var("SKYMETER_WEATHER_URL")
            .unwrap_or_else(|_| DEFAULT_FORECAST_URL.to_string());
        Self::with_base_url(base_url)
    }

    /// Create a client against an explicit endpoint
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the hourly forecast for a coordinate pair.
    ///
    /// Returns the provider's `hourly` block verbatim.
    pub async fn fetch_forecast(&self, lat: f64, lon: f64) -> Result<Value, WeatherError> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[("latitude", lat), ("longitude", lon)])
            .query(&[("hourly", "temperature_2m")])
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        hourly_block(body)
    }
}
