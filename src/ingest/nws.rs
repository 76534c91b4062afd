/// National Weather Service (api.weather.gov) forecast client
///
/// Retrieves the hourly gridpoint forecast used by the ingestion stage.
/// The response is a GeoJSON Feature whose `properties.periods` array holds
/// one entry per forecast hour.
///
/// API Documentation: https://www.weather.gov/documentation/services-web-api
/// Hourly forecast: https://api.weather.gov/gridpoints/{office}/{x},{y}/forecast/hourly

use std::time::Duration;

use serde_json::Value;

use crate::model::{FetchError, ForecastDocument};

/// Hourly forecast for the OKX 36,36 grid cell (New York City).
pub const DEFAULT_FORECAST_URL: &str = "https://api.weather.gov/gridpoints/OKX/36,36/forecast/hourly";

/// api.weather.gov rejects requests without a User-Agent.
pub const DEFAULT_USER_AGENT: &str = concat!("weather_pipeline/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Forecast Source
// ============================================================================

/// Anything that can produce a forecast document on demand.
pub trait ForecastSource: Send + Sync {
    fn fetch(&self) -> Result<ForecastDocument, FetchError>;

    /// Where the forecast comes from, for log lines.
    fn describe(&self) -> String;
}

// ============================================================================
// API Client
// ============================================================================

pub struct NwsClient {
    client: reqwest::blocking::Client,
    url: String,
}

impl NwsClient {
    /// Build a client for `url`
    ///
    /// # Parameters
    /// - `url`: full hourly forecast endpoint
    /// - `user_agent`: identifies the caller to the API
    /// - `timeout`: per-request timeout
    pub fn new(url: impl Into<String>, user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Request(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl ForecastSource for NwsClient {
    fn fetch(&self) -> Result<ForecastDocument, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/geo+json")
            .send()
            .map_err(|e| FetchError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Http(response.status().as_u16()));
        }

        let body = response
            .text()
            .map_err(|e| FetchError::Request(e.to_string()))?;
        parse_forecast(&body)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Parse a forecast response body
pub fn parse_forecast(body: &str) -> Result<ForecastDocument, FetchError> {
    let value: Value = serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;
    Ok(ForecastDocument::new(value))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forecast_keeps_every_field() {
        let body = r#"{"type":"Feature","properties":{"units":"us","periods":[{"number":1,"temperature":41,"temperatureUnit":"F"}]}}"#;
        let doc = parse_forecast(body).unwrap();
        assert_eq!(doc.period_count(), 1);
        assert_eq!(String::from_utf8(doc.to_json_bytes().unwrap()).unwrap(), body);
    }

    #[test]
    fn test_parse_forecast_rejects_html_error_page() {
        let err = parse_forecast("<html>Service Unavailable</html>").unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[test]
    fn test_unreachable_endpoint_is_request_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let client = NwsClient::new("http://127.0.0.1:9/forecast", DEFAULT_USER_AGENT, Duration::from_secs(2)).unwrap();
        let err = client.fetch().unwrap_err();
        assert!(matches!(err, FetchError::Request(_)), "got {:?}", err);
    }

    #[test]
    fn test_default_user_agent_names_crate() {
        assert!(DEFAULT_USER_AGENT.starts_with("weather_pipeline/"));
    }
}
