//! Observer geolocation
//!
//! Contextual metadata only: GPS via Termux when available, otherwise an IP
//! geolocation lookup. Every path is time-bounded and the lookup as a whole
//! never fails; the worst case is an "offline" location at 0,0.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::{run_command, CaptureError, Platform};

/// Where the observer is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    /// `gps`, `network`, `ip-geo`, `offline`, ...
    pub provider: String,
}

impl Location {
    pub fn offline() -> Self {
        Self {
            lat: 0.0,
            lon: 0.0,
            provider: "offline".to_string(),
        }
    }
}

/// Geolocation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    pub enabled: bool,
    /// Budget for each individual lookup
    pub timeout_ms: u64,
    /// IP geolocation endpoint returning `latitude` / `longitude`
    pub endpoint: String,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 2000,
            endpoint: "https://ipapi.co/json/".to_string(),
        }
    }
}

/// Errors from location lookups
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("Invalid response: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
struct CoordinatesResponse {
    latitude: Option<f64>,
    longitude: Option<f64>,
    provider: Option<String>,
}

fn coordinates(json: &str, default_provider: &str) -> Result<Location, GeoError> {
    let response: CoordinatesResponse =
        serde_json::from_str(json).map_err(|e| GeoError::Invalid(e.to_string()))?;

    match (response.latitude, response.longitude) {
        (Some(lat), Some(lon)) => Ok(Location {
            lat,
            lon,
            provider: response.provider.unwrap_or_else(|| default_provider.to_string()),
        }),
        _ => Err(GeoError::Invalid("missing latitude/longitude".to_string())),
    }
}

/// Parse `termux-location` output
pub fn parse_termux_location(json: &str) -> Result<Location, GeoError> {
    coordinates(json, "gps")
}

/// Parse an IP geolocation response; the provider is always `ip-geo`
pub fn parse_ip_location(json: &str) -> Result<Location, GeoError> {
    let mut location = coordinates(json, "ip-geo")?;
    location.provider = "ip-geo".to_string();
    Ok(location)
}

/// Create an HTTP client for geolocation requests
pub fn create_geo_client(config: &GeoConfig) -> Result<Client, GeoError> {
    Client::builder()
        .timeout(Duration::from_millis(config.timeout_ms))
        .user_agent(concat!("panda/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| GeoError::ClientBuild(e.to_string()))
}

async fn termux_location(config: &GeoConfig) -> Result<Location, GeoError> {
    let output = run_command("termux-location", &[], Duration::from_millis(config.timeout_ms)).await?;
    parse_termux_location(&output)
}

async fn ip_location(config: &GeoConfig) -> Result<Location, GeoError> {
    let client = create_geo_client(config)?;
    let body = client
        .get(&config.endpoint)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    parse_ip_location(&body)
}

/// Best-effort location of the observer
pub async fn locate(platform: Platform, config: &GeoConfig) -> Location {
    if !config.enabled {
        return Location::offline();
    }

    if platform == Platform::Termux {
        match termux_location(config).await {
            Ok(location) => return location,
            Err(e) => debug!("termux-location unavailable: {}", e),
        }
    }

    match ip_location(config).await {
        Ok(location) => location,
        Err(e) => {
            debug!("IP geolocation failed: {}", e);
            Location::offline()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_termux_location() {
        let json = r#"{"latitude": 52.52, "longitude": 13.405, "altitude": 34.0,
                       "accuracy": 12.0, "provider": "network"}"#;
        let location = parse_termux_location(json).unwrap();
        assert_eq!(location.lat, 52.52);
        assert_eq!(location.lon, 13.405);
        assert_eq!(location.provider, "network");
    }

    #[test]
    fn test_parse_ip_location() {
        let json = r#"{"ip": "203.0.113.7", "city": "Lisbon", "latitude": 38.72, "longitude": -9.14}"#;
        let location = parse_ip_location(json).unwrap();
        assert_eq!(location.provider, "ip-geo");
        assert_eq!(location.lon, -9.14);
    }

    #[test]
    fn test_missing_coordinates_is_invalid() {
        let json = r#"{"error": true, "reason": "RateLimited"}"#;
        assert!(matches!(parse_ip_location(json), Err(GeoError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_disabled_lookup_is_offline() {
        let config = GeoConfig {
            enabled: false,
            ..Default::default()
        };
        assert_eq!(locate(Platform::Generic, &config).await, Location::offline());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_offline() {
        let config = GeoConfig {
            timeout_ms: 300,
            endpoint: "http://127.0.0.1:9/json/".to_string(),
            ..Default::default()
        };
        assert_eq!(locate(Platform::Generic, &config).await, Location::offline());
    }
}
