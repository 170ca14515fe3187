//! HTTP snapshot API

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use panda_core::{DeviceRecord, Registry};
use panda_sensors::Location;

pub struct AppState {
    pub registry: Registry,
    pub location: Location,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    location: Location,
    devices: Vec<DeviceRecord>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    devices: usize,
}

/// Current registry contents, most threatening first
pub async fn scan(State(state): State<Arc<AppState>>) -> Json<ScanResponse> {
    let snapshot = state.registry.snapshot().sorted_by_threat();
    Json(ScanResponse {
        status: "active",
        timestamp: snapshot.timestamp,
        location: state.location.clone(),
        devices: snapshot.devices,
    })
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        devices: state.registry.len(),
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/scan", get(scan))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use panda_core::{Observation, ObservationKind};

    fn state() -> Arc<AppState> {
        let registry = Registry::new();
        registry.merge(
            &[
                Observation::builder(ObservationKind::Wifi, "11:11")
                    .signal_strength(-80)
                    .frequency_mhz(5180)
                    .security("[WPA2-PSK-CCMP][ESS]")
                    .label("Far")
                    .build(),
                Observation::builder(ObservationKind::Wifi, "22:22")
                    .signal_strength(-40)
                    .frequency_mhz(2412)
                    .security("[ESS]")
                    .build(),
            ],
            Utc::now(),
        );
        Arc::new(AppState {
            registry,
            location: Location::offline(),
        })
    }

    #[tokio::test]
    async fn test_scan_response() {
        let Json(response) = scan(State(state())).await;
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["status"], "active");
        assert_eq!(json["location"]["provider"], "offline");

        let devices = json["devices"].as_array().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0]["hardware_id"], "22:22");
        assert_eq!(devices[0]["type"], "WIFI");
        assert_eq!(devices[0]["label"], "Hidden");
        assert_eq!(devices[0]["risk_score"], 65);
        assert_eq!(devices[1]["hardware_id"], "11:11");
    }

    #[tokio::test]
    async fn test_health() {
        let Json(response) = health(State(state())).await;
        assert_eq!(response.status, "healthy");
        assert_eq!(response.devices, 2);
    }

    #[test]
    fn test_router_builds() {
        let _router = router(state());
    }
}
