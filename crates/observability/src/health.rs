//! Health-Check-Endpunkt fuer Sprintwerk
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime, Heartbeat-Status und Anzahl
//! offener Verbindungen

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub heartbeat_active: bool,
    pub connections: usize,
}

/// Geteilter Zustand fuer den Health-Check-Handler
///
/// Der Server setzt `heartbeat_aktiv` solange der Hub-Heartbeat laeuft und
/// aktualisiert die Verbindungsanzahl periodisch.
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    pub heartbeat_aktiv: Arc<AtomicBool>,
    pub verbindungen: Arc<AtomicUsize>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::neu()
    }
}

impl HealthState {
    pub fn neu() -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            heartbeat_aktiv: Arc::new(AtomicBool::new(false)),
            verbindungen: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn heartbeat_laeuft(&self) -> bool {
        self.heartbeat_aktiv.load(Ordering::Relaxed)
    }

    pub fn heartbeat_setzen(&self, aktiv: bool) {
        self.heartbeat_aktiv.store(aktiv, Ordering::Relaxed);
    }

    pub fn verbindungen_setzen(&self, anzahl: usize) {
        self.verbindungen.store(anzahl, Ordering::Relaxed);
    }

    /// Ohne laufenden Heartbeat werden tote Verbindungen nicht mehr geerntet
    pub fn status(&self) -> HealthStatus {
        if self.heartbeat_laeuft() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }

    pub fn antwort(&self) -> HealthResponse {
        HealthResponse {
            status: self.status(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            heartbeat_active: self.heartbeat_laeuft(),
            connections: self.verbindungen.load(Ordering::Relaxed),
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let response = state.antwort();
    let http_status = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (http_status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[test]
    fn health_state_frisch_erstellt() {
        let state = HealthState::neu();
        assert!(state.uptime_seconds() < 5);
        assert!(!state.heartbeat_laeuft());
        assert_eq!(state.status(), HealthStatus::Unhealthy);
    }

    #[test]
    fn heartbeat_macht_healthy() {
        let state = HealthState::neu();
        state.heartbeat_setzen(true);
        state.verbindungen_setzen(12);

        let antwort = state.antwort();
        assert_eq!(antwort.status, HealthStatus::Healthy);
        assert!(antwort.heartbeat_active);
        assert_eq!(antwort.connections, 12);
    }

    #[test]
    fn health_response_serialisierung() {
        let response = HealthResponse {
            status: HealthStatus::Healthy,
            version: "0.1.0".to_string(),
            uptime_seconds: 3600,
            heartbeat_active: true,
            connections: 4,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"uptime_seconds\":3600"));
        assert!(json.contains("\"heartbeat_active\":true"));
        assert!(json.contains("\"connections\":4"));
    }

    #[tokio::test]
    async fn endpunkt_liefert_503_ohne_heartbeat() {
        let state = HealthState::neu();
        let app = health_router(state.clone());

        let antwort = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.heartbeat_setzen(true);
        let antwort = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::OK);
    }
}
