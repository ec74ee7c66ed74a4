//! Prometheus-kompatible Metriken fuer Sprintwerk
//!
//! Registrierte Metriken:
//! - `sprintwerk_connected_clients` – Gauge: Offene WebSocket-Verbindungen
//! - `sprintwerk_online_users` – Gauge: User mit mindestens einer Verbindung
//! - `sprintwerk_rooms_active` – Gauge: Raeume mit mindestens einem Mitglied
//! - `sprintwerk_envelopes_queued_total` – Counter: Eingereihte Envelopes
//! - `sprintwerk_messages_dropped_total` – Counter: Wegen voller Queue verworfen
//! - `sprintwerk_backpressure_disconnects_total` – Counter: Wegen Rueckstau getrennt
//! - `sprintwerk_serialization_errors_total` – Counter: Nicht serialisierbare Payloads
//! - `sprintwerk_http_requests_total` – Counter: HTTP-Anfragen (method, path, status)
//! - `sprintwerk_http_request_duration_seconds` – Histogram: HTTP-Antwortzeit

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, Gauge, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Momentaufnahme des Realtime-Hubs fuer den Metriken-Abgleich
///
/// Die Zaehler sind kumulativ seit Prozessstart.
#[derive(Debug, Clone, Copy, Default)]
pub struct HubKennzahlen {
    pub verbindungen: usize,
    pub online_users: usize,
    pub raeume: usize,
    pub zugestellt: u64,
    pub verworfen: u64,
    pub rueckstau_trennungen: u64,
    pub serialisierungsfehler: u64,
}

/// Alle Sprintwerk-Prometheus-Metriken
#[derive(Clone)]
pub struct SprintwerkMetrics {
    pub registry: Arc<Registry>,

    // Realtime-Metriken
    pub connected_clients: Gauge,
    pub online_users: Gauge,
    pub rooms_active: Gauge,
    pub envelopes_queued_total: IntCounter,
    pub messages_dropped_total: IntCounter,
    pub backpressure_disconnects_total: IntCounter,
    pub serialization_errors_total: IntCounter,

    // HTTP-Metriken
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

fn gauge(registry: &Registry, name: &str, hilfe: &str) -> Result<Gauge> {
    let gauge = Gauge::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn counter(registry: &Registry, name: &str, hilfe: &str) -> Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl SprintwerkMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Realtime-Metriken ---
        let connected_clients = gauge(
            &registry,
            "sprintwerk_connected_clients",
            "Anzahl offener WebSocket-Verbindungen",
        )?;
        let online_users = gauge(
            &registry,
            "sprintwerk_online_users",
            "Anzahl User mit mindestens einer Verbindung",
        )?;
        let rooms_active = gauge(
            &registry,
            "sprintwerk_rooms_active",
            "Anzahl Raeume mit mindestens einem Mitglied",
        )?;
        let envelopes_queued_total = counter(
            &registry,
            "sprintwerk_envelopes_queued_total",
            "In Verbindungs-Queues eingereihte Envelopes",
        )?;
        let messages_dropped_total = counter(
            &registry,
            "sprintwerk_messages_dropped_total",
            "Wegen voller Queue verworfene Envelopes",
        )?;
        let backpressure_disconnects_total = counter(
            &registry,
            "sprintwerk_backpressure_disconnects_total",
            "Wegen Rueckstau getrennte Verbindungen",
        )?;
        let serialization_errors_total = counter(
            &registry,
            "sprintwerk_serialization_errors_total",
            "Nicht serialisierbare Payloads",
        )?;

        // --- HTTP-Metriken ---
        let http_requests_total = IntCounterVec::new(
            Opts::new("sprintwerk_http_requests_total", "Gesamtanzahl HTTP-Anfragen"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "sprintwerk_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
            ]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connected_clients,
            online_users,
            rooms_active,
            envelopes_queued_total,
            messages_dropped_total,
            backpressure_disconnects_total,
            serialization_errors_total,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Gleicht Gauges und Counter mit einer Hub-Momentaufnahme ab
    ///
    /// Counter werden nur um die Differenz erhoeht, wiederholte Aufrufe mit
    /// demselben Stand aendern nichts.
    pub fn hub_uebernehmen(&self, kennzahlen: &HubKennzahlen) {
        self.connected_clients.set(kennzahlen.verbindungen as f64);
        self.online_users.set(kennzahlen.online_users as f64);
        self.rooms_active.set(kennzahlen.raeume as f64);

        nachziehen(&self.envelopes_queued_total, kennzahlen.zugestellt);
        nachziehen(&self.messages_dropped_total, kennzahlen.verworfen);
        nachziehen(&self.backpressure_disconnects_total, kennzahlen.rueckstau_trennungen);
        nachziehen(&self.serialization_errors_total, kennzahlen.serialisierungsfehler);
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn nachziehen(counter: &IntCounter, stand: u64) {
    let delta = stand.saturating_sub(counter.get());
    if delta > 0 {
        counter.inc_by(delta);
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: SprintwerkMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<SprintwerkMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
