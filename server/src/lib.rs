//! sprintwerk-server – Bibliotheks-Root
//!
//! Verdrahtet Hub, Broadcaster, WebSocket-Endpunkt und Observability zu
//! einem lauffaehigen Dienst. Business-Services im selben Prozess holen
//! sich den `EventBroadcaster` ueber [`Server::broadcaster`].

pub mod config;
pub mod identitaet;
pub mod ws;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{routing::get, Router};
use sprintwerk_observability::{
    observability_server_starten, request_timing_layer, timing_middleware, HealthState,
    HubKennzahlen, SprintwerkMetrics,
};
use sprintwerk_realtime::{EventBroadcaster, Hub, RaumZugriff, StandardZugriff};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::task::TaskTracker;

use config::ServerConfig;
use identitaet::{HeaderIdentitaet, IdentitaetsAufloeser};
use ws::{ws_handler, AppState, VerbindungsPlaetze};

/// Abstand zwischen zwei Uebernahmen der Hub-Kennzahlen in die Metriken
const KENNZAHLEN_INTERVALL: Duration = Duration::from_secs(5);

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    config: ServerConfig,
    hub: Arc<Hub>,
    broadcaster: EventBroadcaster,
    metriken: SprintwerkMetrics,
    health: HealthState,
    identitaet: Arc<dyn IdentitaetsAufloeser>,
    zugriff: Arc<dyn RaumZugriff>,
    plaetze: VerbindungsPlaetze,
    verbindungen: TaskTracker,
}

impl Server {
    /// Baut alle Komponenten aus der Konfiguration, startet aber noch nichts
    pub fn neu(config: ServerConfig) -> Result<Self> {
        let hub = Hub::neu(config.realtime_config());
        let broadcaster = EventBroadcaster::neu(Arc::clone(&hub));
        let identitaet = HeaderIdentitaet::neu(&config.auth.identitaets_header)?;

        Ok(Self {
            hub,
            broadcaster,
            metriken: SprintwerkMetrics::neu()?,
            health: HealthState::neu(),
            identitaet: Arc::new(identitaet),
            zugriff: Arc::new(StandardZugriff),
            plaetze: VerbindungsPlaetze::neu(config.server.max_verbindungen),
            verbindungen: TaskTracker::new(),
            config,
        })
    }

    /// Ersetzt die Raum-Zugriffsregel (z.B. durch eine Mitgliedschaftspruefung)
    pub fn mit_zugriff(mut self, zugriff: Arc<dyn RaumZugriff>) -> Self {
        self.zugriff = zugriff;
        self
    }

    /// Ersetzt die Identitaets-Aufloesung
    pub fn mit_identitaet(mut self, identitaet: Arc<dyn IdentitaetsAufloeser>) -> Self {
        self.identitaet = identitaet;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Einstiegspunkt fuer Domain-Events aus den Business-Services
    pub fn broadcaster(&self) -> EventBroadcaster {
        self.broadcaster.clone()
    }

    pub fn metriken(&self) -> &SprintwerkMetrics {
        &self.metriken
    }

    /// HTTP-Router mit dem WebSocket-Endpunkt
    pub fn app(&self) -> Router {
        let state = AppState {
            hub: Arc::clone(&self.hub),
            identitaet: Arc::clone(&self.identitaet),
            zugriff: Arc::clone(&self.zugriff),
            plaetze: self.plaetze.clone(),
            verbindungen: self.verbindungen.clone(),
        };

        Router::new()
            .route(&self.config.netzwerk.ws_pfad, get(ws_handler))
            .with_state(state)
            .layer(axum::middleware::from_fn_with_state(
                self.metriken.clone(),
                timing_middleware,
            ))
            .layer(request_timing_layer())
    }

    /// Startet alle Subsysteme und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_adresse()).await?;
        self.starten_mit(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(fehler = %e, "Shutdown-Signal nicht verfuegbar");
            }
        })
        .await
    }

    /// Laeuft auf `listener` bis `signal` endet
    ///
    /// Reihenfolge:
    /// 1. Heartbeat und Kennzahlen-Abgleich starten
    /// 2. Observability-Server starten (falls aktiviert)
    /// 3. HTTP/WebSocket-Anfragen bedienen
    /// 4. Nach dem Signal alle Verbindungen trennen und warten, bis jede
    ///    ihren Close-Frame geschrieben hat
    pub async fn starten_mit<F>(self, listener: tokio::net::TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let heartbeat = self.hub.heartbeat_starten(shutdown_rx.clone());
        self.health.heartbeat_setzen(true);

        let abgleich = kennzahlen_abgleich_starten(
            Arc::clone(&self.hub),
            self.metriken.clone(),
            self.health.clone(),
            shutdown_rx.clone(),
        );

        let observability = if self.config.observability.aktiviert {
            let addr: SocketAddr = self.config.observability_bind_adresse().parse()?;
            Some(tokio::spawn(observability_server_starten(
                addr,
                self.metriken.clone(),
                self.health.clone(),
                shutdown_rx.clone(),
            )))
        } else {
            None
        };

        tracing::info!(
            server_name = %self.config.server.name,
            adresse = %listener.local_addr()?,
            pfad = %self.config.netzwerk.ws_pfad,
            max_verbindungen = self.config.server.max_verbindungen,
            "Server gestartet"
        );

        let hub = Arc::clone(&self.hub);
        axum::serve(listener, self.app())
            .with_graceful_shutdown(async move {
                signal.await;
                tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
                let _ = shutdown_tx.send(true);
                let getrennt = hub.alle_trennen();
                tracing::info!(verbindungen = getrennt, "Alle Verbindungen getrennt");
            })
            .await?;

        // Upgrades laufen ausserhalb von axum::serve weiter
        self.verbindungen.close();
        let frist = self.hub.config().schreib_deadline() + Duration::from_secs(1);
        if tokio::time::timeout(frist, self.verbindungen.wait()).await.is_err() {
            tracing::warn!(
                offen = self.verbindungen.len(),
                "Verbindungen nicht innerhalb der Frist beendet"
            );
        }

        if let Err(e) = heartbeat.await {
            tracing::warn!(fehler = %e, "Heartbeat-Task abgebrochen");
        }
        self.health.heartbeat_setzen(false);
        if let Err(e) = abgleich.await {
            tracing::warn!(fehler = %e, "Kennzahlen-Abgleich abgebrochen");
        }

        if let Some(task) = observability {
            match task.await {
                Ok(Err(e)) => {
                    tracing::warn!(fehler = %e, "Observability-Server beendet mit Fehler")
                }
                Err(e) => tracing::warn!(fehler = %e, "Observability-Task abgebrochen"),
                Ok(Ok(())) => {}
            }
        }

        tracing::info!("Server beendet");
        Ok(())
    }
}

/// Uebertraegt periodisch die Hub-Zaehler in Prometheus und Health-State
pub fn kennzahlen_abgleich_starten(
    hub: Arc<Hub>,
    metriken: SprintwerkMetrics,
    health: HealthState,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut takt = tokio::time::interval(KENNZAHLEN_INTERVALL);
        takt.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = takt.tick() => kennzahlen_uebernehmen(&hub, &metriken, &health),
                ergebnis = shutdown.changed() => {
                    if ergebnis.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        kennzahlen_uebernehmen(&hub, &metriken, &health);
    })
}

fn kennzahlen_uebernehmen(hub: &Hub, metriken: &SprintwerkMetrics, health: &HealthState) {
    let statistik = hub.statistik();
    let verbindungen = hub.verbindungs_anzahl();

    metriken.hub_uebernehmen(&HubKennzahlen {
        verbindungen,
        online_users: hub.online_users().len(),
        raeume: hub.raum_anzahl(),
        zugestellt: statistik.zugestellt,
        verworfen: statistik.verworfen,
        rueckstau_trennungen: statistik.rueckstau_trennungen,
        serialisierungsfehler: statistik.serialisierungsfehler,
    });
    health.verbindungen_setzen(verbindungen);
}
