//! WebSocket-Endpunkt
//!
//! Loest die Identitaet auf, reserviert einen Verbindungsplatz und uebergibt
//! den Socket nach dem Upgrade an eine `ClientConnection`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::StreamExt;
use sprintwerk_core::SprintwerkError;
use sprintwerk_realtime::{ClientConnection, Hub, RaumZugriff};
use tokio_util::task::TaskTracker;

use crate::identitaet::IdentitaetsAufloeser;

/// Gemeinsamer Zustand der HTTP-Handler
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub identitaet: Arc<dyn IdentitaetsAufloeser>,
    pub zugriff: Arc<dyn RaumZugriff>,
    pub plaetze: VerbindungsPlaetze,
    /// Laufende Verbindungs-Tasks, damit der Shutdown auf sie warten kann
    pub verbindungen: TaskTracker,
}

// ---------------------------------------------------------------------------
// Verbindungsplaetze
// ---------------------------------------------------------------------------

/// Harte Obergrenze fuer gleichzeitige Verbindungen
///
/// Der Platz wird vor dem Upgrade reserviert und erst freigegeben, wenn die
/// Verbindung vollstaendig beendet ist. Parallele Upgrades koennen das Limit
/// damit nicht ueberschreiten.
#[derive(Debug, Clone)]
pub struct VerbindungsPlaetze {
    belegt: Arc<AtomicUsize>,
    max: usize,
}

impl VerbindungsPlaetze {
    pub fn neu(max: usize) -> Self {
        Self {
            belegt: Arc::new(AtomicUsize::new(0)),
            max,
        }
    }

    /// Reserviert einen Platz, `None` wenn alle belegt sind
    pub fn reservieren(&self) -> Option<VerbindungsPlatz> {
        self.belegt
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max).then_some(n + 1)
            })
            .ok()
            .map(|_| VerbindungsPlatz {
                belegt: Arc::clone(&self.belegt),
            })
    }

    pub fn belegt(&self) -> usize {
        self.belegt.load(Ordering::Acquire)
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

/// Reservierter Platz, wird beim Drop freigegeben
#[derive(Debug)]
pub struct VerbindungsPlatz {
    belegt: Arc<AtomicUsize>,
}

impl Drop for VerbindungsPlatz {
    fn drop(&mut self) {
        self.belegt.fetch_sub(1, Ordering::AcqRel);
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// `GET /ws` – WebSocket-Upgrade fuer eine authentifizierte Sitzung
pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let user_id = match state.identitaet.aufloesen(&headers).await {
        Ok(uid) => uid,
        Err(e) => {
            tracing::debug!(fehler = %e, "Upgrade ohne Identitaet abgelehnt");
            return fehler_antwort(StatusCode::UNAUTHORIZED, &e);
        }
    };

    let Some(platz) = state.plaetze.reservieren() else {
        tracing::warn!(
            user_id = %user_id,
            max = state.plaetze.max(),
            "Verbindungslimit erreicht"
        );
        return fehler_antwort(StatusCode::SERVICE_UNAVAILABLE, &SprintwerkError::ServerVoll);
    };

    let max_frame = state.hub.config().max_frame_groesse;
    let verbindung = ClientConnection::neu(Arc::clone(&state.hub), Arc::clone(&state.zugriff));
    // Schlaegt das Upgrade fehl, wird die Closure samt Platz und Token verworfen
    let token = state.verbindungen.token();

    ws.max_message_size(max_frame)
        .max_frame_size(max_frame)
        .on_upgrade(move |socket| async move {
            let (ausgang, eingang) = socket.split();
            verbindung.verarbeiten(user_id, eingang, ausgang).await;
            drop(platz);
            drop(token);
        })
}

fn fehler_antwort(status: StatusCode, fehler: &SprintwerkError) -> Response {
    let body = serde_json::json!({
        "error": {
            "code": fehler.code(),
            "message": fehler.to_string(),
        }
    });
    (status, Json(body)).into_response()
}
