//! Client-Verbindung – Read- und Write-Pump fuer einen WebSocket
//!
//! Jede Verbindung hat genau zwei Tasks:
//! - **Read-Pump** (laeuft im aufrufenden Task): liest Frames, verlaengert
//!   die Lese-Deadline bei jedem Frame und reicht Text-Frames an den
//!   `FrameDispatcher` weiter
//! - **Write-Pump** (eigener Task): einziger Schreiber auf den Stream. Leert
//!   die Queue, fasst bereits wartende Envelopes zu einem Frame zusammen und
//!   sendet periodisch Protokoll-Pings
//!
//! Endet der Read-Pump (Close, Fehler, Deadline, Trennsignal vom Hub), wird
//! die Verbindung abgemeldet. Der Hub schliesst damit die Queue, der
//! Write-Pump schreibt noch Wartendes, sendet einen Close-Frame und endet.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use sprintwerk_core::{UserId, VerbindungsId};
use sprintwerk_protocol::wire::Stapel;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, timeout_at, Instant, MissedTickBehavior};

use crate::dispatcher::FrameDispatcher;
use crate::error::{RealtimeError, RealtimeResult};
use crate::hub::{Hub, VerbindungsHandle};
use crate::zugriff::RaumZugriff;

/// Warum der Read-Pump endet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trenngrund {
    /// Client hat geschlossen oder Stream ist zu Ende
    Geschlossen,
    /// Lese-Deadline ohne eingehenden Frame abgelaufen
    Zeitlimit,
    /// Lesefehler auf dem Stream
    Lesefehler,
    /// Text-Frame groesser als erlaubt
    FrameZuGross,
    /// Hub hat die Verbindung abgemeldet
    VomHub,
}

impl Trenngrund {
    fn als_str(&self) -> &'static str {
        match self {
            Trenngrund::Geschlossen => "geschlossen",
            Trenngrund::Zeitlimit => "zeitlimit",
            Trenngrund::Lesefehler => "lesefehler",
            Trenngrund::FrameZuGross => "frame_zu_gross",
            Trenngrund::VomHub => "vom_hub",
        }
    }
}

/// Eine akzeptierte, authentifizierte Verbindung
pub struct ClientConnection {
    hub: Arc<Hub>,
    dispatcher: FrameDispatcher,
}

impl ClientConnection {
    pub fn neu(hub: Arc<Hub>, zugriff: Arc<dyn RaumZugriff>) -> Self {
        let dispatcher = FrameDispatcher::neu(Arc::clone(&hub), zugriff);
        Self { hub, dispatcher }
    }

    /// Registriert die Verbindung und laeuft bis sie getrennt ist
    ///
    /// `eingang` und `ausgang` sind die beiden Haelften des Sockets
    /// (z.B. `WebSocket::split()`).
    pub async fn verarbeiten<St, Si, E>(
        self,
        user_id: UserId,
        mut eingang: St,
        ausgang: Si,
    ) -> VerbindungsId
    where
        St: Stream<Item = Result<Message, E>> + Unpin + Send,
        E: Display + Send,
        Si: Sink<Message> + Unpin + Send + 'static,
        Si::Error: Display + Send,
    {
        let registrierung = self.hub.registrieren(user_id);
        let handle = registrierung.handle;
        let id = handle.id();
        let mut trennsignal = registrierung.trennsignal;

        let schreiber = tokio::spawn(schreib_pumpe(
            Arc::clone(&self.hub),
            Arc::clone(&handle),
            registrierung.empfaenger,
            ausgang,
        ));

        let grund = self.lese_pumpe(&handle, &mut eingang, &mut trennsignal).await;
        tracing::info!(
            conn_id = %id,
            user_id = %handle.user_id(),
            grund = grund.als_str(),
            "Verbindung beendet"
        );

        self.hub.abmelden(&id);
        if let Err(e) = schreiber.await {
            tracing::warn!(conn_id = %id, fehler = %e, "Write-Pump abgebrochen");
        }
        id
    }

    async fn lese_pumpe<St, E>(
        &self,
        handle: &VerbindungsHandle,
        eingang: &mut St,
        trennsignal: &mut watch::Receiver<bool>,
    ) -> Trenngrund
    where
        St: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let config = self.hub.config();
        let deadline = config.lese_deadline();
        let max_groesse = config.max_frame_groesse;

        if *trennsignal.borrow() {
            return Trenngrund::VomHub;
        }

        loop {
            let frist = handle.letzte_aktivitaet() + deadline;
            let frame = tokio::select! {
                _ = trennsignal.changed() => return Trenngrund::VomHub,
                frame = timeout_at(frist, eingang.next()) => frame,
            };

            let nachricht = match frame {
                Err(_) => {
                    tracing::warn!(conn_id = %handle.id(), "Lese-Deadline abgelaufen");
                    return Trenngrund::Zeitlimit;
                }
                Ok(None) => return Trenngrund::Geschlossen,
                Ok(Some(Err(e))) => {
                    tracing::warn!(conn_id = %handle.id(), fehler = %e, "Frame-Lesefehler");
                    return Trenngrund::Lesefehler;
                }
                Ok(Some(Ok(nachricht))) => nachricht,
            };

            handle.aktivitaet_melden();

            match nachricht {
                Message::Text(text) => {
                    if text.len() > max_groesse {
                        tracing::warn!(
                            conn_id = %handle.id(),
                            groesse = text.len(),
                            max = max_groesse,
                            "Frame zu gross"
                        );
                        return Trenngrund::FrameZuGross;
                    }
                    self.dispatcher.verarbeiten(handle, &text).await;
                }
                Message::Binary(daten) => {
                    tracing::warn!(
                        conn_id = %handle.id(),
                        bytes = daten.len(),
                        "Binaer-Frame ignoriert"
                    );
                }
                // Pings beantwortet der WebSocket-Layer selbst
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Close(_) => return Trenngrund::Geschlossen,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Write-Pump
// ---------------------------------------------------------------------------

enum Ausloeser {
    Nachricht(Option<Arc<str>>),
    Ping,
}

async fn schreib_pumpe<Si>(
    hub: Arc<Hub>,
    handle: Arc<VerbindungsHandle>,
    mut empfaenger: mpsc::Receiver<Arc<str>>,
    mut ausgang: Si,
) where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    let config = hub.config();
    let deadline = config.schreib_deadline();
    let ping_intervall = config.protokoll_ping();
    let mut ping = tokio::time::interval_at(Instant::now() + ping_intervall, ping_intervall);
    ping.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Envelope das nicht mehr in den letzten Stapel gepasst hat
    let mut uebertrag: Option<Arc<str>> = None;

    let ergebnis: RealtimeResult<()> = loop {
        let erste = match uebertrag.take() {
            Some(nachricht) => nachricht,
            None => {
                let ausloeser = tokio::select! {
                    nachricht = empfaenger.recv() => Ausloeser::Nachricht(nachricht),
                    _ = ping.tick() => Ausloeser::Ping,
                };
                match ausloeser {
                    Ausloeser::Nachricht(Some(nachricht)) => nachricht,
                    // Queue geschlossen: Hub hat abgemeldet
                    Ausloeser::Nachricht(None) => break Ok(()),
                    Ausloeser::Ping => {
                        let frame = Message::Ping(Vec::new());
                        if let Err(e) = schreiben(&mut ausgang, frame, deadline).await {
                            break Err(e);
                        }
                        continue;
                    }
                }
            }
        };

        let mut stapel = Stapel::neu(config.max_frame_groesse, config.max_stapel);
        stapel.hinzufuegen(&erste);
        while !stapel.ist_voll() {
            match empfaenger.try_recv() {
                Ok(nachricht) => {
                    if !stapel.hinzufuegen(&nachricht) {
                        uebertrag = Some(nachricht);
                        break;
                    }
                }
                Err(_) => break,
            }
        }

        let anzahl = stapel.anzahl();
        let frame = Message::Text(stapel.abschliessen());
        if let Err(e) = schreiben(&mut ausgang, frame, deadline).await {
            break Err(e);
        }
        tracing::trace!(conn_id = %handle.id(), envelopes = anzahl, "Frame geschrieben");
    };

    match ergebnis {
        Ok(()) => {
            let close = Message::Close(Some(CloseFrame {
                code: close_code::NORMAL,
                reason: "".into(),
            }));
            let _ = schreiben(&mut ausgang, close, deadline).await;
            let _ = timeout(deadline, ausgang.close()).await;
        }
        Err(e) => {
            tracing::warn!(
                conn_id = %handle.id(),
                fehler = %e,
                "Schreiben fehlgeschlagen – Verbindung wird getrennt"
            );
            hub.abmelden(&handle.id());
        }
    }
    tracing::debug!(conn_id = %handle.id(), "Write-Pump beendet");
}

/// Ein Schreibvorgang mit Deadline
async fn schreiben<Si>(
    ausgang: &mut Si,
    nachricht: Message,
    deadline: Duration,
) -> RealtimeResult<()>
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    match timeout(deadline, ausgang.send(nachricht)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(RealtimeError::Schreiben(e.to_string())),
        Err(_) => Err(RealtimeError::SchreibZeitlimit),
    }
}
