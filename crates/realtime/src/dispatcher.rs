//! Frame-Dispatcher – Routet eingehende Steuerframes an den Hub
//!
//! Der Read-Pump uebergibt jeden Text-Frame. Antworten (`ack`, `error`,
//! `pong`) gehen ueber die normale Queue der Verbindung raus, damit der
//! Write-Pump der einzige Schreiber auf den Stream bleibt.
//!
//! ## Aktionen
//! - `join`   Raum pruefen (Name, Zugriff, Limit), beitreten, `ack`
//! - `leave`  Raum verlassen (nicht den persoenlichen), `ack`
//! - `typing` An den Raum weiterreichen, ohne die Tabs des Absenders
//! - `ping`   Mit `pong` antworten
//! - `pong`   Nur Lebenszeichen

use std::sync::Arc;

use serde_json::Value;
use sprintwerk_core::Raum;
use sprintwerk_protocol::{Aktion, Envelope, ErrorCode, NachrichtenTyp, Payload, Steuerframe};

use crate::error::RealtimeError;
use crate::hub::{Hub, VerbindungsHandle};
use crate::zugriff::RaumZugriff;

/// Verarbeitet Steuerframes einer Verbindung
pub struct FrameDispatcher {
    hub: Arc<Hub>,
    zugriff: Arc<dyn RaumZugriff>,
}

impl FrameDispatcher {
    pub fn neu(hub: Arc<Hub>, zugriff: Arc<dyn RaumZugriff>) -> Self {
        Self { hub, zugriff }
    }

    /// Verarbeitet einen Text-Frame. Fehler beenden nie die Verbindung.
    pub async fn verarbeiten(&self, handle: &VerbindungsHandle, text: &str) {
        let frame = match Steuerframe::parsen(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(
                    conn_id = %handle.id(),
                    user_id = %handle.user_id(),
                    fehler = %e,
                    "Ungueltiger Steuerframe verworfen"
                );
                self.antworten(
                    handle,
                    Envelope::fehler(ErrorCode::InvalidRequest, "Ungueltiger Steuerframe"),
                );
                return;
            }
        };

        tracing::trace!(
            conn_id = %handle.id(),
            aktion = frame.action.als_str(),
            raum = frame.room.as_deref().unwrap_or("-"),
            "Steuerframe empfangen"
        );

        if !frame.action.braucht_raum() {
            if frame.action == Aktion::Ping {
                self.antworten(handle, Envelope::leer(NachrichtenTyp::Pong));
            }
            return;
        }

        let Some(raum) = self.raum_pruefen(handle, frame.room.as_deref()) else {
            return;
        };
        match frame.action {
            Aktion::Join => self.beitreten(handle, raum).await,
            Aktion::Leave => self.verlassen(handle, raum),
            Aktion::Typing => self.tippen(handle, raum, frame.payload),
            Aktion::Ping | Aktion::Pong => {}
        }
    }

    async fn beitreten(&self, handle: &VerbindungsHandle, raum: Raum) {
        if !self.zugriff.darf_beitreten(handle.user_id(), &raum).await {
            tracing::debug!(conn_id = %handle.id(), raum = %raum, "Beitritt verweigert");
            self.antworten(
                handle,
                Envelope::fehler(ErrorCode::Forbidden, format!("Kein Zugriff auf {raum}")),
            );
            return;
        }

        match self.hub.raum_beitreten(&handle.id(), raum.clone()) {
            Ok(_) => self.bestaetigen(handle, Aktion::Join, &raum),
            Err(RealtimeError::ZuVieleRaeume { max }) => self.antworten(
                handle,
                Envelope::fehler(
                    ErrorCode::TooManyRooms,
                    format!("Maximal {max} Raeume pro Verbindung"),
                ),
            ),
            Err(RealtimeError::UnbekannteVerbindung(_)) => {
                tracing::debug!(conn_id = %handle.id(), "Beitritt nach Abmeldung ignoriert");
            }
            Err(e) => {
                tracing::warn!(conn_id = %handle.id(), fehler = %e, "Beitritt fehlgeschlagen");
            }
        }
    }

    fn verlassen(&self, handle: &VerbindungsHandle, raum: Raum) {
        if raum.ist_persoenlich_fuer(handle.user_id()) {
            self.antworten(
                handle,
                Envelope::fehler(
                    ErrorCode::Forbidden,
                    "Persoenlicher Raum kann nicht verlassen werden",
                ),
            );
            return;
        }

        // Verlassen ist idempotent, daher immer bestaetigen
        self.hub.raum_verlassen(&handle.id(), &raum);
        self.bestaetigen(handle, Aktion::Leave, &raum);
    }

    fn tippen(&self, handle: &VerbindungsHandle, raum: Raum, payload: Option<Payload>) {
        if !self.hub.ist_mitglied(&handle.id(), &raum) {
            self.antworten(
                handle,
                Envelope::fehler(ErrorCode::NotInRoom, format!("Nicht Mitglied von {raum}")),
            );
            return;
        }

        let mut payload = payload.unwrap_or_default();
        payload.insert(
            "user_id".into(),
            Value::String(handle.user_id().as_str().to_string()),
        );
        payload.insert("room".into(), Value::String(raum.as_str().to_string()));

        self.hub
            .an_raum_senden(&raum, NachrichtenTyp::Typing, payload, Some(handle.user_id()));
    }

    /// Validiert den Raum-Namen, antwortet bei Fehler selbst
    fn raum_pruefen(&self, handle: &VerbindungsHandle, raum_name: Option<&str>) -> Option<Raum> {
        let Some(name) = raum_name else {
            self.antworten(
                handle,
                Envelope::fehler(ErrorCode::MissingRoom, "Feld 'room' fehlt"),
            );
            return None;
        };

        match Raum::parsen(name) {
            Ok(raum) => Some(raum),
            Err(e) => {
                tracing::debug!(
                    conn_id = %handle.id(),
                    raum = name,
                    fehler = %e,
                    "Ungueltiger Raum"
                );
                self.antworten(handle, Envelope::fehler(ErrorCode::InvalidRoom, e.to_string()));
                None
            }
        }
    }

    fn bestaetigen(&self, handle: &VerbindungsHandle, aktion: Aktion, raum: &Raum) {
        let mut payload = Payload::new();
        payload.insert("action".into(), Value::String(aktion.als_str().into()));
        payload.insert("room".into(), Value::String(raum.as_str().to_string()));
        self.antworten(handle, Envelope::neu(NachrichtenTyp::Ack, payload));
    }

    fn antworten(&self, handle: &VerbindungsHandle, envelope: Envelope) {
        if !self.hub.an_verbindung_senden(&handle.id(), &envelope) {
            tracing::debug!(
                conn_id = %handle.id(),
                typ = %envelope.typ,
                "Antwort nicht zustellbar"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RealtimeConfig;
    use crate::hub::Registrierung;
    use crate::zugriff::StandardZugriff;
    use sprintwerk_core::UserId;

    fn aufbau() -> (Arc<Hub>, FrameDispatcher) {
        let hub = Hub::neu(RealtimeConfig::default());
        let dispatcher = FrameDispatcher::neu(Arc::clone(&hub), Arc::new(StandardZugriff));
        (hub, dispatcher)
    }

    fn naechstes(reg: &mut Registrierung) -> Envelope {
        let json = reg.empfaenger.try_recv().expect("Antwort erwartet");
        Envelope::from_json(&json).unwrap()
    }

    #[tokio::test]
    async fn join_wird_bestaetigt() {
        let (hub, dispatcher) = aufbau();
        let mut reg = hub.registrieren(UserId::from("u1"));

        dispatcher
            .verarbeiten(&reg.handle, r#"{"action":"join","room":"project:42"}"#)
            .await;

        let ack = naechstes(&mut reg);
        assert_eq!(ack.typ, NachrichtenTyp::Ack);
        assert_eq!(ack.payload["action"], "join");
        assert_eq!(ack.payload["room"], "project:42");
        assert!(hub.ist_mitglied(&reg.handle.id(), &Raum::projekt(42)));
    }

    #[tokio::test]
    async fn kaputter_frame_gibt_fehler_und_verbindung_bleibt() {
        let (hub, dispatcher) = aufbau();
        let mut reg = hub.registrieren(UserId::from("u1"));

        dispatcher.verarbeiten(&reg.handle, "{{{kein json").await;

        let fehler = naechstes(&mut reg);
        assert_eq!(fehler.typ, NachrichtenTyp::Error);
        assert_eq!(fehler.payload["code"], "INVALID_REQUEST");
        assert_eq!(hub.verbindungs_anzahl(), 1);
    }

    #[tokio::test]
    async fn join_ohne_raum_und_mit_ungueltigem_raum() {
        let (hub, dispatcher) = aufbau();
        let mut reg = hub.registrieren(UserId::from("u1"));

        dispatcher.verarbeiten(&reg.handle, r#"{"action":"join"}"#).await;
        assert_eq!(naechstes(&mut reg).payload["code"], "MISSING_ROOM");

        dispatcher
            .verarbeiten(&reg.handle, r#"{"action":"join","room":"galaxy:1"}"#)
            .await;
        assert_eq!(naechstes(&mut reg).payload["code"], "INVALID_ROOM");
    }

    #[tokio::test]
    async fn fremder_persoenlicher_raum_verboten() {
        let (hub, dispatcher) = aufbau();
        let mut reg = hub.registrieren(UserId::from("u1"));

        dispatcher
            .verarbeiten(&reg.handle, r#"{"action":"join","room":"user:u2"}"#)
            .await;

        assert_eq!(naechstes(&mut reg).payload["code"], "FORBIDDEN");
        assert!(!hub.ist_mitglied(&reg.handle.id(), &Raum::user(&UserId::from("u2"))));
    }

    #[tokio::test]
    async fn eigener_persoenlicher_raum_bleibt() {
        let (hub, dispatcher) = aufbau();
        let mut reg = hub.registrieren(UserId::from("u1"));

        dispatcher
            .verarbeiten(&reg.handle, r#"{"action":"leave","room":"user:u1"}"#)
            .await;

        assert_eq!(naechstes(&mut reg).payload["code"], "FORBIDDEN");
        assert!(hub.ist_mitglied(&reg.handle.id(), &Raum::user(&UserId::from("u1"))));
    }

    #[tokio::test]
    async fn typing_erreicht_andere_aber_nicht_absender() {
        let (hub, dispatcher) = aufbau();
        let mut a = hub.registrieren(UserId::from("u1"));
        let mut a2 = hub.registrieren(UserId::from("u1"));
        let mut b = hub.registrieren(UserId::from("u2"));
        let raum = Raum::chat(9);
        for reg in [&a, &a2, &b] {
            hub.raum_beitreten(&reg.handle.id(), raum.clone()).unwrap();
        }
        while a.empfaenger.try_recv().is_ok() {}
        while a2.empfaenger.try_recv().is_ok() {}

        dispatcher
            .verarbeiten(
                &a.handle,
                r#"{"action":"typing","room":"chat:9","payload":{"draft":true}}"#,
            )
            .await;

        let tippen = naechstes(&mut b);
        assert_eq!(tippen.typ, NachrichtenTyp::Typing);
        assert_eq!(tippen.payload["user_id"], "u1");
        assert_eq!(tippen.payload["room"], "chat:9");
        assert_eq!(tippen.payload["draft"], true);
        assert!(a.empfaenger.try_recv().is_err());
        assert!(a2.empfaenger.try_recv().is_err());
    }

    #[tokio::test]
    async fn typing_ausserhalb_des_raums() {
        let (hub, dispatcher) = aufbau();
        let mut reg = hub.registrieren(UserId::from("u1"));

        dispatcher
            .verarbeiten(&reg.handle, r#"{"action":"typing","room":"project:1"}"#)
            .await;

        assert_eq!(naechstes(&mut reg).payload["code"], "NOT_IN_ROOM");
    }

    #[tokio::test]
    async fn ping_wird_mit_pong_beantwortet() {
        let (hub, dispatcher) = aufbau();
        let mut reg = hub.registrieren(UserId::from("u1"));

        dispatcher.verarbeiten(&reg.handle, r#"{"action":"ping"}"#).await;
        assert_eq!(naechstes(&mut reg).typ, NachrichtenTyp::Pong);

        dispatcher.verarbeiten(&reg.handle, r#"{"action":"pong"}"#).await;
        assert!(reg.empfaenger.try_recv().is_err());

        // Raum wird bei ping nicht geprueft
        dispatcher
            .verarbeiten(&reg.handle, r#"{"action":"ping","room":"kaputt"}"#)
            .await;
        assert_eq!(naechstes(&mut reg).typ, NachrichtenTyp::Pong);
    }
}
