//! Presence-Events – Online/Offline-Uebergaenge eines Users
//!
//! Ein User ist online solange er mindestens eine offene Verbindung hat.
//! Der Hub erzeugt genau ein `UserOnline` beim Uebergang 0 -> 1 Verbindungen
//! und genau ein `UserOffline` beim Uebergang 1 -> 0. Die Events gehen
//! an zwei Stellen raus: als Envelope an alle anderen Verbindungen und als
//! `PresenceEvent` an In-Process-Abonnenten (`Hub::events_abonnieren`).

use serde_json::Value;
use sprintwerk_core::UserId;
use sprintwerk_protocol::{NachrichtenTyp, Payload};

/// Presence-Uebergang eines Users
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    /// Erste Verbindung des Users wurde registriert
    UserOnline { user_id: UserId },
    /// Letzte Verbindung des Users wurde abgemeldet
    UserOffline { user_id: UserId },
}

impl PresenceEvent {
    pub fn user_id(&self) -> &UserId {
        match self {
            PresenceEvent::UserOnline { user_id } | PresenceEvent::UserOffline { user_id } => {
                user_id
            }
        }
    }

    /// Passender Envelope-Typ
    pub fn nachrichten_typ(&self) -> NachrichtenTyp {
        match self {
            PresenceEvent::UserOnline { .. } => NachrichtenTyp::UserOnline,
            PresenceEvent::UserOffline { .. } => NachrichtenTyp::UserOffline,
        }
    }

    /// Payload `{ "user_id": "<id>" }`
    pub fn payload(&self) -> Payload {
        let mut payload = Payload::new();
        payload.insert(
            "user_id".into(),
            Value::String(self.user_id().as_str().to_string()),
        );
        payload
    }
}
