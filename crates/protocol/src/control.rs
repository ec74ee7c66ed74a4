//! Steuerframes (Client -> Hub)
//!
//! ```json
//! { "action": "join", "room": "project:42" }
//! { "action": "typing", "room": "chat:7", "payload": { "draft": true } }
//! { "action": "ping" }
//! ```
//!
//! ## Design
//! - Unbekannte Aktionen oder kaputtes JSON sind Protokollfehler: der Frame
//!   wird verworfen, die Verbindung bleibt offen
//! - Der Raum-Name wird roh uebernommen und erst beim Verarbeiten validiert,
//!   damit der Client eine konkrete Fehlermeldung bekommt

use serde::{Deserialize, Serialize};

use crate::envelope::Payload;

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Standardisierte Fehler-Codes fuer `error`-Envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    InvalidRoom,
    MissingRoom,
    NotInRoom,
    Forbidden,
    TooManyRooms,
}

impl ErrorCode {
    /// Code im Wire-Format
    pub fn als_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::InvalidRoom => "INVALID_ROOM",
            ErrorCode::MissingRoom => "MISSING_ROOM",
            ErrorCode::NotInRoom => "NOT_IN_ROOM",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::TooManyRooms => "TOO_MANY_ROOMS",
        }
    }
}

// ---------------------------------------------------------------------------
// Aktionen
// ---------------------------------------------------------------------------

/// Vom Client erlaubte Aktionen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aktion {
    Join,
    Leave,
    Typing,
    Ping,
    Pong,
}

impl Aktion {
    pub fn als_str(&self) -> &'static str {
        match self {
            Aktion::Join => "join",
            Aktion::Leave => "leave",
            Aktion::Typing => "typing",
            Aktion::Ping => "ping",
            Aktion::Pong => "pong",
        }
    }

    /// Aktionen die einen Raum benoetigen
    pub fn braucht_raum(&self) -> bool {
        matches!(self, Aktion::Join | Aktion::Leave | Aktion::Typing)
    }
}

// ---------------------------------------------------------------------------
// Steuerframe
// ---------------------------------------------------------------------------

/// Eingehender Steuerframe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Steuerframe {
    pub action: Aktion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl Steuerframe {
    /// Parst einen Text-Frame
    pub fn parsen(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Baut einen Frame (Client-Seite, Tests)
    pub fn neu(action: Aktion, room: Option<&str>) -> Self {
        Self {
            action,
            room: room.map(str::to_string),
            payload: None,
        }
    }

    pub fn mit_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
