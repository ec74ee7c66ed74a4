//! Fehlertypen fuer den Realtime-Kern

use sprintwerk_core::VerbindungsId;
use thiserror::Error;

/// Fehlertyp fuer Hub, Verbindungen und Broadcaster
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Payload konnte nicht serialisiert werden
    #[error("Serialisierungsfehler: {0}")]
    Serialisierung(#[from] serde_json::Error),

    /// Verbindung ist (nicht mehr) im Hub registriert
    #[error("Unbekannte Verbindung: {0}")]
    UnbekannteVerbindung(VerbindungsId),

    /// Raum-Limit pro Verbindung erreicht
    #[error("Zu viele Raeume: maximal {max} pro Verbindung")]
    ZuVieleRaeume { max: usize },

    /// Schreiben auf den Stream fehlgeschlagen
    #[error("Schreibfehler: {0}")]
    Schreiben(String),

    /// Schreib-Deadline ueberschritten
    #[error("Schreib-Deadline ueberschritten")]
    SchreibZeitlimit,
}

/// Result-Typ fuer den Realtime-Kern
pub type RealtimeResult<T> = Result<T, RealtimeError>;
