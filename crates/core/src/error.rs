//! Fehlertypen fuer Sprintwerk
//!
//! Zentraler Fehler-Enum fuer die gemeinsamen Typen. Untermodule koennen
//! eigene Fehler definieren und via `#[from]` konvertieren.

use thiserror::Error;

/// Globaler Result-Alias fuer Sprintwerk
pub type Result<T> = std::result::Result<T, SprintwerkError>;

/// Fehler die in den gemeinsamen Typen auftreten koennen
#[derive(Debug, Error)]
pub enum SprintwerkError {
    // --- Identitaet ---
    #[error("Keine Identitaet: {0}")]
    KeineIdentitaet(String),

    // --- Protokoll ---
    #[error("Ungueltiger Raum: {0}")]
    UngueltigerRaum(String),

    // --- Ressourcen ---
    #[error("Server voll: maximale Verbindungsanzahl erreicht")]
    ServerVoll,

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

impl SprintwerkError {
    /// Kurzer Fehlercode fuer HTTP-Fehlerantworten beim Upgrade
    pub fn code(&self) -> &'static str {
        match self {
            Self::KeineIdentitaet(_) => "UNAUTHENTICATED",
            Self::UngueltigerRaum(_) => "INVALID_ROOM",
            Self::ServerVoll => "SERVER_FULL",
            Self::Konfiguration(_) => "CONFIG_ERROR",
        }
    }
}
