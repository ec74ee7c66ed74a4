//! sprintwerk-realtime – Echtzeit-Verteilung von Domain-Events
//!
//! Dieser Crate haelt alle offenen WebSocket-Verbindungen, ihre Raeume und
//! den User-Index und verteilt Envelopes an sie. Business-Services sprechen
//! nur mit dem `EventBroadcaster`.
//!
//! ## Architektur
//!
//! ```text
//! Business-Service
//!     |  (nach dem Commit)
//!     v
//! EventBroadcaster  – Raum-Namen, Ausschluss des Akteurs
//!     |
//!     v
//! Hub               – Verbindungen, Raeume, User-Index, Presence
//!     |  try_send in die Queue jeder Verbindung
//!     v
//! ClientConnection  – pro Verbindung Read-Pump + Write-Pump
//!     |  Read-Pump -> FrameDispatcher -> Hub (join/leave/typing/ping)
//!     v
//! WebSocket
//! ```

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod hub;
pub mod presence;
pub mod zugriff;

// Bequeme Re-Exporte
pub use broadcast::EventBroadcaster;
pub use config::RealtimeConfig;
pub use connection::ClientConnection;
pub use dispatcher::FrameDispatcher;
pub use error::{RealtimeError, RealtimeResult};
pub use hub::{Hub, Registrierung, StatistikSnapshot, VerbindungsHandle, VerbindungsZustand};
pub use presence::PresenceEvent;
pub use zugriff::{RaumZugriff, StandardZugriff};
