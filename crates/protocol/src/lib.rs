//! sprintwerk-protocol – Wire-Format des Realtime-Kanals
//!
//! Dieses Crate definiert die Nachrichten die ueber die WebSocket-Verbindung
//! zwischen Client und Hub ausgetauscht werden:
//! - `Envelope` (Hub -> Client) mit festem Typ-Katalog `NachrichtenTyp`
//! - `Steuerframe` (Client -> Hub) mit den Aktionen join/leave/typing/ping/pong
//! - Stapel-Format fuer zusammengefasste Schreibvorgaenge

pub mod control;
pub mod envelope;
pub mod wire;

pub use control::{Aktion, ErrorCode, Steuerframe};
pub use envelope::{Envelope, NachrichtenTyp, Payload};
