//! sprintwerk-core – Gemeinsame Typen, Raum-Namen und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Sprintwerk-Crates gemeinsam genutzt werden.

pub mod error;
pub mod raum;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{Result, SprintwerkError};
pub use raum::{Raum, RaumArt};
pub use types::{UserId, VerbindungsId};
