//! Laufzeit-Konfiguration des Realtime-Kerns
//!
//! Wird vom Server aus der TOML-Konfiguration gebaut und dem Hub beim
//! Erstellen uebergeben. Alle Verbindungen teilen dieselbe Instanz.

use std::time::Duration;

use sprintwerk_protocol::wire::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_STAPEL};

/// Konfiguration fuer Hub und Verbindungs-Pumps
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Kapazitaet der ausgehenden Queue pro Verbindung
    pub queue_kapazitaet: usize,
    /// Intervall des Hub-Pings an alle Verbindungen in Sekunden
    pub ping_intervall_sek: u64,
    /// Intervall der Protokoll-Pings des Write-Pumps in Sekunden
    pub protokoll_ping_sek: u64,
    /// Lese-Deadline: ohne eingehenden Frame wird die Verbindung getrennt
    pub lese_deadline_sek: u64,
    /// Maximale Dauer eines einzelnen Schreibvorgangs
    pub schreib_deadline_sek: u64,
    /// Maximale Groesse eines Frames in Bytes (ein- und ausgehend)
    pub max_frame_groesse: usize,
    /// Maximale Anzahl Envelopes pro zusammengefasstem Frame
    pub max_stapel: usize,
    /// Maximale Anzahl Raeume pro Verbindung (inkl. persoenlichem Raum)
    pub max_raeume_pro_verbindung: usize,
    /// Kapazitaet des Presence-Event-Kanals
    pub presence_kanal_groesse: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            queue_kapazitaet: 256,
            ping_intervall_sek: 30,
            protokoll_ping_sek: 54,
            lese_deadline_sek: 60,
            schreib_deadline_sek: 10,
            max_frame_groesse: DEFAULT_MAX_FRAME_SIZE,
            max_stapel: DEFAULT_MAX_STAPEL,
            max_raeume_pro_verbindung: 256,
            presence_kanal_groesse: 256,
        }
    }
}

impl RealtimeConfig {
    pub fn ping_intervall(&self) -> Duration {
        Duration::from_secs(self.ping_intervall_sek.max(1))
    }

    pub fn protokoll_ping(&self) -> Duration {
        Duration::from_secs(self.protokoll_ping_sek.max(1))
    }

    pub fn lese_deadline(&self) -> Duration {
        Duration::from_secs(self.lese_deadline_sek.max(1))
    }

    pub fn schreib_deadline(&self) -> Duration {
        Duration::from_secs(self.schreib_deadline_sek.max(1))
    }
}
