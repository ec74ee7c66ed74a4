//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use serde::{Deserialize, Serialize};
use sprintwerk_observability::logging::{log_format_gueltig, log_level_gueltig};
use sprintwerk_realtime::RealtimeConfig;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Realtime-Hub und Verbindungs-Pumps
    pub realtime: RealtimeEinstellungen,
    /// Identitaets-Aufloesung beim Upgrade
    pub auth: AuthEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger WebSocket-Verbindungen
    pub max_verbindungen: usize,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Sprintwerk Realtime".into(),
            max_verbindungen: 10_000,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer HTTP und WebSocket
    pub bind_adresse: String,
    /// Port fuer HTTP und WebSocket
    pub port: u16,
    /// Pfad des WebSocket-Endpunkts
    pub ws_pfad: String,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 8080,
            ws_pfad: "/ws".into(),
        }
    }
}

/// Realtime-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeEinstellungen {
    /// Kapazitaet der ausgehenden Queue pro Verbindung
    pub queue_kapazitaet: usize,
    /// Intervall des Hub-Pings in Sekunden
    pub ping_intervall_sek: u64,
    /// Lese-Deadline in Sekunden
    pub lese_deadline_sek: u64,
    /// Schreib-Deadline in Sekunden
    pub schreib_deadline_sek: u64,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_groesse: usize,
    /// Maximale Anzahl Envelopes pro Frame
    pub max_stapel: usize,
    /// Maximale Anzahl Raeume pro Verbindung
    pub max_raeume_pro_verbindung: usize,
}

impl Default for RealtimeEinstellungen {
    fn default() -> Self {
        let basis = RealtimeConfig::default();
        Self {
            queue_kapazitaet: basis.queue_kapazitaet,
            ping_intervall_sek: basis.ping_intervall_sek,
            lese_deadline_sek: basis.lese_deadline_sek,
            schreib_deadline_sek: basis.schreib_deadline_sek,
            max_frame_groesse: basis.max_frame_groesse,
            max_stapel: basis.max_stapel,
            max_raeume_pro_verbindung: basis.max_raeume_pro_verbindung,
        }
    }
}

/// Identitaets-Einstellungen
///
/// Die Authentifizierung selbst passiert vor diesem Dienst (Gateway,
/// Session-Service). Der Server vertraut dem gesetzten Header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthEinstellungen {
    /// Header mit der verifizierten User-ID
    pub identitaets_header: String,
}

impl Default for AuthEinstellungen {
    fn default() -> Self {
        Self {
            identitaets_header: "x-user-id".into(),
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Prueft Werte, die serde allein nicht abfangen kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        if !log_level_gueltig(&self.logging.level) {
            anyhow::bail!("Ungueltiges Log-Level '{}'", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            anyhow::bail!("Ungueltiges Log-Format '{}'", self.logging.format);
        }
        if self.realtime.queue_kapazitaet == 0 {
            anyhow::bail!("realtime.queue_kapazitaet muss groesser 0 sein");
        }
        if self.realtime.lese_deadline_sek <= self.realtime.ping_intervall_sek {
            anyhow::bail!(
                "realtime.lese_deadline_sek ({}) muss groesser als ping_intervall_sek ({}) sein",
                self.realtime.lese_deadline_sek,
                self.realtime.ping_intervall_sek
            );
        }
        if !self.netzwerk.ws_pfad.starts_with('/') {
            anyhow::bail!("netzwerk.ws_pfad muss mit '/' beginnen");
        }
        Ok(())
    }

    /// Laufzeit-Konfiguration fuer den Hub
    ///
    /// Protokoll-Pings gehen bei 9/10 der Lese-Deadline raus, damit der
    /// Client rechtzeitig antworten kann.
    pub fn realtime_config(&self) -> RealtimeConfig {
        let r = &self.realtime;
        RealtimeConfig {
            queue_kapazitaet: r.queue_kapazitaet,
            ping_intervall_sek: r.ping_intervall_sek,
            protokoll_ping_sek: (r.lese_deadline_sek * 9 / 10).max(1),
            lese_deadline_sek: r.lese_deadline_sek,
            schreib_deadline_sek: r.schreib_deadline_sek,
            max_frame_groesse: r.max_frame_groesse,
            max_stapel: r.max_stapel,
            max_raeume_pro_verbindung: r.max_raeume_pro_verbindung,
            ..RealtimeConfig::default()
        }
    }

    /// Gibt die vollstaendige Bind-Adresse fuer HTTP/WebSocket zurueck
    pub fn bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.port)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.observability.port)
    }
}
