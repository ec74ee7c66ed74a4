//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `SW_LOG_LEVEL`: Filter (z.B. `info` oder `sprintwerk_realtime=debug`)
//! - `SW_LOG_FORMAT`: Format (text/json)
//!
//! Beide ueberschreiben die Werte aus der Konfigurationsdatei.

use tracing_subscriber::{fmt, EnvFilter};

/// Umgebungsvariable fuer den Log-Filter
pub const LOG_LEVEL_ENV: &str = "SW_LOG_LEVEL";
/// Umgebungsvariable fuer das Log-Format
pub const LOG_FORMAT_ENV: &str = "SW_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// `level` und `format` kommen aus dem `[logging]`-Abschnitt der
/// Konfigurationsdatei. Vorrang:
/// 1. `SW_LOG_LEVEL` / `SW_LOG_FORMAT` aus der Umgebung
/// 2. Werte aus der Konfigurationsdatei
/// 3. `info` bzw. `text`
///
/// Anders als `validieren()` akzeptiert der Filter auch Direktiven wie
/// `sprintwerk_realtime=trace`. Ein unbrauchbarer Filter in der Umgebung
/// faellt auf den Konfigurationswert zurueck statt den Start zu verhindern.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let env_format = std::env::var(LOG_FORMAT_ENV).ok();
    let format = format_waehlen(env_format.as_deref(), format);

    match format {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Umgebung vor Konfiguration, unbekannte Werte ergeben `text`
fn format_waehlen<'a>(umgebung: Option<&'a str>, konfiguriert: &'a str) -> &'a str {
    match umgebung.filter(|f| log_format_gueltig(f)) {
        Some(format) => format,
        None if log_format_gueltig(konfiguriert) => konfiguriert,
        None => "text",
    }
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
