//! Wire-Format fuer zusammengefasste Schreibvorgaenge
//!
//! Liegen beim Write-Pump bereits mehrere Envelopes in der Queue, werden sie
//! in einen einzigen WebSocket-Text-Frame geschrieben, getrennt durch `\n`.
//!
//! ## Frame-Format
//!
//! ```text
//! {"type":"task_created",...}\n{"type":"task_updated",...}\n{"type":"ping",...}
//! ```
//!
//! serde_json escaped Zeilenumbrueche innerhalb von Strings, daher kann `\n`
//! nie Teil eines serialisierten Envelopes sein. Clients zerlegen jeden
//! Text-Frame an `\n` und parsen jede Zeile einzeln.

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Trennzeichen zwischen Envelopes in einem Frame
pub const STAPEL_TRENNER: char = '\n';

/// Standard-maximale Frame-Groesse (64 KB), ein- wie ausgehend
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Standard-maximale Anzahl Envelopes pro Frame
pub const DEFAULT_MAX_STAPEL: usize = 32;

// ---------------------------------------------------------------------------
// Stapel
// ---------------------------------------------------------------------------

/// Sammelt serialisierte Envelopes fuer einen physischen Schreibvorgang
///
/// Das erste Envelope wird immer angenommen, auch wenn es allein groesser
/// als `max_bytes` ist. Jedes weitere nur, solange beide Limits halten.
#[derive(Debug)]
pub struct Stapel {
    puffer: String,
    anzahl: usize,
    max_bytes: usize,
    max_anzahl: usize,
}

impl Stapel {
    /// Erstellt einen leeren Stapel mit Limits
    pub fn neu(max_bytes: usize, max_anzahl: usize) -> Self {
        Self {
            puffer: String::new(),
            anzahl: 0,
            max_bytes,
            max_anzahl: max_anzahl.max(1),
        }
    }

    /// Prueft ob ein Envelope dieser Groesse noch hineinpasst
    pub fn passt(&self, laenge: usize) -> bool {
        if self.anzahl == 0 {
            return true;
        }
        self.anzahl < self.max_anzahl && self.puffer.len() + 1 + laenge <= self.max_bytes
    }

    /// Haengt ein Envelope an. Gibt `false` zurueck wenn es nicht mehr passt.
    pub fn hinzufuegen(&mut self, envelope: &str) -> bool {
        if !self.passt(envelope.len()) {
            return false;
        }
        if self.anzahl > 0 {
            self.puffer.push(STAPEL_TRENNER);
        }
        self.puffer.push_str(envelope);
        self.anzahl += 1;
        true
    }

    /// Ist der Stapel voll (Anzahl-Limit erreicht)?
    pub fn ist_voll(&self) -> bool {
        self.anzahl >= self.max_anzahl
    }

    pub fn anzahl(&self) -> usize {
        self.anzahl
    }

    /// Gibt den fertigen Frame-Text zurueck
    pub fn abschliessen(self) -> String {
        self.puffer
    }
}

/// Zerlegt einen empfangenen Text-Frame in einzelne Envelope-Zeilen
pub fn stapel_zerlegen(frame: &str) -> impl Iterator<Item = &str> {
    frame
        .split(STAPEL_TRENNER)
        .map(str::trim)
        .filter(|zeile| !zeile.is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
