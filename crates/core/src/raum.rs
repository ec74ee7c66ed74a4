//! Raum-Namen – Broadcast-Bereiche als `<art>:<id>`
//!
//! Ein Raum hat kein eigenes Objekt, er existiert nur als Schluessel im
//! Raum-Index des Hubs. Die Namenskonvention ist Teil des Wire-Vertrags:
//!
//! ```text
//! workspace:<id>   Mitglieder eines Workspaces
//! space:<id>       Mitglieder eines Spaces
//! project:<id>     Mitglieder eines Projekts
//! chat:<id>        Teilnehmer eines Chat-Kanals
//! user:<id>        Persoenlicher Raum, beim Verbinden automatisch betreten
//! ```

use serde::{Deserialize, Serialize};

use crate::error::SprintwerkError;
use crate::types::UserId;

/// Maximale Laenge eines Raum-Namens in Bytes
pub const MAX_RAUM_LAENGE: usize = 128;

/// Art eines Raums (Praefix vor dem Doppelpunkt)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RaumArt {
    Workspace,
    Space,
    Projekt,
    Chat,
    User,
}

impl RaumArt {
    /// Praefix im Wire-Format
    pub fn praefix(&self) -> &'static str {
        match self {
            RaumArt::Workspace => "workspace",
            RaumArt::Space => "space",
            RaumArt::Projekt => "project",
            RaumArt::Chat => "chat",
            RaumArt::User => "user",
        }
    }

    fn aus_praefix(praefix: &str) -> Option<Self> {
        match praefix {
            "workspace" => Some(RaumArt::Workspace),
            "space" => Some(RaumArt::Space),
            "project" => Some(RaumArt::Projekt),
            "chat" => Some(RaumArt::Chat),
            "user" => Some(RaumArt::User),
            _ => None,
        }
    }
}

/// Validierter Raum-Name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Raum(String);

impl Raum {
    fn bauen(art: RaumArt, id: impl std::fmt::Display) -> Self {
        Self(format!("{}:{}", art.praefix(), id))
    }

    /// `workspace:<id>`
    pub fn workspace(id: impl std::fmt::Display) -> Self {
        Self::bauen(RaumArt::Workspace, id)
    }

    /// `space:<id>`
    pub fn space(id: impl std::fmt::Display) -> Self {
        Self::bauen(RaumArt::Space, id)
    }

    /// `project:<id>`
    pub fn projekt(id: impl std::fmt::Display) -> Self {
        Self::bauen(RaumArt::Projekt, id)
    }

    /// `chat:<id>`
    pub fn chat(id: impl std::fmt::Display) -> Self {
        Self::bauen(RaumArt::Chat, id)
    }

    /// Persoenlicher Raum `user:<id>`
    pub fn user(user_id: &UserId) -> Self {
        Self::bauen(RaumArt::User, user_id)
    }

    /// Parst und validiert einen Raum-Namen aus einem Client-Frame
    pub fn parsen(name: &str) -> Result<Self, SprintwerkError> {
        if name.len() > MAX_RAUM_LAENGE {
            return Err(SprintwerkError::UngueltigerRaum(format!(
                "Raum-Name zu lang ({} Bytes)",
                name.len()
            )));
        }

        let (praefix, id) = name
            .split_once(':')
            .ok_or_else(|| SprintwerkError::UngueltigerRaum(name.to_string()))?;

        if RaumArt::aus_praefix(praefix).is_none() {
            return Err(SprintwerkError::UngueltigerRaum(format!(
                "unbekannte Raum-Art '{praefix}'"
            )));
        }
        if id.trim().is_empty() || id.chars().any(char::is_whitespace) {
            return Err(SprintwerkError::UngueltigerRaum(name.to_string()));
        }

        Ok(Self(name.to_string()))
    }

    /// Art des Raums
    pub fn art(&self) -> RaumArt {
        self.0
            .split_once(':')
            .and_then(|(p, _)| RaumArt::aus_praefix(p))
            // Konstruktoren und parsen() garantieren ein bekanntes Praefix
            .unwrap_or(RaumArt::User)
    }

    /// ID-Teil nach dem Doppelpunkt
    pub fn id(&self) -> &str {
        self.0.split_once(':').map(|(_, id)| id).unwrap_or_default()
    }

    /// Prueft ob dies der persoenliche Raum des angegebenen Users ist
    pub fn ist_persoenlich_fuer(&self, user_id: &UserId) -> bool {
        self.art() == RaumArt::User && self.id() == user_id.as_str()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Raum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Raum {
    type Error = SprintwerkError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Raum::parsen(&s)
    }
}

impl From<Raum> for String {
    fn from(raum: Raum) -> Self {
        raum.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn konstruktoren_folgen_namenskonvention() {
        assert_eq!(Raum::workspace(7).as_str(), "workspace:7");
        assert_eq!(Raum::projekt("42").as_str(), "project:42");
        assert_eq!(Raum::user(&UserId::from("u1")).as_str(), "user:u1");
        assert_eq!(Raum::chat("abc").art(), RaumArt::Chat);
    }

    #[test]
    fn gueltige_namen_parsen() {
        let raum = Raum::parsen("project:42").unwrap();
        assert_eq!(raum.art(), RaumArt::Projekt);
        assert_eq!(raum.id(), "42");
        assert_eq!(raum, Raum::projekt(42));
    }

    #[test]
    fn ungueltige_namen_abgelehnt() {
        assert!(Raum::parsen("project").is_err());
        assert!(Raum::parsen("project:").is_err());
        assert!(Raum::parsen("galaxy:1").is_err());
        assert!(Raum::parsen("project:4 2").is_err());
        assert!(Raum::parsen(&format!("project:{}", "x".repeat(200))).is_err());
    }

    #[test]
    fn persoenlicher_raum_erkannt() {
        let u1 = UserId::from("u1");
        let u2 = UserId::from("u2");
        let raum = Raum::user(&u1);
        assert!(raum.ist_persoenlich_fuer(&u1));
        assert!(!raum.ist_persoenlich_fuer(&u2));
        assert!(!Raum::workspace("u1").ist_persoenlich_fuer(&u1));
    }

    #[test]
    fn serde_validiert_beim_deserialisieren() {
        let raum: Raum = serde_json::from_str("\"workspace:9\"").unwrap();
        assert_eq!(raum.art(), RaumArt::Workspace);
        assert!(serde_json::from_str::<Raum>("\"kaputt\"").is_err());
        assert_eq!(serde_json::to_string(&raum).unwrap(), "\"workspace:9\"");
    }
}
