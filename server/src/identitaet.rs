//! Identitaets-Aufloesung beim WebSocket-Upgrade
//!
//! Eine Verbindung wird nur mit einer bereits verifizierten User-ID
//! angenommen. Woher sie kommt, entscheidet die Implementierung.

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName};
use sprintwerk_core::{SprintwerkError, UserId};

/// Liefert die User-ID fuer einen Upgrade-Request
#[async_trait]
pub trait IdentitaetsAufloeser: Send + Sync + 'static {
    async fn aufloesen(&self, headers: &HeaderMap) -> Result<UserId, SprintwerkError>;
}

/// Liest die User-ID aus einem vom Gateway gesetzten Header
#[derive(Debug, Clone)]
pub struct HeaderIdentitaet {
    header: HeaderName,
}

impl HeaderIdentitaet {
    pub fn neu(header: &str) -> Result<Self, SprintwerkError> {
        let header = HeaderName::from_bytes(header.as_bytes()).map_err(|e| {
            SprintwerkError::Konfiguration(format!("Ungueltiger Header-Name '{header}': {e}"))
        })?;
        Ok(Self { header })
    }
}

#[async_trait]
impl IdentitaetsAufloeser for HeaderIdentitaet {
    async fn aufloesen(&self, headers: &HeaderMap) -> Result<UserId, SprintwerkError> {
        let wert = headers.get(&self.header).ok_or_else(|| {
            SprintwerkError::KeineIdentitaet(format!("Header '{}' fehlt", self.header))
        })?;

        let id = wert
            .to_str()
            .map_err(|_| {
                SprintwerkError::KeineIdentitaet("User-ID ist kein gueltiger Text".into())
            })?
            .trim();

        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(SprintwerkError::KeineIdentitaet("User-ID ist leer oder ungueltig".into()));
        }
        Ok(UserId::neu(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(wert: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static(wert));
        headers
    }

    #[tokio::test]
    async fn user_id_aus_header() {
        let aufloeser = HeaderIdentitaet::neu("x-user-id").unwrap();
        let uid = aufloeser.aufloesen(&headers("u-17")).await.unwrap();
        assert_eq!(uid.as_str(), "u-17");
    }

    #[tokio::test]
    async fn fehlender_header() {
        let aufloeser = HeaderIdentitaet::neu("x-user-id").unwrap();
        let fehler = aufloeser.aufloesen(&HeaderMap::new()).await.unwrap_err();
        assert_eq!(fehler.code(), "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn leere_user_id() {
        let aufloeser = HeaderIdentitaet::neu("x-user-id").unwrap();
        assert!(aufloeser.aufloesen(&headers("   ")).await.is_err());
    }

    #[test]
    fn ungueltiger_header_name() {
        assert!(HeaderIdentitaet::neu("kein header").is_err());
    }
}
