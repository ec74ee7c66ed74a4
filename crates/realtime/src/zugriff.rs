//! Raum-Zugriff – Pruefung vor `join`
//!
//! Der Read-Pump fragt die Policy bevor eine Verbindung einem Raum beitritt.
//! Die Mitgliedschaft in Workspaces und Projekten kennt nur die Business-
//! Schicht; sie haengt eine eigene Implementierung ein.

use async_trait::async_trait;
use sprintwerk_core::{Raum, RaumArt, UserId};

/// Entscheidet ob ein User einem Raum beitreten darf
#[async_trait]
pub trait RaumZugriff: Send + Sync + 'static {
    async fn darf_beitreten(&self, user_id: &UserId, raum: &Raum) -> bool;
}

/// Standard-Policy: persoenliche Raeume nur fuer den eigenen User,
/// alle anderen Raeume sind offen.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardZugriff;

#[async_trait]
impl RaumZugriff for StandardZugriff {
    async fn darf_beitreten(&self, user_id: &UserId, raum: &Raum) -> bool {
        match raum.art() {
            RaumArt::User => raum.ist_persoenlich_fuer(user_id),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fremder_persoenlicher_raum_verboten() {
        let zugriff = StandardZugriff;
        let u1 = UserId::from("u1");
        assert!(zugriff.darf_beitreten(&u1, &Raum::user(&u1)).await);
        assert!(
            !zugriff
                .darf_beitreten(&u1, &Raum::user(&UserId::from("u2")))
                .await
        );
    }

    #[tokio::test]
    async fn projekt_raum_offen() {
        let zugriff = StandardZugriff;
        assert!(
            zugriff
                .darf_beitreten(&UserId::from("u1"), &Raum::projekt(42))
                .await
        );
    }
}
