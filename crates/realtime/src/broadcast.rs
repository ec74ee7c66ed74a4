//! Event-Broadcaster – Semantische Fassade fuer die Business-Services
//!
//! Services rufen nach einem erfolgreichen Commit eine benannte Methode auf
//! ("Task im Projekt erstellt", "Mitglied zum Workspace hinzugefuegt"). Der
//! Broadcaster berechnet daraus Raum und Ausschluss und delegiert an den Hub.
//! Er haelt keinen eigenen Zustand.
//!
//! ## Konventionen
//! - Workspace-weite Events gehen an `workspace:<id>`
//! - Task- und Sprint-Events gehen an `project:<id>`
//! - Chat-Events gehen an `chat:<id>`
//! - Der handelnde User (`akteur`) bekommt sein eigenes Event nicht zurueck
//! - Direkte Events gehen an alle Tabs eines Users (`user:<id>`)
//!
//! Alle Methoden geben die Anzahl der Verbindungen zurueck, bei denen das
//! Envelope eingereiht wurde.

use std::fmt::Display;
use std::sync::Arc;

use serde::Serialize;
use sprintwerk_core::{Raum, UserId};
use sprintwerk_protocol::envelope::payload_aus;
use sprintwerk_protocol::{NachrichtenTyp, Payload};

use crate::error::RealtimeResult;
use crate::hub::Hub;

/// Fassade ueber dem Hub fuer Domain-Events
///
/// Clone teilt den Hub.
#[derive(Clone)]
pub struct EventBroadcaster {
    hub: Arc<Hub>,
}

impl EventBroadcaster {
    pub fn neu(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    // -----------------------------------------------------------------------
    // Generisch
    // -----------------------------------------------------------------------

    /// Sendet an einen beliebigen Raum, ohne die Tabs von `akteur`
    pub fn an_raum<T>(
        &self,
        raum: &Raum,
        typ: NachrichtenTyp,
        daten: &T,
        akteur: Option<&UserId>,
    ) -> usize
    where
        T: Serialize + ?Sized,
    {
        match self.payload(typ, daten) {
            Some(payload) => self.hub.an_raum_senden(raum, typ, payload, akteur),
            None => 0,
        }
    }

    /// Sendet an alle Tabs eines Users
    pub fn an_user<T>(&self, user_id: &UserId, typ: NachrichtenTyp, daten: &T) -> usize
    where
        T: Serialize + ?Sized,
    {
        match self.payload(typ, daten) {
            Some(payload) => self.hub.an_user_senden(user_id, typ, payload),
            None => 0,
        }
    }

    pub fn an_workspace<T>(
        &self,
        workspace_id: impl Display,
        typ: NachrichtenTyp,
        daten: &T,
        akteur: Option<&UserId>,
    ) -> usize
    where
        T: Serialize + ?Sized,
    {
        self.an_raum(&Raum::workspace(workspace_id), typ, daten, akteur)
    }

    pub fn an_projekt<T>(
        &self,
        projekt_id: impl Display,
        typ: NachrichtenTyp,
        daten: &T,
        akteur: Option<&UserId>,
    ) -> usize
    where
        T: Serialize + ?Sized,
    {
        self.an_raum(&Raum::projekt(projekt_id), typ, daten, akteur)
    }

    // -----------------------------------------------------------------------
    // Workspace-Struktur
    // -----------------------------------------------------------------------

    pub fn workspace_aktualisiert<T: Serialize + ?Sized>(
        &self,
        workspace_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_workspace(workspace_id, NachrichtenTyp::WorkspaceUpdated, daten, Some(akteur))
    }

    pub fn workspace_geloescht<T: Serialize + ?Sized>(
        &self,
        workspace_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_workspace(workspace_id, NachrichtenTyp::WorkspaceDeleted, daten, Some(akteur))
    }

    pub fn space_erstellt<T: Serialize + ?Sized>(
        &self,
        workspace_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_workspace(workspace_id, NachrichtenTyp::SpaceCreated, daten, Some(akteur))
    }

    pub fn space_aktualisiert<T: Serialize + ?Sized>(
        &self,
        workspace_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_workspace(workspace_id, NachrichtenTyp::SpaceUpdated, daten, Some(akteur))
    }

    pub fn space_geloescht<T: Serialize + ?Sized>(
        &self,
        workspace_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_workspace(workspace_id, NachrichtenTyp::SpaceDeleted, daten, Some(akteur))
    }

    pub fn ordner_erstellt<T: Serialize + ?Sized>(
        &self,
        workspace_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_workspace(workspace_id, NachrichtenTyp::FolderCreated, daten, Some(akteur))
    }

    pub fn ordner_aktualisiert<T: Serialize + ?Sized>(
        &self,
        workspace_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_workspace(workspace_id, NachrichtenTyp::FolderUpdated, daten, Some(akteur))
    }

    pub fn ordner_geloescht<T: Serialize + ?Sized>(
        &self,
        workspace_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_workspace(workspace_id, NachrichtenTyp::FolderDeleted, daten, Some(akteur))
    }

    pub fn projekt_erstellt<T: Serialize + ?Sized>(
        &self,
        workspace_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_workspace(workspace_id, NachrichtenTyp::ProjectCreated, daten, Some(akteur))
    }

    pub fn projekt_aktualisiert<T: Serialize + ?Sized>(
        &self,
        workspace_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_workspace(workspace_id, NachrichtenTyp::ProjectUpdated, daten, Some(akteur))
    }

    pub fn projekt_geloescht<T: Serialize + ?Sized>(
        &self,
        workspace_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_workspace(workspace_id, NachrichtenTyp::ProjectDeleted, daten, Some(akteur))
    }

    pub fn ziel_erstellt<T: Serialize + ?Sized>(
        &self,
        workspace_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_workspace(workspace_id, NachrichtenTyp::GoalCreated, daten, Some(akteur))
    }

    pub fn ziel_aktualisiert<T: Serialize + ?Sized>(
        &self,
        workspace_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_workspace(workspace_id, NachrichtenTyp::GoalUpdated, daten, Some(akteur))
    }

    pub fn ziel_geloescht<T: Serialize + ?Sized>(
        &self,
        workspace_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_workspace(workspace_id, NachrichtenTyp::GoalDeleted, daten, Some(akteur))
    }

    // -----------------------------------------------------------------------
    // Mitglieder
    // -----------------------------------------------------------------------

    /// Neues Mitglied: Workspace-Raum plus direkt an das Mitglied
    pub fn mitglied_hinzugefuegt<T: Serialize + ?Sized>(
        &self,
        workspace_id: impl Display,
        mitglied: &UserId,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.mitglied_event(workspace_id, NachrichtenTyp::MemberAdded, mitglied, daten, akteur)
    }

    /// Entferntes Mitglied erfaehrt es auch dann, wenn es den Raum schon verlassen hat
    pub fn mitglied_entfernt<T: Serialize + ?Sized>(
        &self,
        workspace_id: impl Display,
        mitglied: &UserId,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.mitglied_event(workspace_id, NachrichtenTyp::MemberRemoved, mitglied, daten, akteur)
    }

    pub fn rolle_geaendert<T: Serialize + ?Sized>(
        &self,
        workspace_id: impl Display,
        mitglied: &UserId,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.mitglied_event(
            workspace_id,
            NachrichtenTyp::MemberRoleChanged,
            mitglied,
            daten,
            akteur,
        )
    }

    fn mitglied_event<T: Serialize + ?Sized>(
        &self,
        workspace_id: impl Display,
        typ: NachrichtenTyp,
        mitglied: &UserId,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        let raum = Raum::workspace(workspace_id);
        self.raum_und_betroffener(&raum, typ, mitglied, daten, akteur)
    }

    // -----------------------------------------------------------------------
    // Tasks und Sprints (Projekt-Raum)
    // -----------------------------------------------------------------------

    pub fn task_erstellt<T: Serialize + ?Sized>(
        &self,
        projekt_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_projekt(projekt_id, NachrichtenTyp::TaskCreated, daten, Some(akteur))
    }

    pub fn task_aktualisiert<T: Serialize + ?Sized>(
        &self,
        projekt_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_projekt(projekt_id, NachrichtenTyp::TaskUpdated, daten, Some(akteur))
    }

    pub fn task_geloescht<T: Serialize + ?Sized>(
        &self,
        projekt_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_projekt(projekt_id, NachrichtenTyp::TaskDeleted, daten, Some(akteur))
    }

    /// Statuswechsel oder Umsortierung auf dem Board
    pub fn task_verschoben<T: Serialize + ?Sized>(
        &self,
        projekt_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_projekt(projekt_id, NachrichtenTyp::TaskMoved, daten, Some(akteur))
    }

    /// Zuweisung: Projekt-Raum plus direkt an den Zugewiesenen
    pub fn task_zugewiesen<T: Serialize + ?Sized>(
        &self,
        projekt_id: impl Display,
        zugewiesener: &UserId,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        let raum = Raum::projekt(projekt_id);
        self.raum_und_betroffener(&raum, NachrichtenTyp::TaskAssigned, zugewiesener, daten, akteur)
    }

    pub fn kommentar_hinzugefuegt<T: Serialize + ?Sized>(
        &self,
        projekt_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_projekt(projekt_id, NachrichtenTyp::CommentAdded, daten, Some(akteur))
    }

    pub fn sprint_erstellt<T: Serialize + ?Sized>(
        &self,
        projekt_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_projekt(projekt_id, NachrichtenTyp::SprintCreated, daten, Some(akteur))
    }

    pub fn sprint_aktualisiert<T: Serialize + ?Sized>(
        &self,
        projekt_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_projekt(projekt_id, NachrichtenTyp::SprintUpdated, daten, Some(akteur))
    }

    pub fn sprint_gestartet<T: Serialize + ?Sized>(
        &self,
        projekt_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_projekt(projekt_id, NachrichtenTyp::SprintStarted, daten, Some(akteur))
    }

    pub fn sprint_abgeschlossen<T: Serialize + ?Sized>(
        &self,
        projekt_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_projekt(projekt_id, NachrichtenTyp::SprintCompleted, daten, Some(akteur))
    }

    // -----------------------------------------------------------------------
    // Chat
    // -----------------------------------------------------------------------

    pub fn chat_nachricht<T: Serialize + ?Sized>(
        &self,
        chat_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_raum(&Raum::chat(chat_id), NachrichtenTyp::ChatMessage, daten, Some(akteur))
    }

    pub fn chat_nachricht_bearbeitet<T: Serialize + ?Sized>(
        &self,
        chat_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_raum(&Raum::chat(chat_id), NachrichtenTyp::ChatMessageUpdated, daten, Some(akteur))
    }

    pub fn chat_nachricht_geloescht<T: Serialize + ?Sized>(
        &self,
        chat_id: impl Display,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        self.an_raum(&Raum::chat(chat_id), NachrichtenTyp::ChatMessageDeleted, daten, Some(akteur))
    }

    // -----------------------------------------------------------------------
    // Direkt an einen User
    // -----------------------------------------------------------------------

    pub fn einladung_erhalten<T: Serialize + ?Sized>(&self, user_id: &UserId, daten: &T) -> usize {
        self.an_user(user_id, NachrichtenTyp::InvitationReceived, daten)
    }

    pub fn benachrichtigung<T: Serialize + ?Sized>(&self, user_id: &UserId, daten: &T) -> usize {
        self.an_user(user_id, NachrichtenTyp::NotificationCreated, daten)
    }

    /// Client soll seine Rechte neu laden
    pub fn berechtigungen_geaendert<T: Serialize + ?Sized>(
        &self,
        user_id: &UserId,
        daten: &T,
    ) -> usize {
        self.an_user(user_id, NachrichtenTyp::PermissionsChanged, daten)
    }

    // -----------------------------------------------------------------------
    // Intern
    // -----------------------------------------------------------------------

    /// Raum ohne Akteur, plus direkt an den Betroffenen falls keiner seiner
    /// Tabs im Raum ist (sonst kaeme das Event doppelt)
    fn raum_und_betroffener<T: Serialize + ?Sized>(
        &self,
        raum: &Raum,
        typ: NachrichtenTyp,
        betroffener: &UserId,
        daten: &T,
        akteur: &UserId,
    ) -> usize {
        let Some(payload) = self.payload(typ, daten) else {
            return 0;
        };

        let direkt = betroffener != akteur && !self.hub.user_im_raum(betroffener, raum);
        let mut anzahl = if direkt {
            self.hub.an_user_senden(betroffener, typ, payload.clone())
        } else {
            0
        };
        anzahl += self.hub.an_raum_senden(raum, typ, payload, Some(akteur));
        anzahl
    }

    fn payload<T: Serialize + ?Sized>(&self, typ: NachrichtenTyp, daten: &T) -> Option<Payload> {
        match payload_bauen(daten) {
            Ok(payload) => Some(payload),
            Err(e) => {
                self.hub.statistik.serialisierungsfehler();
                tracing::warn!(
                    typ = %typ,
                    fehler = %e,
                    "Payload nicht serialisierbar – Event verworfen"
                );
                None
            }
        }
    }
}

fn payload_bauen<T: Serialize + ?Sized>(daten: &T) -> RealtimeResult<Payload> {
    Ok(payload_aus(daten)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
