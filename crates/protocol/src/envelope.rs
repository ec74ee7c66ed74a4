//! Envelope – Ausgehendes Nachrichtenformat (Hub -> Client)
//!
//! ```json
//! { "type": "task_created", "payload": { ... }, "timestamp": "2026-01-01T12:00:00Z" }
//! ```
//!
//! Ein Envelope ist nach dem Erstellen unveraenderlich. Der Hub serialisiert
//! es genau einmal pro Fan-Out und verteilt dieselben Bytes an alle Empfaenger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Payload eines Envelopes: String-Schluessel auf beliebige JSON-Werte
pub type Payload = Map<String, Value>;

// ---------------------------------------------------------------------------
// Typ-Katalog
// ---------------------------------------------------------------------------

/// Fester Katalog aller ausgehenden Nachrichtentypen
///
/// Domain-Typen werden vom Kern nicht interpretiert, nur geroutet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NachrichtenTyp {
    // Presence
    UserOnline,
    UserOffline,

    // Protokoll
    Ping,
    Pong,
    Ack,
    Error,
    Typing,

    // Tasks
    TaskCreated,
    TaskUpdated,
    TaskDeleted,
    TaskMoved,
    TaskAssigned,
    CommentAdded,

    // Sprints
    SprintCreated,
    SprintUpdated,
    SprintStarted,
    SprintCompleted,

    // Ziele
    GoalCreated,
    GoalUpdated,
    GoalDeleted,

    // Hierarchie
    WorkspaceUpdated,
    WorkspaceDeleted,
    SpaceCreated,
    SpaceUpdated,
    SpaceDeleted,
    FolderCreated,
    FolderUpdated,
    FolderDeleted,
    ProjectCreated,
    ProjectUpdated,
    ProjectDeleted,

    // Mitglieder
    MemberAdded,
    MemberRemoved,
    MemberRoleChanged,

    // Chat
    ChatMessage,
    ChatMessageUpdated,
    ChatMessageDeleted,

    // Persoenlich
    InvitationReceived,
    NotificationCreated,
    PermissionsChanged,
}

impl NachrichtenTyp {
    /// Name im Wire-Format
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::UserOnline => "user_online",
            Self::UserOffline => "user_offline",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Ack => "ack",
            Self::Error => "error",
            Self::Typing => "typing",
            Self::TaskCreated => "task_created",
            Self::TaskUpdated => "task_updated",
            Self::TaskDeleted => "task_deleted",
            Self::TaskMoved => "task_moved",
            Self::TaskAssigned => "task_assigned",
            Self::CommentAdded => "comment_added",
            Self::SprintCreated => "sprint_created",
            Self::SprintUpdated => "sprint_updated",
            Self::SprintStarted => "sprint_started",
            Self::SprintCompleted => "sprint_completed",
            Self::GoalCreated => "goal_created",
            Self::GoalUpdated => "goal_updated",
            Self::GoalDeleted => "goal_deleted",
            Self::WorkspaceUpdated => "workspace_updated",
            Self::WorkspaceDeleted => "workspace_deleted",
            Self::SpaceCreated => "space_created",
            Self::SpaceUpdated => "space_updated",
            Self::SpaceDeleted => "space_deleted",
            Self::FolderCreated => "folder_created",
            Self::FolderUpdated => "folder_updated",
            Self::FolderDeleted => "folder_deleted",
            Self::ProjectCreated => "project_created",
            Self::ProjectUpdated => "project_updated",
            Self::ProjectDeleted => "project_deleted",
            Self::MemberAdded => "member_added",
            Self::MemberRemoved => "member_removed",
            Self::MemberRoleChanged => "member_role_changed",
            Self::ChatMessage => "chat_message",
            Self::ChatMessageUpdated => "chat_message_updated",
            Self::ChatMessageDeleted => "chat_message_deleted",
            Self::InvitationReceived => "invitation_received",
            Self::NotificationCreated => "notification_created",
            Self::PermissionsChanged => "permissions_changed",
        }
    }
}

impl std::fmt::Display for NachrichtenTyp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.als_str())
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Ausgehende Nachricht an einen oder mehrere Clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub typ: NachrichtenTyp,
    #[serde(default)]
    pub payload: Payload,
    /// RFC3339-Zeitstempel der Erstellung
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Erstellt ein Envelope mit aktuellem Zeitstempel
    pub fn neu(typ: NachrichtenTyp, payload: Payload) -> Self {
        Self {
            typ,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Envelope ohne Payload (z.B. Ping)
    pub fn leer(typ: NachrichtenTyp) -> Self {
        Self::neu(typ, Payload::new())
    }

    /// `error`-Envelope mit Code und lesbarer Meldung
    pub fn fehler(code: crate::control::ErrorCode, meldung: impl Into<String>) -> Self {
        let mut payload = Payload::new();
        payload.insert("code".into(), Value::String(code.als_str().into()));
        payload.insert("message".into(), Value::String(meldung.into()));
        Self::neu(NachrichtenTyp::Error, payload)
    }

    /// Serialisiert das Envelope einmalig in geteilte Bytes fuer den Fan-Out
    pub fn serialisieren(&self) -> serde_json::Result<Arc<str>> {
        serde_json::to_string(self).map(Arc::from)
    }

    /// Deserialisiert ein Envelope (Client-Seite, Tests)
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Wandelt einen beliebigen serialisierbaren Wert in eine Payload-Map
///
/// Schlaegt fehl wenn der Wert nicht serialisierbar ist oder kein
/// JSON-Objekt ergibt.
pub fn payload_aus<T: Serialize + ?Sized>(wert: &T) -> serde_json::Result<Payload> {
    match serde_json::to_value(wert)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Payload::new()),
        anderes => Err(serde::ser::Error::custom(format!(
            "Payload muss ein JSON-Objekt sein, erhalten: {}",
            json_art(&anderes)
        ))),
    }
}

fn json_art(wert: &Value) -> &'static str {
    match wert {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
