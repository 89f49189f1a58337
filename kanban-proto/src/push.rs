//! Push-channel events for advisory edit locks.
//!
//! Frames are JSON text of the form `{"event": "<name>", "data": {...}}`.
//! Clients send `start_edit` / `stop_edit`; the server broadcasts
//! `item_locked` / `item_unlocked` to every other connected client.

use serde::{Deserialize, Serialize};

use crate::board::{EntityKind, UserId};

/// Error type for push frame encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Identifies one lockable entity: `(kind, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    /// Task or column.
    pub kind: EntityKind,
    /// The entity's server-assigned id.
    pub id: String,
}

impl EntityKey {
    /// Builds a key for the given kind and id.
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Key for a task.
    pub fn task(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Task, id)
    }

    /// Key for a column.
    pub fn column(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Column, id)
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.kind, self.id)
    }
}

/// Payload of `start_edit`, `stop_edit` and `item_locked`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockNotice {
    /// Entity id.
    pub id: String,
    /// Entity kind.
    #[serde(rename = "type")]
    pub kind: EntityKind,
    /// The user holding (or releasing) the lock.
    pub user_id: UserId,
}

impl LockNotice {
    /// Builds a notice for `key` held by `user_id`.
    #[must_use]
    pub fn new(key: &EntityKey, user_id: UserId) -> Self {
        Self {
            id: key.id.clone(),
            kind: key.kind,
            user_id,
        }
    }

    /// The lock-map key this notice refers to.
    #[must_use]
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind, self.id.clone())
    }
}

/// Payload of `item_unlocked`. The releasing user is not announced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockNotice {
    /// Entity id.
    pub id: String,
    /// Entity kind.
    #[serde(rename = "type")]
    pub kind: EntityKind,
}

impl UnlockNotice {
    /// The lock-map key this notice refers to.
    #[must_use]
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind, self.id.clone())
    }
}

/// Events exchanged on the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PushEvent {
    /// Outbound: the local user opened an editor.
    StartEdit(LockNotice),
    /// Outbound: the local user closed an editor.
    StopEdit(LockNotice),
    /// Inbound: another user holds the entity.
    ItemLocked(LockNotice),
    /// Inbound: the entity is free again.
    ItemUnlocked(UnlockNotice),
}

impl PushEvent {
    /// Wire name of this event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StartEdit(_) => "start_edit",
            Self::StopEdit(_) => "stop_edit",
            Self::ItemLocked(_) => "item_locked",
            Self::ItemUnlocked(_) => "item_unlocked",
        }
    }

    /// Whether the server is the sender of this event.
    #[must_use]
    pub const fn is_inbound(&self) -> bool {
        matches!(self, Self::ItemLocked(_) | Self::ItemUnlocked(_))
    }
}

/// Encodes a [`PushEvent`] as a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the event cannot be serialized.
pub fn encode(event: &PushEvent) -> Result<String, CodecError> {
    serde_json::to_string(event).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`PushEvent`] from a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Serialization` for malformed JSON, unknown event
/// names, or payloads missing required fields.
pub fn decode(text: &str) -> Result<PushEvent, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::Serialization(e.to_string()))
}
