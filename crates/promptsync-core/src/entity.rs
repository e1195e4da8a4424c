//! The three entity kinds and the envelope fields they share.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Discriminator for the three entity kinds, used as the store namespace
/// key and the wire `type`/`entityType` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Prompt,
    #[serde(rename = "prompt_version")]
    PromptVersion,
    Group,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Prompt, EntityKind::PromptVersion, EntityKind::Group];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Prompt => "prompt",
            EntityKind::PromptVersion => "prompt_version",
            EntityKind::Group => "group",
        }
    }

    /// Parses the wire/store representation, returning `None` for anything
    /// that isn't one of the three known kinds. Used at boundaries that
    /// take a caller-supplied kind string and must reject it per-item
    /// rather than fail strict-enum deserialization for an entire request.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "prompt" => Some(EntityKind::Prompt),
            "prompt_version" => Some(EntityKind::PromptVersion),
            "group" => Some(EntityKind::Group),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Fields every entity carries regardless of kind.
pub trait Envelope {
    fn id(&self) -> &str;
    fn created_at(&self) -> &str;
    fn updated_at(&self) -> &str;
    fn set_updated_at(&mut self, ts: String);
    fn sync_id(&self) -> Option<i64>;
    fn set_sync_id(&mut self, sync_id: i64);
    fn is_deleted(&self) -> bool;
    fn set_deleted(&mut self, deleted: bool);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    #[serde(rename = "isFavorite")]
    pub is_favorite: bool,
    #[serde(rename = "groupId", skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
    #[serde(rename = "syncId", skip_serializing_if = "Option::is_none")]
    pub sync_id: Option<i64>,
    #[serde(rename = "isDeleted", default, skip_serializing_if = "is_false")]
    pub is_deleted: bool,
}

impl Envelope for Prompt {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> &str {
        &self.created_at
    }

    fn updated_at(&self) -> &str {
        &self.updated_at
    }

    fn set_updated_at(&mut self, ts: String) {
        self.updated_at = ts;
    }

    fn sync_id(&self) -> Option<i64> {
        self.sync_id
    }

    fn set_sync_id(&mut self, sync_id: i64) {
        self.sync_id = Some(sync_id);
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn set_deleted(&mut self, deleted: bool) {
        self.is_deleted = deleted;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptVersion {
    pub id: String,
    #[serde(rename = "promptId")]
    pub prompt_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
    #[serde(rename = "syncId", skip_serializing_if = "Option::is_none")]
    pub sync_id: Option<i64>,
    #[serde(rename = "isDeleted", default, skip_serializing_if = "is_false")]
    pub is_deleted: bool,
}

impl Envelope for PromptVersion {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> &str {
        &self.created_at
    }

    fn updated_at(&self) -> &str {
        &self.updated_at
    }

    fn set_updated_at(&mut self, ts: String) {
        self.updated_at = ts;
    }

    fn sync_id(&self) -> Option<i64> {
        self.sync_id
    }

    fn set_sync_id(&mut self, sync_id: i64) {
        self.sync_id = Some(sync_id);
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn set_deleted(&mut self, deleted: bool) {
        self.is_deleted = deleted;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
    #[serde(rename = "syncId", skip_serializing_if = "Option::is_none")]
    pub sync_id: Option<i64>,
    #[serde(rename = "isDeleted", default, skip_serializing_if = "is_false")]
    pub is_deleted: bool,
}

impl Envelope for Group {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> &str {
        &self.created_at
    }

    fn updated_at(&self) -> &str {
        &self.updated_at
    }

    fn set_updated_at(&mut self, ts: String) {
        self.updated_at = ts;
    }

    fn sync_id(&self) -> Option<i64> {
        self.sync_id
    }

    fn set_sync_id(&mut self, sync_id: i64) {
        self.sync_id = Some(sync_id);
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn set_deleted(&mut self, deleted: bool) {
        self.is_deleted = deleted;
    }
}

/// Field-level inputs for `create_prompt`/`update_prompt` — the envelope is
/// minted or preserved by the view, never supplied by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptFields {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "isFavorite")]
    pub is_favorite: Option<bool>,
    #[serde(rename = "groupId")]
    pub group_id: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupFields {
    pub name: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptVersionFields {
    #[serde(rename = "promptId")]
    pub prompt_id: Option<String>,
    pub content: Option<String>,
    pub note: Option<Option<String>>,
}

/// Returns the current time as an RFC 3339 string, the wire format used
/// throughout for timestamps.
pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Mint a fresh 122-bit random entity identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Best-effort conversion between the envelope-typed entities and the
/// loosely-typed `serde_json::Value` payloads carried on the wire and in
/// pending-mutation records.
pub fn to_value<T: Serialize>(entity: &T) -> Value {
    serde_json::to_value(entity).expect("entity types always serialize")
}
