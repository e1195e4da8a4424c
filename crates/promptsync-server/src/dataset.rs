//! In-memory server-authoritative dataset: the remote authority's view of
//! every entity plus the sequence counter that becomes `syncId`. No
//! persistence beyond process memory — this is a mock for local dev and
//! tests, not a production backend.

use std::collections::HashMap;

use promptsync_core::entity::EntityKind;
use promptsync_core::sync::types::{ChangeSet, KindChanges, MutationOp, MutationResult, WireMutation};
use serde_json::Value;

/// One entity's server-side bookkeeping: its current JSON state, the
/// sequence of its most recent write, and the sequence of its first write
/// (used to tell a pull-side observer whether this is a newly-created
/// entity or a later update to one it may already know about).
struct Record {
    data: Value,
    seq: i64,
    first_seq: i64,
}

#[derive(Default)]
pub struct ServerDataset {
    prompts: HashMap<String, Record>,
    prompt_versions: HashMap<String, Record>,
    groups: HashMap<String, Record>,
    next_seq: i64,
}

impl ServerDataset {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, kind: EntityKind) -> &HashMap<String, Record> {
        match kind {
            EntityKind::Prompt => &self.prompts,
            EntityKind::PromptVersion => &self.prompt_versions,
            EntityKind::Group => &self.groups,
        }
    }

    fn table_mut(&mut self, kind: EntityKind) -> &mut HashMap<String, Record> {
        match kind {
            EntityKind::Prompt => &mut self.prompts,
            EntityKind::PromptVersion => &mut self.prompt_versions,
            EntityKind::Group => &mut self.groups,
        }
    }

    fn bump_seq(&mut self) -> i64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// The cursor a fresh pull with `lastSyncId: 0` would need to reach the
    /// latest state; also what a mutation batch reports back to the client.
    pub fn latest_seq(&self) -> i64 {
        self.next_seq
    }

    /// Applies one mutation (create/update/delete), entity-level
    /// last-writer-wins: the client always submits the full merged entity
    /// on create/update, so the server simply replaces the stored value.
    ///
    /// An unrecognized `entity_type` yields a per-mutation failure rather
    /// than rejecting the batch — `apply_mutation` is only ever reached
    /// after `WireMutation` has already deserialized successfully, since
    /// its `entity_type` is a raw string precisely so that this check can
    /// happen here.
    pub fn apply_mutation(&mut self, mutation: &WireMutation) -> MutationResult {
        let Some(kind) = EntityKind::parse(&mutation.entity_type) else {
            return MutationResult {
                mutation_id: mutation.id.clone(),
                success: false,
                entity: None,
                error: Some(format!("unknown entity kind: {}", mutation.entity_type)),
            };
        };

        match mutation.operation {
            MutationOp::Create | MutationOp::Update => {
                let Some(mut payload) = mutation.payload.clone() else {
                    return MutationResult {
                        mutation_id: mutation.id.clone(),
                        success: false,
                        entity: None,
                        error: Some("create/update mutation missing payload".to_string()),
                    };
                };

                let seq = self.bump_seq();
                if let Some(obj) = payload.as_object_mut() {
                    obj.insert("syncId".to_string(), Value::from(seq));
                }
                let first_seq = self
                    .table(kind)
                    .get(&mutation.entity_id)
                    .map(|r| r.first_seq)
                    .unwrap_or(seq);

                self.table_mut(kind).insert(
                    mutation.entity_id.clone(),
                    Record { data: payload.clone(), seq, first_seq },
                );

                MutationResult {
                    mutation_id: mutation.id.clone(),
                    success: true,
                    entity: Some(payload),
                    error: None,
                }
            }
            MutationOp::Delete => {
                let seq = self.bump_seq();
                if let Some(record) = self.table_mut(kind).get_mut(&mutation.entity_id) {
                    if let Some(obj) = record.data.as_object_mut() {
                        obj.insert("isDeleted".to_string(), Value::Bool(true));
                        obj.insert("syncId".to_string(), Value::from(seq));
                    }
                    record.seq = seq;
                }
                // Deleting an id the server never saw is treated as an
                // already-satisfied delete, not a failure — idempotent,
                // matching the view layer's "missing entity" semantics.
                MutationResult {
                    mutation_id: mutation.id.clone(),
                    success: true,
                    entity: None,
                    error: None,
                }
            }
        }
    }

    /// Net changes since `cursor`, ordered globally by sequence and capped
    /// at `limit`; returns `(changes, has_more, new_cursor)`. When nothing
    /// has changed since `cursor` (including a cursor ahead of the
    /// server's own latest), `new_cursor` echoes `cursor` unchanged rather
    /// than reporting the server's actual latest, so the cursor never
    /// appears to move without a corresponding change.
    pub fn changes_since(&self, cursor: i64, limit: u32) -> (ChangeSet, bool, i64) {
        let mut selected: Vec<(i64, EntityKind, &str)> = Vec::new();
        for (kind, table) in [
            (EntityKind::Prompt, &self.prompts),
            (EntityKind::PromptVersion, &self.prompt_versions),
            (EntityKind::Group, &self.groups),
        ] {
            for (id, record) in table {
                if record.seq > cursor {
                    selected.push((record.seq, kind, id.as_str()));
                }
            }
        }
        selected.sort_by_key(|(seq, _, _)| *seq);

        let total = selected.len();
        let limit = limit.max(1) as usize;
        let truncated = &selected[..total.min(limit)];
        let has_more = total > truncated.len();
        let new_cursor = truncated.last().map(|(seq, _, _)| *seq).unwrap_or(cursor);

        let mut changes = ChangeSet::default();
        for (_, kind, id) in truncated {
            match kind {
                EntityKind::Prompt => push_change(&mut changes.prompts, self.prompts.get(*id).unwrap(), cursor),
                EntityKind::PromptVersion => {
                    push_change(&mut changes.prompt_versions, self.prompt_versions.get(*id).unwrap(), cursor)
                }
                EntityKind::Group => push_change(&mut changes.groups, self.groups.get(*id).unwrap(), cursor),
            }
        }

        (changes, has_more, new_cursor)
    }
}

fn push_change<T: serde::de::DeserializeOwned>(changes: &mut KindChanges<T>, record: &Record, cursor: i64) {
    let deleted = record
        .data
        .get("isDeleted")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if deleted {
        if let Some(id) = record.data.get("id").and_then(Value::as_str) {
            changes.deleted.push(id.to_string());
        }
        return;
    }

    let entity = serde_json::from_value(record.data.clone()).expect("dataset entries always match their kind's type");
    if record.first_seq > cursor {
        changes.created.push(entity);
    } else {
        changes.updated.push(entity);
    }
}
