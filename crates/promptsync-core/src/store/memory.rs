//! `MemoryStore` — a pure in-memory `DurableStore` (locked `HashMap`s, no
//! inner backend to flush to). Used in unit tests and anywhere a caller
//! wants the store semantics without a SQLite file.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

use crate::entity::EntityKind;
use crate::error::StoreResult;
use crate::sync::types::{KindChanges, MetaPatch, PendingMutation, SyncMetadata};

use super::{DeltaBatch, DurableStore, MutationPatch};

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<EntityKind, HashMap<String, Value>>>,
    mutations: Mutex<HashMap<String, PendingMutation>>,
    meta: Mutex<SyncMetadata>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_kind_changes(
        &self,
        kind: EntityKind,
        changes: &KindChanges<Value>,
        records: &mut HashMap<EntityKind, HashMap<String, Value>>,
    ) {
        let col = records.entry(kind).or_default();
        for entity in changes.created.iter().chain(changes.updated.iter()) {
            if let Some(id) = entity.get("id").and_then(Value::as_str) {
                col.insert(id.to_string(), entity.clone());
            }
        }
        for id in &changes.deleted {
            if let Some(existing) = col.get_mut(id) {
                if let Some(obj) = existing.as_object_mut() {
                    obj.insert("isDeleted".to_string(), Value::Bool(true));
                }
            }
        }
    }
}

impl DurableStore for MemoryStore {
    fn put(&self, kind: EntityKind, id: &str, entity: Value) -> StoreResult<()> {
        self.records
            .lock()
            .entry(kind)
            .or_default()
            .insert(id.to_string(), entity);
        Ok(())
    }

    fn bulk_put(&self, kind: EntityKind, entities: Vec<Value>) -> StoreResult<()> {
        let mut records = self.records.lock();
        let col = records.entry(kind).or_default();
        for entity in entities {
            if let Some(id) = entity.get("id").and_then(Value::as_str) {
                col.insert(id.to_string(), entity);
            }
        }
        Ok(())
    }

    fn update(&self, kind: EntityKind, id: &str, patch: Value) -> StoreResult<()> {
        let mut records = self.records.lock();
        if let Some(col) = records.get_mut(&kind) {
            if let Some(existing) = col.get_mut(id) {
                if let (Some(existing_obj), Some(patch_obj)) =
                    (existing.as_object_mut(), patch.as_object())
                {
                    for (k, v) in patch_obj {
                        existing_obj.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        Ok(())
    }

    fn get(&self, kind: EntityKind, id: &str) -> StoreResult<Option<Value>> {
        Ok(self
            .records
            .lock()
            .get(&kind)
            .and_then(|col| col.get(id))
            .cloned())
    }

    fn active_of(&self, kind: EntityKind) -> StoreResult<Vec<Value>> {
        Ok(self
            .records
            .lock()
            .get(&kind)
            .map(|col| {
                col.values()
                    .filter(|v| !v.get("isDeleted").and_then(Value::as_bool).unwrap_or(false))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn versions_of(&self, prompt_id: &str) -> StoreResult<Vec<Value>> {
        Ok(self
            .records
            .lock()
            .get(&EntityKind::PromptVersion)
            .map(|col| {
                col.values()
                    .filter(|v| {
                        !v.get("isDeleted").and_then(Value::as_bool).unwrap_or(false)
                            && v.get("promptId").and_then(Value::as_str) == Some(prompt_id)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn enqueue_mutation(&self, m: PendingMutation) -> StoreResult<()> {
        self.mutations.lock().insert(m.id.clone(), m);
        Ok(())
    }

    fn dequeue_mutation(&self, id: &str) -> StoreResult<()> {
        self.mutations.lock().remove(id);
        Ok(())
    }

    fn update_mutation(&self, id: &str, patch: MutationPatch) -> StoreResult<()> {
        if let Some(m) = self.mutations.lock().get_mut(id) {
            if let Some(retry_count) = patch.retry_count {
                m.retry_count = retry_count;
            }
            if let Some(last_error) = patch.last_error {
                m.last_error = last_error;
            }
        }
        Ok(())
    }

    fn drain_ordered(&self) -> StoreResult<Vec<PendingMutation>> {
        let mut all: Vec<PendingMutation> = self.mutations.lock().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    fn read_meta(&self) -> StoreResult<SyncMetadata> {
        Ok(self.meta.lock().clone())
    }

    fn write_meta(&self, patch: MetaPatch) -> StoreResult<()> {
        let mut meta = self.meta.lock();
        if let Some(last_sync_id) = patch.last_sync_id {
            meta.last_sync_id = last_sync_id;
        }
        if let Some(last_synced_at) = patch.last_synced_at {
            meta.last_synced_at = Some(last_synced_at);
        }
        if let Some(client_id) = patch.client_id {
            meta.client_id = Some(client_id);
        }
        Ok(())
    }

    fn apply_deltas(&self, batch: DeltaBatch) -> StoreResult<()> {
        let mut records = self.records.lock();
        self.apply_kind_changes(EntityKind::Prompt, &batch.prompts, &mut records);
        self.apply_kind_changes(EntityKind::PromptVersion, &batch.prompt_versions, &mut records);
        self.apply_kind_changes(EntityKind::Group, &batch.groups, &mut records);
        drop(records);
        self.write_meta(batch.meta)
    }

    fn clear_all(&self) -> StoreResult<()> {
        self.records.lock().clear();
        self.mutations.lock().clear();
        *self.meta.lock() = SyncMetadata::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn prompt(id: &str) -> Value {
        json!({ "id": id, "title": "t", "content": "c", "category": "", "isFavorite": false, "createdAt": "2024-01-01T00:00:00Z", "updatedAt": "2024-01-01T00:00:00Z" })
    }

    #[test]
    fn put_and_get_roundtrip() {
        let store = MemoryStore::new();
        store.put(EntityKind::Prompt, "p1", prompt("p1")).unwrap();
        let got = store.get(EntityKind::Prompt, "p1").unwrap();
        assert_eq!(got.unwrap()["id"], json!("p1"));
    }

    #[test]
    fn active_of_excludes_soft_deleted() {
        let store = MemoryStore::new();
        store.put(EntityKind::Prompt, "p1", prompt("p1")).unwrap();
        let mut deleted = prompt("p2");
        deleted["isDeleted"] = json!(true);
        store.put(EntityKind::Prompt, "p2", deleted).unwrap();

        let active = store.active_of(EntityKind::Prompt).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0]["id"], json!("p1"));
    }

    #[test]
    fn update_merges_without_touching_other_fields() {
        let store = MemoryStore::new();
        store.put(EntityKind::Prompt, "p1", prompt("p1")).unwrap();
        store
            .update(EntityKind::Prompt, "p1", json!({ "title": "new title" }))
            .unwrap();

        let got = store.get(EntityKind::Prompt, "p1").unwrap().unwrap();
        assert_eq!(got["title"], json!("new title"));
        assert_eq!(got["content"], json!("c"));
    }

    #[test]
    fn update_missing_is_noop() {
        let store = MemoryStore::new();
        store.update(EntityKind::Prompt, "nope", json!({ "title": "x" })).unwrap();
        assert!(store.get(EntityKind::Prompt, "nope").unwrap().is_none());
    }

    #[test]
    fn drain_ordered_is_fifo_by_created_at() {
        let store = MemoryStore::new();
        let mk = |id: &str, ts: &str| PendingMutation {
            id: id.to_string(),
            operation: crate::sync::types::MutationOp::Create,
            entity_type: EntityKind::Prompt,
            entity_id: id.to_string(),
            payload: None,
            created_at: ts.to_string(),
            retry_count: 0,
            last_error: None,
        };
        store.enqueue_mutation(mk("m2", "2024-01-02T00:00:00Z")).unwrap();
        store.enqueue_mutation(mk("m1", "2024-01-01T00:00:00Z")).unwrap();

        let drained = store.drain_ordered().unwrap();
        assert_eq!(drained[0].id, "m1");
        assert_eq!(drained[1].id, "m2");
    }

    #[test]
    fn apply_deltas_never_rewinds_cursor_below_request() {
        let store = MemoryStore::new();
        store
            .apply_deltas(DeltaBatch {
                meta: MetaPatch {
                    last_sync_id: Some(5),
                    last_synced_at: Some("2024-01-01T00:00:00Z".to_string()),
                    client_id: None,
                },
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store.read_meta().unwrap().last_sync_id, 5);
    }

    #[test]
    fn server_delete_sets_flag_but_does_not_remove_record() {
        let store = MemoryStore::new();
        store.put(EntityKind::Prompt, "p1", prompt("p1")).unwrap();

        store
            .apply_deltas(DeltaBatch {
                prompts: KindChanges {
                    created: vec![],
                    updated: vec![],
                    deleted: vec!["p1".to_string()],
                },
                ..Default::default()
            })
            .unwrap();

        let got = store.get(EntityKind::Prompt, "p1").unwrap().unwrap();
        assert_eq!(got["isDeleted"], json!(true));
        assert!(store.active_of(EntityKind::Prompt).unwrap().is_empty());
    }

    #[test]
    fn delete_for_unknown_id_is_skipped() {
        let store = MemoryStore::new();
        store
            .apply_deltas(DeltaBatch {
                prompts: KindChanges {
                    created: vec![],
                    updated: vec![],
                    deleted: vec!["ghost".to_string()],
                },
                ..Default::default()
            })
            .unwrap();
        assert!(store.get(EntityKind::Prompt, "ghost").unwrap().is_none());
    }
}
