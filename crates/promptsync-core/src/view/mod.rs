//! The projected view: an in-memory projection over the durable store,
//! read via snapshots and a `tokio::sync::watch` channel, written through
//! by the mutation operations the presentation layer calls. Uses a
//! `watch` channel for snapshot delivery since this crate already depends
//! on `tokio` for the sync engine.

mod snapshot;

pub use snapshot::ViewSnapshot;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{error, warn};

use crate::entity::{
    new_id, now_iso8601, to_value, EntityKind, Envelope, Group, GroupFields, Prompt, PromptFields,
    PromptVersion, PromptVersionFields,
};
use crate::store::{DeltaBatch, DurableStore, MutationPatch};
use crate::sync::types::{
    MetaPatch, MutationOp, PendingMutation, SyncResponse, SyncStatus,
};

pub struct ProjectedView {
    store: Arc<dyn DurableStore>,
    tx: watch::Sender<ViewSnapshot>,
    rx: watch::Receiver<ViewSnapshot>,
}

impl ProjectedView {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        let (tx, rx) = watch::channel(ViewSnapshot::default());
        Self { store, tx, rx }
    }

    /// A receiver that yields the latest snapshot whenever the view
    /// changes — any selection is applied by the caller to the delivered
    /// `ViewSnapshot`.
    pub fn subscribe(&self) -> watch::Receiver<ViewSnapshot> {
        self.tx.subscribe()
    }

    /// The current snapshot, read synchronously without waiting for a change.
    pub fn snapshot(&self) -> ViewSnapshot {
        self.rx.borrow().clone()
    }

    fn publish(&self, mutator: impl FnOnce(&mut ViewSnapshot)) {
        self.tx.send_modify(mutator);
    }

    // ------------------------------------------------------------------
    // hydrate
    // ------------------------------------------------------------------

    /// Populate the view from the durable store. Returns once the view
    /// reflects the store's contents (or is marked ready with empty
    /// contents if the store can't be read).
    pub fn hydrate(&self) {
        let prompts = self.load_kind::<Prompt>(EntityKind::Prompt);
        let groups = self.load_kind::<Group>(EntityKind::Group);
        let versions = self.load_kind::<PromptVersion>(EntityKind::PromptVersion);
        let pending_count = self.store.drain_ordered().map(|m| m.len()).unwrap_or_else(|e| {
            error!(error = %e, "failed to read pending mutations during hydrate");
            0
        });
        let meta = self.store.read_meta().unwrap_or_else(|e| {
            error!(error = %e, "failed to read sync metadata during hydrate");
            Default::default()
        });

        self.publish(|snap| {
            snap.prompts = prompts;
            snap.groups = groups;
            snap.prompt_versions = versions;
            snap.pending_count = pending_count;
            snap.last_sync_id = meta.last_sync_id;
            snap.ready = true;
        });
    }

    fn load_kind<T>(&self, kind: EntityKind) -> HashMap<String, T>
    where
        T: Envelope + for<'de> serde::Deserialize<'de>,
    {
        match self.store.active_of(kind) {
            Ok(values) => values
                .into_iter()
                .filter_map(|v| match serde_json::from_value::<T>(v) {
                    Ok(entity) => Some((entity.id().to_string(), entity)),
                    Err(e) => {
                        warn!(error = %e, kind = %kind, "dropping malformed record during hydrate");
                        None
                    }
                })
                .collect(),
            Err(e) => {
                error!(error = %e, kind = %kind, "failed to read durable store during hydrate; starting empty");
                HashMap::new()
            }
        }
    }

    // ------------------------------------------------------------------
    // Public mutation operations
    // ------------------------------------------------------------------

    pub fn create_prompt(&self, fields: PromptFields) -> Prompt {
        let now = now_iso8601();
        let prompt = Prompt {
            id: new_id(),
            title: fields.title.unwrap_or_default(),
            content: fields.content.unwrap_or_default(),
            category: fields.category.unwrap_or_default(),
            is_favorite: fields.is_favorite.unwrap_or(false),
            group_id: fields.group_id.flatten(),
            created_at: now.clone(),
            updated_at: now.clone(),
            sync_id: None,
            is_deleted: false,
        };

        self.publish(|snap| {
            snap.prompts.insert(prompt.id.clone(), prompt.clone());
            snap.pending_count += 1;
        });
        self.persist_put(EntityKind::Prompt, &prompt);
        self.enqueue(MutationOp::Create, EntityKind::Prompt, &prompt.id, Some(to_value(&prompt)), &now);

        prompt
    }

    pub fn update_prompt(&self, id: &str, patch: PromptFields) {
        let now = now_iso8601();
        let Some(updated) = self.mutate_snapshot(|snap| {
            let prompt = snap.prompts.get_mut(id)?;
            if let Some(v) = patch.title {
                prompt.title = v;
            }
            if let Some(v) = patch.content {
                prompt.content = v;
            }
            if let Some(v) = patch.category {
                prompt.category = v;
            }
            if let Some(v) = patch.is_favorite {
                prompt.is_favorite = v;
            }
            if let Some(v) = patch.group_id {
                prompt.group_id = v;
            }
            prompt.set_updated_at(now.clone());
            snap.pending_count += 1;
            Some(prompt.clone())
        }) else {
            return;
        };

        self.persist_put(EntityKind::Prompt, &updated);
        self.enqueue(MutationOp::Update, EntityKind::Prompt, id, Some(to_value(&updated)), &now);
    }

    pub fn delete_prompt(&self, id: &str) {
        let now = now_iso8601();
        let Some(_) = self.mutate_snapshot(|snap| {
            let prompt = snap.prompts.get_mut(id)?;
            prompt.set_deleted(true);
            prompt.set_updated_at(now.clone());
            snap.pending_count += 1;
            Some(())
        }) else {
            return;
        };

        if let Some(prompt) = self.snapshot().prompts.get(id).cloned() {
            self.persist_put(EntityKind::Prompt, &prompt);
        }
        self.enqueue(MutationOp::Delete, EntityKind::Prompt, id, None, &now);
    }

    pub fn create_group(&self, fields: GroupFields) -> Group {
        let now = now_iso8601();
        let group = Group {
            id: new_id(),
            name: fields.name.unwrap_or_default(),
            color: fields.color.unwrap_or_default(),
            created_at: now.clone(),
            updated_at: now.clone(),
            sync_id: None,
            is_deleted: false,
        };

        self.publish(|snap| {
            snap.groups.insert(group.id.clone(), group.clone());
            snap.pending_count += 1;
        });
        self.persist_put(EntityKind::Group, &group);
        self.enqueue(MutationOp::Create, EntityKind::Group, &group.id, Some(to_value(&group)), &now);

        group
    }

    pub fn update_group(&self, id: &str, patch: GroupFields) {
        let now = now_iso8601();
        let Some(updated) = self.mutate_snapshot(|snap| {
            let group = snap.groups.get_mut(id)?;
            if let Some(v) = patch.name {
                group.name = v;
            }
            if let Some(v) = patch.color {
                group.color = v;
            }
            group.set_updated_at(now.clone());
            snap.pending_count += 1;
            Some(group.clone())
        }) else {
            return;
        };

        self.persist_put(EntityKind::Group, &updated);
        self.enqueue(MutationOp::Update, EntityKind::Group, id, Some(to_value(&updated)), &now);
    }

    pub fn delete_group(&self, id: &str) {
        let now = now_iso8601();
        let Some(_) = self.mutate_snapshot(|snap| {
            let group = snap.groups.get_mut(id)?;
            group.set_deleted(true);
            group.set_updated_at(now.clone());
            snap.pending_count += 1;
            Some(())
        }) else {
            return;
        };

        if let Some(group) = self.snapshot().groups.get(id).cloned() {
            self.persist_put(EntityKind::Group, &group);
        }
        self.enqueue(MutationOp::Delete, EntityKind::Group, id, None, &now);
    }

    pub fn create_prompt_version(&self, fields: PromptVersionFields) -> PromptVersion {
        let now = now_iso8601();
        let version = PromptVersion {
            id: new_id(),
            prompt_id: fields.prompt_id.unwrap_or_default(),
            content: fields.content.unwrap_or_default(),
            note: fields.note.flatten(),
            created_at: now.clone(),
            updated_at: now.clone(),
            sync_id: None,
            is_deleted: false,
        };

        self.publish(|snap| {
            snap.prompt_versions.insert(version.id.clone(), version.clone());
            snap.pending_count += 1;
        });
        self.persist_put(EntityKind::PromptVersion, &version);
        self.enqueue(
            MutationOp::Create,
            EntityKind::PromptVersion,
            &version.id,
            Some(to_value(&version)),
            &now,
        );

        version
    }

    /// Runs `f` against a mutable clone-on-write snapshot, publishing the
    /// result iff `f` returns `Some`. Returns `f`'s result.
    fn mutate_snapshot<T>(&self, f: impl FnOnce(&mut ViewSnapshot) -> Option<T>) -> Option<T>
    where
        T: Clone,
    {
        let mut result = None;
        self.tx.send_if_modified(|snap| {
            result = f(snap);
            result.is_some()
        });
        result
    }

    fn persist_put<T: Envelope + serde::Serialize>(&self, kind: EntityKind, entity: &T) {
        if let Err(e) = self.store.put(kind, entity.id(), to_value(entity)) {
            error!(error = %e, kind = %kind, "durable store write failed; view stays optimistic");
        }
    }

    fn enqueue(&self, operation: MutationOp, entity_type: EntityKind, entity_id: &str, payload: Option<Value>, now: &str) {
        let mutation = PendingMutation {
            id: new_id(),
            operation,
            entity_type,
            entity_id: entity_id.to_string(),
            payload,
            created_at: now.to_string(),
            retry_count: 0,
            last_error: None,
        };
        if let Err(e) = self.store.enqueue_mutation(mutation) {
            error!(error = %e, "failed to persist pending mutation");
        }
    }

    // ------------------------------------------------------------------
    // Internal operations invoked only by the sync engine
    // ------------------------------------------------------------------

    /// Overwrites entities from `created`/`updated` (server wins), sets the
    /// soft-deleted flag for each id in `deleted`, advances the metadata
    /// cursor, and mirrors the change into the durable store — all inside
    /// one packet-granularity critical section.
    pub fn apply_server_changes(&self, packet: &SyncResponse) {
        // Computed once inside the critical section and reused for the
        // durable-store patch below, so the in-memory cursor and the
        // persisted one can never disagree about whether this packet
        // advanced it.
        let mut next_sync_id = packet.sync_id;

        self.publish(|snap| {
            apply_kind::<Prompt>(&mut snap.prompts, &packet.changes.prompts);
            apply_kind::<PromptVersion>(&mut snap.prompt_versions, &packet.changes.prompt_versions);
            apply_kind::<Group>(&mut snap.groups, &packet.changes.groups);
            next_sync_id = packet.sync_id.max(snap.last_sync_id);
            snap.last_sync_id = next_sync_id;
        });

        let batch = DeltaBatch {
            prompts: to_raw_kind_changes(&packet.changes.prompts),
            prompt_versions: to_raw_kind_changes(&packet.changes.prompt_versions),
            groups: to_raw_kind_changes(&packet.changes.groups),
            meta: MetaPatch {
                last_sync_id: Some(next_sync_id),
                last_synced_at: Some(packet.timestamp.clone()),
                client_id: None,
            },
        };
        if let Err(e) = self.store.apply_deltas(batch) {
            error!(error = %e, "failed to persist pull delta; view stays ahead of store until next pull");
        }
    }

    pub fn update_sync_status(&self, status: SyncStatus) {
        self.publish(|snap| snap.status = status);
    }

    pub fn remove_pending_mutation(&self, mutation_id: &str) {
        if let Err(e) = self.store.dequeue_mutation(mutation_id) {
            error!(error = %e, "failed to dequeue acknowledged mutation");
        }
        self.publish(|snap| {
            snap.pending_count = snap.pending_count.saturating_sub(1);
        });
    }

    pub fn record_mutation_retry(&self, mutation_id: &str, error: String) {
        if let Err(e) = self.store.update_mutation(
            mutation_id,
            MutationPatch {
                retry_count: None,
                last_error: Some(Some(error)),
            },
        ) {
            error!(error = %e, "failed to record mutation retry");
        }
    }

    pub fn bump_mutation_retry(&self, mutation_id: &str, retry_count: u32, error: String) {
        if let Err(e) = self.store.update_mutation(
            mutation_id,
            MutationPatch {
                retry_count: Some(retry_count),
                last_error: Some(Some(error)),
            },
        ) {
            error!(error = %e, "failed to bump mutation retry count");
        }
    }
}

fn apply_kind<T>(map: &mut HashMap<String, T>, changes: &crate::sync::types::KindChanges<T>)
where
    T: Envelope + Clone,
{
    for entity in changes.created.iter().chain(changes.updated.iter()) {
        map.insert(entity.id().to_string(), entity.clone());
    }
    for id in &changes.deleted {
        if let Some(entity) = map.get_mut(id) {
            entity.set_deleted(true);
        }
    }
}

fn to_raw_kind_changes<T: serde::Serialize>(changes: &crate::sync::types::KindChanges<T>) -> crate::sync::types::KindChanges<Value> {
    crate::sync::types::KindChanges {
        created: changes.created.iter().map(to_value).collect(),
        updated: changes.updated.iter().map(to_value).collect(),
        deleted: changes.deleted.clone(),
    }
}
