//! `SqliteStore` — the production `DurableStore`, backed by `rusqlite`
//! (`bundled` feature). Each entity kind gets a table with a JSON `data`
//! column plus the indexed columns its queries need, specialized per-kind
//! since this crate has exactly three fixed kinds rather than a
//! user-defined schema.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::entity::EntityKind;
use crate::error::StoreResult;
use crate::sync::types::{KindChanges, MetaPatch, MutationOp, PendingMutation, SyncMetadata};

use super::{DeltaBatch, DurableStore, MutationPatch};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn table_name(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Prompt => "prompts",
        EntityKind::PromptVersion => "prompt_versions",
        EntityKind::Group => "groups",
    }
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        Self::initialize(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn initialize(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS prompts (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0,
                group_id TEXT
            );
            CREATE TABLE IF NOT EXISTS prompt_versions (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0,
                prompt_id TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_prompt_versions_prompt_id ON prompt_versions(prompt_id);
            CREATE TABLE IF NOT EXISTS groups (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS pending_mutations (
                id TEXT PRIMARY KEY,
                operation TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                payload TEXT,
                created_at TEXT NOT NULL,
                retry_count INTEGER NOT NULL,
                last_error TEXT
            );
            CREATE TABLE IF NOT EXISTS sync_metadata (
                key TEXT PRIMARY KEY,
                last_sync_id INTEGER NOT NULL DEFAULT 0,
                last_synced_at TEXT,
                client_id TEXT
            );
            ",
        )?;
        Ok(())
    }

    fn put_tx(tx: &Connection, kind: EntityKind, id: &str, entity: &Value) -> StoreResult<()> {
        let deleted = entity
            .get("isDeleted")
            .and_then(Value::as_bool)
            .unwrap_or(false) as i64;
        let data = serde_json::to_string(entity)?;

        match kind {
            EntityKind::Prompt => {
                let group_id = entity.get("groupId").and_then(Value::as_str);
                tx.execute(
                    "INSERT INTO prompts (id, data, deleted, group_id) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET data = excluded.data, deleted = excluded.deleted, group_id = excluded.group_id",
                    params![id, data, deleted, group_id],
                )?;
            }
            EntityKind::PromptVersion => {
                let prompt_id = entity.get("promptId").and_then(Value::as_str);
                tx.execute(
                    "INSERT INTO prompt_versions (id, data, deleted, prompt_id) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET data = excluded.data, deleted = excluded.deleted, prompt_id = excluded.prompt_id",
                    params![id, data, deleted, prompt_id],
                )?;
            }
            EntityKind::Group => {
                tx.execute(
                    "INSERT INTO groups (id, data, deleted) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET data = excluded.data, deleted = excluded.deleted",
                    params![id, data, deleted],
                )?;
            }
        }
        Ok(())
    }

    fn get_tx(tx: &Connection, kind: EntityKind, id: &str) -> StoreResult<Option<Value>> {
        let sql = format!("SELECT data FROM {} WHERE id = ?1", table_name(kind));
        let data: Option<String> = tx
            .query_row(&sql, params![id], |row| row.get(0))
            .optional()?;
        Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    fn set_deleted_tx(tx: &Connection, kind: EntityKind, id: &str) -> StoreResult<()> {
        let Some(mut existing) = Self::get_tx(tx, kind, id)? else {
            return Ok(());
        };
        if let Some(obj) = existing.as_object_mut() {
            obj.insert("isDeleted".to_string(), Value::Bool(true));
        }
        Self::put_tx(tx, kind, id, &existing)
    }

    fn write_meta_tx(tx: &Connection, patch: &MetaPatch) -> StoreResult<()> {
        tx.execute(
            "INSERT INTO sync_metadata (key, last_sync_id, last_synced_at, client_id) VALUES ('sync_metadata', 0, NULL, NULL)
             ON CONFLICT(key) DO NOTHING",
            [],
        )?;
        if let Some(last_sync_id) = patch.last_sync_id {
            tx.execute(
                "UPDATE sync_metadata SET last_sync_id = ?1 WHERE key = 'sync_metadata'",
                params![last_sync_id],
            )?;
        }
        if let Some(ref last_synced_at) = patch.last_synced_at {
            tx.execute(
                "UPDATE sync_metadata SET last_synced_at = ?1 WHERE key = 'sync_metadata'",
                params![last_synced_at],
            )?;
        }
        if let Some(ref client_id) = patch.client_id {
            tx.execute(
                "UPDATE sync_metadata SET client_id = ?1 WHERE key = 'sync_metadata'",
                params![client_id],
            )?;
        }
        Ok(())
    }
}

impl DurableStore for SqliteStore {
    fn put(&self, kind: EntityKind, id: &str, entity: Value) -> StoreResult<()> {
        let conn = self.conn.lock();
        Self::put_tx(&conn, kind, id, &entity)
    }

    fn bulk_put(&self, kind: EntityKind, entities: Vec<Value>) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for entity in &entities {
            if let Some(id) = entity.get("id").and_then(Value::as_str) {
                Self::put_tx(&tx, kind, id, entity)?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn update(&self, kind: EntityKind, id: &str, patch: Value) -> StoreResult<()> {
        let conn = self.conn.lock();
        let Some(mut existing) = Self::get_tx(&conn, kind, id)? else {
            return Ok(());
        };
        if let (Some(existing_obj), Some(patch_obj)) = (existing.as_object_mut(), patch.as_object()) {
            for (k, v) in patch_obj {
                existing_obj.insert(k.clone(), v.clone());
            }
        }
        Self::put_tx(&conn, kind, id, &existing)
    }

    fn get(&self, kind: EntityKind, id: &str) -> StoreResult<Option<Value>> {
        let conn = self.conn.lock();
        Self::get_tx(&conn, kind, id)
    }

    fn active_of(&self, kind: EntityKind) -> StoreResult<Vec<Value>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT data FROM {} WHERE deleted = 0", table_name(kind));
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    fn versions_of(&self, prompt_id: &str) -> StoreResult<Vec<Value>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT data FROM prompt_versions WHERE deleted = 0 AND prompt_id = ?1",
        )?;
        let rows = stmt.query_map(params![prompt_id], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    fn enqueue_mutation(&self, m: PendingMutation) -> StoreResult<()> {
        let conn = self.conn.lock();
        let payload = m.payload.as_ref().map(serde_json::to_string).transpose()?;
        conn.execute(
            "INSERT INTO pending_mutations (id, operation, entity_type, entity_id, payload, created_at, retry_count, last_error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET operation = excluded.operation, entity_type = excluded.entity_type,
                entity_id = excluded.entity_id, payload = excluded.payload, created_at = excluded.created_at,
                retry_count = excluded.retry_count, last_error = excluded.last_error",
            params![
                m.id,
                mutation_op_str(m.operation),
                m.entity_type.as_str(),
                m.entity_id,
                payload,
                m.created_at,
                m.retry_count,
                m.last_error,
            ],
        )?;
        Ok(())
    }

    fn dequeue_mutation(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM pending_mutations WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn update_mutation(&self, id: &str, patch: MutationPatch) -> StoreResult<()> {
        let conn = self.conn.lock();
        if let Some(retry_count) = patch.retry_count {
            conn.execute(
                "UPDATE pending_mutations SET retry_count = ?1 WHERE id = ?2",
                params![retry_count, id],
            )?;
        }
        if let Some(last_error) = patch.last_error {
            conn.execute(
                "UPDATE pending_mutations SET last_error = ?1 WHERE id = ?2",
                params![last_error, id],
            )?;
        }
        Ok(())
    }

    fn drain_ordered(&self) -> StoreResult<Vec<PendingMutation>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, operation, entity_type, entity_id, payload, created_at, retry_count, last_error
             FROM pending_mutations ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let operation: String = row.get(1)?;
            let entity_type: String = row.get(2)?;
            let payload: Option<String> = row.get(4)?;
            Ok((
                row.get::<_, String>(0)?,
                operation,
                entity_type,
                row.get::<_, String>(3)?,
                payload,
                row.get::<_, String>(5)?,
                row.get::<_, u32>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, operation, entity_type, entity_id, payload, created_at, retry_count, last_error) = row?;
            out.push(PendingMutation {
                id,
                operation: mutation_op_from_str(&operation),
                entity_type: entity_kind_from_str(&entity_type),
                entity_id,
                payload: payload.map(|p| serde_json::from_str(&p)).transpose()?,
                created_at,
                retry_count,
                last_error,
            });
        }
        Ok(out)
    }

    fn read_meta(&self) -> StoreResult<SyncMetadata> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT last_sync_id, last_synced_at, client_id FROM sync_metadata WHERE key = 'sync_metadata'",
                [],
                |row| {
                    Ok(SyncMetadata {
                        last_sync_id: row.get(0)?,
                        last_synced_at: row.get(1)?,
                        client_id: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row.unwrap_or_default())
    }

    fn write_meta(&self, patch: MetaPatch) -> StoreResult<()> {
        let conn = self.conn.lock();
        Self::write_meta_tx(&conn, &patch)
    }

    fn apply_deltas(&self, batch: DeltaBatch) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        apply_kind_changes_tx(&tx, EntityKind::Prompt, &batch.prompts)?;
        apply_kind_changes_tx(&tx, EntityKind::PromptVersion, &batch.prompt_versions)?;
        apply_kind_changes_tx(&tx, EntityKind::Group, &batch.groups)?;
        Self::write_meta_tx(&tx, &batch.meta)?;
        tx.commit()?;
        Ok(())
    }

    fn clear_all(&self) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "DELETE FROM prompts; DELETE FROM prompt_versions; DELETE FROM groups;
             DELETE FROM pending_mutations; DELETE FROM sync_metadata;",
        )?;
        Ok(())
    }
}

fn apply_kind_changes_tx(tx: &Connection, kind: EntityKind, changes: &KindChanges<Value>) -> StoreResult<()> {
    for entity in changes.created.iter().chain(changes.updated.iter()) {
        if let Some(id) = entity.get("id").and_then(Value::as_str) {
            SqliteStore::put_tx(tx, kind, id, entity)?;
        }
    }
    for id in &changes.deleted {
        SqliteStore::set_deleted_tx(tx, kind, id)?;
    }
    Ok(())
}

fn mutation_op_str(op: MutationOp) -> &'static str {
    match op {
        MutationOp::Create => "create",
        MutationOp::Update => "update",
        MutationOp::Delete => "delete",
    }
}

fn mutation_op_from_str(s: &str) -> MutationOp {
    match s {
        "update" => MutationOp::Update,
        "delete" => MutationOp::Delete,
        _ => MutationOp::Create,
    }
}

fn entity_kind_from_str(s: &str) -> EntityKind {
    match s {
        "prompt_version" => EntityKind::PromptVersion,
        "group" => EntityKind::Group,
        _ => EntityKind::Prompt,
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
        let store = SqliteStore::open_in_memory().unwrap();
        store.put(EntityKind::Prompt, "p1", prompt("p1")).unwrap();
        let got = store.get(EntityKind::Prompt, "p1").unwrap().unwrap();
        assert_eq!(got["id"], json!("p1"));
    }

    #[test]
    fn survives_a_fresh_connection_to_the_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.sqlite3");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.put(EntityKind::Prompt, "p1", prompt("p1")).unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        let got = reopened.get(EntityKind::Prompt, "p1").unwrap();
        assert!(got.is_some());
    }

    #[test]
    fn versions_of_filters_by_prompt_id_and_excludes_deleted() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .put(
                EntityKind::PromptVersion,
                "v1",
                json!({ "id": "v1", "promptId": "p1", "content": "c1", "createdAt": "2024-01-01T00:00:00Z", "updatedAt": "2024-01-01T00:00:00Z" }),
            )
            .unwrap();
        store
            .put(
                EntityKind::PromptVersion,
                "v2",
                json!({ "id": "v2", "promptId": "p2", "content": "c2", "createdAt": "2024-01-01T00:00:00Z", "updatedAt": "2024-01-01T00:00:00Z" }),
            )
            .unwrap();

        let versions = store.versions_of("p1").unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0]["id"], json!("v1"));
    }

    #[test]
    fn apply_deltas_is_atomic_across_kinds() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .apply_deltas(DeltaBatch {
                prompts: KindChanges {
                    created: vec![prompt("p1")],
                    updated: vec![],
                    deleted: vec![],
                },
                meta: MetaPatch {
                    last_sync_id: Some(3),
                    last_synced_at: Some("2024-01-01T00:00:00Z".to_string()),
                    client_id: None,
                },
                ..Default::default()
            })
            .unwrap();

        assert!(store.get(EntityKind::Prompt, "p1").unwrap().is_some());
        assert_eq!(store.read_meta().unwrap().last_sync_id, 3);
    }

    #[test]
    fn drain_ordered_is_fifo() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .enqueue_mutation(PendingMutation {
                id: "m2".to_string(),
                operation: MutationOp::Create,
                entity_type: EntityKind::Prompt,
                entity_id: "p1".to_string(),
                payload: None,
                created_at: "2024-01-02T00:00:00Z".to_string(),
                retry_count: 0,
                last_error: None,
            })
            .unwrap();
        store
            .enqueue_mutation(PendingMutation {
                id: "m1".to_string(),
                operation: MutationOp::Create,
                entity_type: EntityKind::Prompt,
                entity_id: "p1".to_string(),
                payload: None,
                created_at: "2024-01-01T00:00:00Z".to_string(),
                retry_count: 0,
                last_error: None,
            })
            .unwrap();

        let drained = store.drain_ordered().unwrap();
        assert_eq!(drained[0].id, "m1");
        assert_eq!(drained[1].id, "m2");
    }
}
