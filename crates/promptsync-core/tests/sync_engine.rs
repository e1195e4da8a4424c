//! Integration tests driving `SyncEngine` against a scriptable in-process
//! mock `SyncTransport`, covering the scenarios and invariants in this
//! crate's sync protocol design.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use promptsync_core::config::SyncConfig;
use promptsync_core::entity::PromptFields;
use promptsync_core::error::SyncTransportError;
use promptsync_core::store::memory::MemoryStore;
use promptsync_core::sync::types::{
    ChangeSet, KindChanges, MutationResult, MutationsRequest, MutationsResponse, SyncRequest,
    SyncResponse, SyncTransport,
};
use promptsync_core::view::ProjectedView;
use promptsync_core::SyncEngine;
use serde_json::json;

/// A transport whose pull/push responses are supplied up front and
/// consumed one at a time, so each test scripts exactly the exchange it
/// wants to observe.
struct ScriptedTransport {
    pulls: Mutex<Vec<Result<SyncResponse, SyncTransportError>>>,
    pushes: Mutex<Vec<Result<MutationsResponse, SyncTransportError>>>,
}

impl ScriptedTransport {
    fn new() -> Self {
        Self { pulls: Mutex::new(Vec::new()), pushes: Mutex::new(Vec::new()) }
    }

    fn with_pull(self, response: Result<SyncResponse, SyncTransportError>) -> Self {
        self.pulls.lock().push(response);
        self
    }

    fn with_push(self, response: Result<MutationsResponse, SyncTransportError>) -> Self {
        self.pushes.lock().push(response);
        self
    }
}

#[async_trait]
impl SyncTransport for ScriptedTransport {
    async fn pull(&self, _req: SyncRequest) -> Result<SyncResponse, SyncTransportError> {
        let mut pulls = self.pulls.lock();
        if pulls.is_empty() {
            return Ok(empty_response(0));
        }
        pulls.remove(0)
    }

    async fn push(&self, _req: MutationsRequest) -> Result<MutationsResponse, SyncTransportError> {
        let mut pushes = self.pushes.lock();
        if pushes.is_empty() {
            return Ok(MutationsResponse { success: true, sync_id: 0, results: vec![], conflicts: None });
        }
        pushes.remove(0)
    }
}

fn empty_response(sync_id: i64) -> SyncResponse {
    SyncResponse {
        sync_id,
        timestamp: "2024-01-01T00:00:00Z".to_string(),
        has_more: false,
        changes: ChangeSet::default(),
    }
}

fn engine_with(transport: ScriptedTransport) -> (Arc<ProjectedView>, Arc<SyncEngine>) {
    let store = Arc::new(MemoryStore::new());
    let view = Arc::new(ProjectedView::new(store.clone()));
    view.hydrate();
    let config = SyncConfig { push_batch_size: 10, max_retries: 5, ..Default::default() };
    let engine = Arc::new(SyncEngine::new(view.clone(), store, Arc::new(transport), config, Default::default()));
    engine.init();
    (view, engine)
}

#[tokio::test]
async fn s1_create_and_push() {
    let store = Arc::new(MemoryStore::new());
    let view = Arc::new(ProjectedView::new(store.clone()));
    view.hydrate();

    let prompt = view.create_prompt(PromptFields {
        title: Some("T".to_string()),
        content: Some("C".to_string()),
        category: Some("".to_string()),
        is_favorite: Some(false),
        group_id: None,
    });

    let snap = view.snapshot();
    assert!(snap.prompts.contains_key(&prompt.id));
    assert_eq!(snap.pending_count, 1);

    let queued = store.drain_ordered().unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].entity_id, prompt.id);
    assert_eq!(queued[0].entity_type.as_str(), "prompt");

    let transport = ScriptedTransport::new().with_push(Ok(MutationsResponse {
        success: true,
        sync_id: 7,
        results: vec![MutationResult {
            mutation_id: queued[0].id.clone(),
            success: true,
            entity: None,
            error: None,
        }],
        conflicts: None,
    }));
    let engine = Arc::new(SyncEngine::new(
        view.clone(),
        store.clone(),
        Arc::new(transport),
        SyncConfig::default(),
        Default::default(),
    ));
    engine.init();
    engine.force_push().await;

    assert_eq!(view.snapshot().pending_count, 0);
    assert!(store.drain_ordered().unwrap().is_empty());
}

#[tokio::test]
async fn s2_pull_applies_creates() {
    let mut changes = ChangeSet::default();
    changes.prompts = KindChanges {
        created: vec![serde_json::from_value(json!({
            "id": "A", "title": "a", "content": "", "category": "",
            "isFavorite": false, "createdAt": "2024-01-01T00:00:00Z", "updatedAt": "2024-01-01T00:00:00Z"
        })).unwrap()],
        updated: vec![],
        deleted: vec![],
    };
    changes.groups = KindChanges {
        created: vec![serde_json::from_value(json!({
            "id": "G", "name": "g", "color": "red",
            "createdAt": "2024-01-01T00:00:00Z", "updatedAt": "2024-01-01T00:00:00Z"
        })).unwrap()],
        updated: vec![],
        deleted: vec![],
    };

    let (view, engine) = engine_with(ScriptedTransport::new().with_pull(Ok(SyncResponse {
        sync_id: 3,
        timestamp: "2024-01-01T00:00:00Z".to_string(),
        has_more: false,
        changes,
    })));

    engine.force_sync().await;

    let snap = view.snapshot();
    assert!(snap.prompts.contains_key("A"));
    assert!(snap.groups.contains_key("G"));
    assert_eq!(snap.last_sync_id, 3);
}

#[tokio::test]
async fn s3_server_initiated_soft_delete() {
    let store = Arc::new(MemoryStore::new());
    let view = Arc::new(ProjectedView::new(store.clone()));
    view.hydrate();
    view.create_prompt(PromptFields {
        title: Some("x".to_string()),
        content: Some("".to_string()),
        category: Some("".to_string()),
        is_favorite: Some(false),
        group_id: None,
    });
    let id = view.snapshot().prompts.keys().next().cloned().unwrap();

    let mut changes = ChangeSet::default();
    changes.prompts = KindChanges { created: vec![], updated: vec![], deleted: vec![id.clone()] };

    let transport = ScriptedTransport::new().with_pull(Ok(SyncResponse {
        sync_id: 5,
        timestamp: "2024-01-01T00:00:00Z".to_string(),
        has_more: false,
        changes,
    }));
    let engine = Arc::new(SyncEngine::new(
        view.clone(),
        store.clone(),
        Arc::new(transport),
        SyncConfig::default(),
        Default::default(),
    ));
    engine.init();
    engine.force_sync().await;

    let snap = view.snapshot();
    assert!(snap.prompts.get(&id).unwrap().is_deleted);
    assert!(snap.active_prompts().is_empty());
}

#[tokio::test]
async fn s4_transport_failure_on_push_leaves_queue_untouched() {
    let (view, engine) = engine_with(
        ScriptedTransport::new().with_push(Err(SyncTransportError::new("network unreachable"))),
    );
    view.create_prompt(PromptFields {
        title: Some("x".to_string()),
        content: Some("".to_string()),
        category: Some("".to_string()),
        is_favorite: Some(false),
        group_id: None,
    });

    engine.force_push().await;

    let snap = view.snapshot();
    assert_eq!(snap.pending_count, 1);
    assert!(matches!(snap.status, promptsync_core::SyncStatus::Error(_)));
}

#[tokio::test]
async fn s5_permanent_failure_exhausts_retry_budget() {
    let store = Arc::new(MemoryStore::new());
    let view = Arc::new(ProjectedView::new(store.clone()));
    view.hydrate();
    view.create_prompt(PromptFields {
        title: Some("x".to_string()),
        content: Some("".to_string()),
        category: Some("".to_string()),
        is_favorite: Some(false),
        group_id: None,
    });
    let queued = store.drain_ordered().unwrap();
    store
        .update_mutation(
            &queued[0].id,
            promptsync_core::store::MutationPatch { retry_count: Some(4), last_error: None },
        )
        .unwrap();

    let failed = Arc::new(Mutex::new(0usize));
    let failed_clone = failed.clone();
    let events = promptsync_core::EngineEvents {
        on_mutation_failed: Some(Arc::new(move |_m, _f| {
            *failed_clone.lock() += 1;
        })),
        ..Default::default()
    };

    let transport = ScriptedTransport::new().with_push(Ok(MutationsResponse {
        success: false,
        sync_id: 0,
        results: vec![MutationResult {
            mutation_id: queued[0].id.clone(),
            success: false,
            entity: None,
            error: Some("rejected".to_string()),
        }],
        conflicts: None,
    }));
    let engine = Arc::new(SyncEngine::new(
        view.clone(),
        store.clone(),
        Arc::new(transport),
        SyncConfig { max_retries: 5, ..Default::default() },
        events,
    ));
    engine.init();
    engine.force_push().await;

    assert_eq!(view.snapshot().pending_count, 0);
    assert!(store.drain_ordered().unwrap().is_empty());
    assert_eq!(*failed.lock(), 1);
}

#[tokio::test]
async fn s6_offline_round_trip() {
    let store = Arc::new(MemoryStore::new());
    let view = Arc::new(ProjectedView::new(store.clone()));
    view.hydrate();

    let prompt = view.create_prompt(PromptFields {
        title: Some("x".to_string()),
        content: Some("".to_string()),
        category: Some("".to_string()),
        is_favorite: Some(false),
        group_id: None,
    });

    let snap = view.snapshot();
    assert!(snap.prompts.contains_key(&prompt.id));
    assert_eq!(snap.pending_count, 1);

    let queued = store.drain_ordered().unwrap();
    assert_eq!(queued.len(), 1);

    let transport = ScriptedTransport::new()
        .with_push(Ok(MutationsResponse {
            success: true,
            sync_id: 9,
            results: vec![MutationResult {
                mutation_id: queued[0].id.clone(),
                success: true,
                entity: None,
                error: None,
            }],
            conflicts: None,
        }))
        .with_pull(Ok(empty_response(9)));
    let engine = Arc::new(SyncEngine::new(
        view.clone(),
        store.clone(),
        Arc::new(transport),
        SyncConfig { push_batch_size: 10, max_retries: 5, ..Default::default() },
        Default::default(),
    ));
    engine.init();
    engine.set_online(false);
    assert_eq!(view.snapshot().status, promptsync_core::SyncStatus::Offline);

    // going back online should drain the queued mutation and carry the
    // cursor forward on the following pull.
    engine.set_online(true);
    engine.force_push().await;
    engine.force_sync().await;

    let snap = view.snapshot();
    assert_eq!(snap.pending_count, 0);
    assert_eq!(snap.last_sync_id, 9);
}
