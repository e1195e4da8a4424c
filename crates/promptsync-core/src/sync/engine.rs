//! `SyncEngine` — the background worker that keeps the local replica
//! coherent with the server. This module owns the pull/push logic and
//! the status state machine; `scheduler` owns the timer loops that call
//! into it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::config::{EngineEvents, SyncConfig};
use crate::entity::new_id;
use crate::error::{SyncErrorKind, SyncTransportError};
use crate::store::DurableStore;
use crate::sync::types::{
    DynTransport, MutationsRequest, PendingMutation, SyncErrorEvent, SyncPhase, SyncRequest,
    SyncResponse, SyncStatus,
};
use crate::view::ProjectedView;

use super::scheduler::Handles;

/// The background sync worker. One instance per replica; lifecycle is
/// `init → start → (ticks) → stop → destroy`. Re-initializing must first
/// `destroy` the previous instance.
pub struct SyncEngine {
    pub(crate) view: Arc<ProjectedView>,
    pub(crate) store: Arc<dyn DurableStore>,
    pub(crate) transport: DynTransport,
    pub(crate) config: SyncConfig,
    pub(crate) events: EngineEvents,
    pub(crate) pulling: Arc<AtomicBool>,
    pub(crate) pushing: Arc<AtomicBool>,
    pub(crate) online: Arc<AtomicBool>,
    handles: Mutex<Option<Handles>>,
}

impl SyncEngine {
    pub fn new(
        view: Arc<ProjectedView>,
        store: Arc<dyn DurableStore>,
        transport: DynTransport,
        config: SyncConfig,
        events: EngineEvents,
    ) -> Self {
        Self {
            view,
            store,
            transport,
            config,
            events,
            pulling: Arc::new(AtomicBool::new(false)),
            pushing: Arc::new(AtomicBool::new(false)),
            online: Arc::new(AtomicBool::new(true)),
            handles: Mutex::new(None),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Loads or mints the client identity into metadata and sets the
    /// initial status. Does not start the timers — call `start()` after.
    pub fn init(&self) {
        let mut meta = self.store.read_meta().unwrap_or_default();
        if meta.client_id.is_none() {
            meta.client_id = Some(self.config.client_id.clone().unwrap_or_else(new_id));
            if let Err(e) = self.store.write_meta(crate::sync::types::MetaPatch {
                last_sync_id: None,
                last_synced_at: None,
                client_id: meta.client_id.clone(),
            }) {
                error!(error = %e, "failed to persist client identity");
            }
        }

        let status = if self.online.load(Ordering::SeqCst) {
            SyncStatus::Idle
        } else {
            SyncStatus::Offline
        };
        self.set_status(status);
    }

    /// Idempotent: begins timers and triggers an initial pull.
    pub fn start(self: &Arc<Self>) {
        let mut handles = self.handles.lock();
        if handles.is_some() {
            return;
        }
        *handles = Some(super::scheduler::spawn(Arc::clone(self)));
    }

    /// Cancels timers; does not drop the queue.
    pub fn stop(&self) {
        if let Some(handles) = self.handles.lock().take() {
            handles.pull_task.abort();
            handles.push_task.abort();
        }
    }

    /// `stop()` plus unsubscribe from connectivity signals. Safe to call
    /// multiple times.
    pub fn destroy(&self) {
        self.stop();
    }

    /// The external connectivity signal. On the "online" transition,
    /// immediately triggers one pull and one push in addition to resuming
    /// the schedule.
    pub fn set_online(self: &Arc<Self>, online: bool) {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if let Some(cb) = &self.events.on_online_change {
            cb(online);
        }
        if was_online == online {
            return;
        }
        if online {
            self.set_status(SyncStatus::Idle);
            let engine = Arc::clone(self);
            tokio::spawn(async move { engine.force_sync().await });
            let engine = Arc::clone(self);
            tokio::spawn(async move { engine.force_push().await });
        } else {
            self.set_status(SyncStatus::Offline);
        }
    }

    /// Bypasses the schedule and begins a pull immediately (subject to the
    /// single-in-flight constraint).
    pub async fn force_sync(self: &Arc<Self>) {
        self.pull_once().await;
    }

    /// Bypasses the schedule and begins a push immediately (subject to the
    /// single-in-flight constraint).
    pub async fn force_push(self: &Arc<Self>) {
        self.push_once().await;
    }

    // ------------------------------------------------------------------
    // Status state machine
    // ------------------------------------------------------------------

    pub(crate) fn set_status(&self, status: SyncStatus) {
        if let Some(cb) = &self.events.on_status_change {
            cb(&status);
        }
        self.view.update_sync_status(status);
    }

    // ------------------------------------------------------------------
    // Pull
    // ------------------------------------------------------------------

    /// Returns `true` if the server reported more data (`hasMore`), so the
    /// scheduler can immediately run another pull within one tick.
    pub(crate) async fn pull_once(self: &Arc<Self>) -> bool {
        if self.pulling.swap(true, Ordering::SeqCst) {
            debug!("pull already in flight; coalescing");
            return false;
        }
        let _guard = ResetOnDrop(&self.pulling);

        if !self.online.load(Ordering::SeqCst) {
            return false;
        }

        self.set_status(SyncStatus::Syncing);

        let last_sync_id = self.store.read_meta().map(|m| m.last_sync_id).unwrap_or(0);
        let limit = if self.config.pull_limit == 0 { 100 } else { self.config.pull_limit };

        let result = self
            .transport
            .pull(SyncRequest { last_sync_id, limit: Some(limit) })
            .await;

        match result {
            Ok(packet) => {
                self.apply_pull_packet(&packet);
                self.set_status(SyncStatus::Idle);
                packet.has_more
            }
            Err(e) => {
                warn!(error = %e.message, "pull failed");
                self.set_status(SyncStatus::Error(e.message.clone()));
                if let Some(cb) = &self.events.on_sync_error {
                    cb(&SyncErrorEvent { phase: SyncPhase::Pull, error: e.message.clone() });
                }
                false
            }
        }
    }

    fn apply_pull_packet(&self, packet: &SyncResponse) {
        self.view.apply_server_changes(packet);
        if let Some(cb) = &self.events.on_sync_complete {
            cb(packet);
        }
    }

    // ------------------------------------------------------------------
    // Push
    // ------------------------------------------------------------------

    /// Returns `true` if the queue still has mutations after this batch,
    /// so the scheduler reschedules at the short delay instead of
    /// `poll_interval`.
    pub(crate) async fn push_once(self: &Arc<Self>) -> PushOutcome {
        if self.pushing.swap(true, Ordering::SeqCst) {
            debug!("push already in flight; coalescing");
            return PushOutcome::Skipped;
        }
        let _guard = ResetOnDrop(&self.pushing);

        if !self.online.load(Ordering::SeqCst) {
            return PushOutcome::Skipped;
        }

        let pending = match self.store.drain_ordered() {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "failed to read pending mutation queue");
                return PushOutcome::Skipped;
            }
        };
        if pending.is_empty() {
            return PushOutcome::QueueEmpty;
        }

        let batch: Vec<PendingMutation> = pending.into_iter().take(self.config.push_batch_size).collect();
        let wire_mutations = batch.iter().map(Into::into).collect();
        let client_id = self.store.read_meta().ok().and_then(|m| m.client_id).unwrap_or_default();

        self.set_status(SyncStatus::Pushing);

        let result = self
            .transport
            .push(MutationsRequest { client_id, mutations: wire_mutations })
            .await;

        match result {
            Ok(response) => {
                let mut permanent_failures = 0usize;
                for mutation_result in &response.results {
                    let Some(mutation) = batch.iter().find(|m| m.id == mutation_result.mutation_id) else {
                        continue;
                    };
                    if mutation_result.success {
                        self.view.remove_pending_mutation(&mutation.id);
                    } else {
                        let error = mutation_result.error.clone().unwrap_or_else(|| "rejected by server".to_string());
                        let next_retry_count = mutation.retry_count + 1;
                        if next_retry_count >= self.config.max_retries {
                            self.view.remove_pending_mutation(&mutation.id);
                            permanent_failures += 1;
                            if let Some(cb) = &self.events.on_mutation_failed {
                                cb(mutation, &crate::sync::types::MutationFailure { error: error.clone() });
                            }
                        } else {
                            self.view.bump_mutation_retry(&mutation.id, next_retry_count, error);
                        }
                    }
                }

                // Push-side cursor install is intentionally skipped: the
                // engine waits for the next pull to carry the advance
                // (see DESIGN.md).
                let _ = response.sync_id;

                let pushed = response.results.iter().filter(|r| r.success).count();
                if pushed > 0 {
                    if let Some(cb) = &self.events.on_mutations_pushed {
                        cb(pushed);
                    }
                }
                let _ = permanent_failures;

                self.set_status(SyncStatus::Idle);

                let remaining = self.store.drain_ordered().map(|p| !p.is_empty()).unwrap_or(false);
                if remaining {
                    PushOutcome::MoreRemain
                } else {
                    PushOutcome::Drained
                }
            }
            Err(e) => {
                warn!(error = %e.message, "push transport failure; batch left untouched");
                self.set_status(SyncStatus::Error(e.message.clone()));
                if let Some(cb) = &self.events.on_sync_error {
                    cb(&SyncErrorEvent { phase: SyncPhase::Push, error: e.message.clone() });
                }
                PushOutcome::TransportFailed(e)
            }
        }
    }
}

pub(crate) enum PushOutcome {
    /// Another push was already in flight, or the engine is offline.
    Skipped,
    /// The queue was empty; nothing to push.
    QueueEmpty,
    /// The batch was pushed and the queue is now empty.
    Drained,
    /// The batch was pushed but mutations remain queued.
    MoreRemain,
    /// The whole batch failed at the transport level.
    TransportFailed(SyncTransportError),
}

impl PushOutcome {
    pub(crate) fn classify(&self) -> SyncErrorKind {
        match self {
            PushOutcome::TransportFailed(e) => e.kind,
            _ => SyncErrorKind::Transient,
        }
    }
}

/// Resets an `AtomicBool` latch to `false` on drop (including on panic),
/// so a coalesced pull/push never wedges the latch permanently.
struct ResetOnDrop<'a>(&'a AtomicBool);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
