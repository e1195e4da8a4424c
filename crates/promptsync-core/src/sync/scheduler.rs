//! Timer loops for `SyncEngine`. Two independent `tokio` tasks split the
//! pull/push logic from the scheduler that owns the timers — pull and
//! push never share a tick, so a slow pull never delays a push or vice
//! versa.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::engine::{PushOutcome, SyncEngine};
use crate::error::SyncErrorKind;

/// The short delay used to immediately re-run a tick that has more work
/// queued (`hasMore` on pull, a non-empty queue after a push batch).
const IMMEDIATE_RETRY_DELAY: Duration = Duration::from_millis(100);

pub(crate) struct Handles {
    pub(crate) pull_task: JoinHandle<()>,
    pub(crate) push_task: JoinHandle<()>,
}

/// Spawns the pull and push loops. Both begin with one `poll_interval`
/// wait before their first tick.
pub(crate) fn spawn(engine: Arc<SyncEngine>) -> Handles {
    let pull_engine = Arc::clone(&engine);
    let pull_task = tokio::spawn(async move { pull_loop(pull_engine).await });

    let push_engine = Arc::clone(&engine);
    let push_task = tokio::spawn(async move { push_loop(push_engine).await });

    Handles { pull_task, push_task }
}

async fn pull_loop(engine: Arc<SyncEngine>) {
    loop {
        sleep(engine.config.poll_interval).await;
        let has_more = engine.pull_once().await;
        if has_more {
            // Drain additional pages within the same tick before the
            // regular interval resumes.
            loop {
                sleep(IMMEDIATE_RETRY_DELAY).await;
                if !engine.pull_once().await {
                    break;
                }
            }
        }
    }
}

async fn push_loop(engine: Arc<SyncEngine>) {
    sleep(engine.config.poll_interval).await;
    loop {
        let outcome = engine.push_once().await;
        let delay = match &outcome {
            PushOutcome::TransportFailed(_) => {
                backoff_delay(engine.config.initial_retry_delay, engine.config.retry_backoff, outcome.classify())
            }
            PushOutcome::MoreRemain => IMMEDIATE_RETRY_DELAY,
            PushOutcome::Drained | PushOutcome::QueueEmpty | PushOutcome::Skipped => engine.config.poll_interval,
        };
        sleep(delay).await;
    }
}

/// Permanent/Auth/Capacity failures wait the full backed-off delay;
/// transient ones use the configured initial delay unmultiplied — the
/// multiplier is reserved for a future exponential scheme and currently
/// only changes the delay for non-transient kinds.
fn backoff_delay(initial: Duration, multiplier: u32, kind: SyncErrorKind) -> Duration {
    match kind {
        SyncErrorKind::Transient => initial,
        SyncErrorKind::Permanent | SyncErrorKind::Auth | SyncErrorKind::Capacity => {
            initial.saturating_mul(multiplier.max(1))
        }
    }
}
