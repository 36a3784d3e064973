use std::collections::HashSet;

use chrono::Utc;
use forge_protocol::{
    agent_info_key, processing_queue_key, task_key, task_lock_key, task_queue_key, AgentInfo,
    AgentStatus, Task, TaskStatus, LIVENESS_THRESHOLD_SECS, LOCK_TTL_SECS, RECORD_TTL_SECS,
};
use forge_store::Store;
use tracing::{debug, info};
use uuid::Uuid;

use crate::app_state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("not found app info")]
    AgentUnknown,
    #[error("the client is disconnected for more than 90 seconds")]
    AgentStale,
    #[error("task info not found")]
    TaskRecordMissing,
    #[error("timeout waiting for task {task_id}")]
    ReportTimeout { task_id: String },
    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// What a `run_single_task` caller gets back on success.
#[derive(Debug, Clone)]
pub struct SingleTaskOutcome {
    pub task_id: String,
    pub result: String,
}

/// Outcome of claiming a task id that just moved into the processing
/// queue.
#[derive(Debug)]
pub(crate) enum Claim {
    Granted(Task),
    /// Another fetch holds the delivery lock; the duplicate entry was
    /// removed from the processing queue.
    Contended,
}

impl AppState {
    /// Dispatch one task to `app_id` and wait synchronously for its
    /// report. The task record and queue entry outlive a timeout here;
    /// the store TTLs and the sweeper reclaim them.
    pub async fn run_single_task(
        &self,
        app_id: &str,
        task_type: &str,
        payload: &str,
    ) -> Result<SingleTaskOutcome, DispatchError> {
        self.app_live_check(app_id).await?;
        let task = add_task(self, app_id, task_type, payload).await?;
        let task_id = task.task_id;
        debug!(%task_id, %app_id, "task enqueued");

        let slot = self.rendezvous().subscribe(&task_id).await;
        let waited = tokio::time::timeout(self.config().single_timeout, slot).await;
        self.rendezvous().cancel(&task_id).await;
        match waited {
            Ok(Ok(report)) => Ok(SingleTaskOutcome {
                task_id,
                result: report.result,
            }),
            Ok(Err(_)) | Err(_) => {
                debug!(%task_id, "no report within the single-task window");
                Err(DispatchError::ReportTimeout { task_id })
            }
        }
    }

    /// Gate dispatch on agent liveness. A record whose last authenticated
    /// request is older than the threshold is flipped to `timeout` and
    /// persisted before the caller sees the error.
    pub async fn app_live_check(&self, app_id: &str) -> Result<(), DispatchError> {
        let key = agent_info_key(app_id);
        let Some(raw) = self.store().get(&key).await? else {
            return Err(DispatchError::AgentUnknown);
        };
        let mut info: AgentInfo = serde_json::from_slice(&raw)?;
        let now = Utc::now().timestamp();
        if now - info.last_ping_time > LIVENESS_THRESHOLD_SECS {
            info.do_status = AgentStatus::Timeout;
            self.store()
                .set_ex(&key, RECORD_TTL_SECS, &serde_json::to_vec(&info)?)
                .await?;
            return Err(DispatchError::AgentStale);
        }
        Ok(())
    }
}

/// Create the task record and push its id onto the agent's ready queue.
pub(crate) async fn add_task(
    state: &AppState,
    app_id: &str,
    task_type: &str,
    payload: &str,
) -> Result<Task, DispatchError> {
    let task = Task {
        task_id: Uuid::new_v4().to_string(),
        task_type: task_type.to_string(),
        do_status: TaskStatus::Doing,
        create_at: Utc::now(),
        payload: payload.to_string(),
        result: String::new(),
    };
    let store = state.store();
    store
        .set_ex(
            &task_key(app_id, &task.task_id),
            RECORD_TTL_SECS,
            &serde_json::to_vec(&task)?,
        )
        .await?;
    let queue = task_queue_key(app_id);
    store.lpush(&queue, &task.task_id).await?;
    store.expire(&queue, RECORD_TTL_SECS).await?;
    Ok(task)
}

/// Claim a task id freshly moved into the processing queue: load its
/// record and take the single-delivery lock. A missing record leaves the
/// processing entry in place for the sweeper.
pub(crate) async fn claim_task(
    state: &AppState,
    app_id: &str,
    task_id: &str,
) -> Result<Claim, DispatchError> {
    let store = state.store();
    let Some(raw) = store.get(&task_key(app_id, task_id)).await? else {
        return Err(DispatchError::TaskRecordMissing);
    };
    let task: Task = serde_json::from_slice(&raw)?;

    let lock_key = task_lock_key(app_id, task_id);
    if !store.set_nx(&lock_key, b"1").await? {
        store
            .lrem(&processing_queue_key(app_id), 1, task_id)
            .await?;
        return Ok(Claim::Contended);
    }
    store.expire(&lock_key, LOCK_TTL_SECS).await?;
    Ok(Claim::Granted(task))
}

/// Walk the processing queue once and re-enqueue entries whose delivery
/// lock has expired while their record still says `doing`. Entries whose
/// record is terminal or gone are dropped.
pub(crate) async fn sweep_processing_queue(
    state: &AppState,
    app_id: &str,
) -> Result<usize, DispatchError> {
    const MAX_ROTATIONS: usize = 64;

    let store = state.store();
    let processing = processing_queue_key(app_id);
    let ready = task_queue_key(app_id);
    let mut seen: HashSet<String> = HashSet::new();
    let mut reclaimed = 0usize;

    for _ in 0..MAX_ROTATIONS {
        let Some(task_id) = store.rpoplpush(&processing, &processing).await? else {
            break;
        };
        if !seen.insert(task_id.clone()) {
            break;
        }
        if store
            .get(&task_lock_key(app_id, &task_id))
            .await?
            .is_some()
        {
            // Delivery window still open; leave it alone.
            continue;
        }
        match store.get(&task_key(app_id, &task_id)).await? {
            None => {
                store.lrem(&processing, 1, &task_id).await?;
            }
            Some(raw) => {
                let task: Task = serde_json::from_slice(&raw)?;
                store.lrem(&processing, 1, &task_id).await?;
                if task.do_status == TaskStatus::Doing {
                    store.lpush(&ready, &task_id).await?;
                    store.expire(&ready, RECORD_TTL_SECS).await?;
                    reclaimed += 1;
                    info!(%task_id, %app_id, "re-enqueued abandoned task");
                }
            }
        }
    }
    Ok(reclaimed)
}
