use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use forge_protocol::{
    agent_info_key, processing_queue_key, task_key, task_queue_key, Response, Task, TaskStatus,
    CODE_FAILURE, CODE_RETRY, RECORD_TTL_SECS,
};
use forge_store::Store;
use serde_json::Value;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::app_state::AppState;
use crate::auth;
use crate::dispatch::{self, Claim};
use crate::responses::{fail, ok};

const NO_TASK_TIMEOUT: &str = "timeout reached without receiving a task";
const LOCK_CONTENDED: &str = "task is already being processed or lock acquisition failed";

/// Long-poll for the next task. Holds the request open up to the long-loop
/// deadline, re-attempting the atomic ready-to-processing move every tick.
#[utoipa::path(
    post,
    path = "/orange-forge/api/getTask",
    tag = "Forge",
    request_body = String,
    responses(
        (status = 200, description = "Envelope with the claimed task, or code 2 when none arrived", body = serde_json::Value)
    )
)]
pub(crate) async fn get_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Json<Response> {
    let debug_mode = state.config().debug;
    let Some(args) = auth::signed_args(&headers) else {
        return fail(debug_mode, CODE_FAILURE, auth::MISSING_HEADERS);
    };
    if let Err(err) = auth::verify_session(&state, &args, &body).await {
        return fail(debug_mode, CODE_FAILURE, err.to_string());
    }

    let app_id = args.app_id;
    let queue = task_queue_key(&app_id);
    let processing = processing_queue_key(&app_id);
    let store = state.store();

    let moved = match store.rpoplpush(&queue, &processing).await {
        Ok(moved) => moved,
        Err(err) => return fail(debug_mode, CODE_FAILURE, err.to_string()),
    };
    let moved = match moved {
        Some(task_id) => Some(task_id),
        None => {
            let wait = async {
                let mut tick = tokio::time::interval(state.config().task_wait_tick);
                tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick fires immediately; the initial attempt
                // already ran, so consume it.
                tick.tick().await;
                loop {
                    tick.tick().await;
                    if let Some(task_id) = store.rpoplpush(&queue, &processing).await? {
                        return anyhow::Ok(task_id);
                    }
                }
            };
            match tokio::time::timeout(state.config().long_loop_duration, wait).await {
                Ok(Ok(task_id)) => Some(task_id),
                Ok(Err(err)) => return fail(debug_mode, CODE_FAILURE, err.to_string()),
                Err(_) => None,
            }
        }
    };
    let Some(task_id) = moved else {
        return fail(debug_mode, CODE_RETRY, NO_TASK_TIMEOUT);
    };
    debug!(%task_id, %app_id, "task moved to processing");

    match dispatch::claim_task(&state, &app_id, &task_id).await {
        Ok(Claim::Granted(task)) => match serde_json::to_value(&task) {
            Ok(data) => ok("task fetched", data),
            Err(err) => fail(debug_mode, CODE_FAILURE, err.to_string()),
        },
        Ok(Claim::Contended) => fail(debug_mode, CODE_RETRY, LOCK_CONTENDED),
        Err(err) => fail(debug_mode, CODE_FAILURE, err.to_string()),
    }
}

/// Deliver a task result. Terminal statuses clear the processing entry,
/// bump the agent's processed counter, and wake any waiting caller.
#[utoipa::path(
    post,
    path = "/orange-forge/api/reportTask",
    tag = "Forge",
    request_body = String,
    responses((status = 200, description = "Acknowledgement envelope", body = serde_json::Value))
)]
pub(crate) async fn report_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Json<Response> {
    let debug_mode = state.config().debug;
    let Some(args) = auth::signed_args(&headers) else {
        return fail(debug_mode, CODE_FAILURE, auth::MISSING_HEADERS);
    };
    let mut agent = match auth::verify_session(&state, &args, &body).await {
        Ok(agent) => agent,
        Err(err) => return fail(debug_mode, CODE_FAILURE, err.to_string()),
    };

    let reported = match serde_json::from_str::<Task>(&body) {
        Ok(task) if !task.task_id.is_empty() => task,
        _ => return fail(debug_mode, CODE_FAILURE, "task payload not found"),
    };

    let app_id = args.app_id;
    let store = state.store();
    let record_key = task_key(&app_id, &reported.task_id);
    let raw = match store.get(&record_key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return fail(debug_mode, CODE_FAILURE, "task info not found"),
        Err(err) => return fail(debug_mode, CODE_FAILURE, err.to_string()),
    };
    let mut saved = match serde_json::from_slice::<Task>(&raw) {
        Ok(saved) => saved,
        Err(err) => return fail(debug_mode, CODE_FAILURE, err.to_string()),
    };
    saved.do_status = reported.do_status;
    saved.result = reported.result;

    let encoded = match serde_json::to_vec(&saved) {
        Ok(encoded) => encoded,
        Err(err) => return fail(debug_mode, CODE_FAILURE, err.to_string()),
    };
    if let Err(err) = store.set_ex(&record_key, RECORD_TTL_SECS, &encoded).await {
        return fail(debug_mode, CODE_FAILURE, err.to_string());
    }

    if saved.do_status != TaskStatus::Doing {
        if let Err(err) = store
            .lrem(&processing_queue_key(&app_id), 1, &saved.task_id)
            .await
        {
            return fail(debug_mode, CODE_FAILURE, err.to_string());
        }
        agent.processed_task_count += 1;
        match serde_json::to_vec(&agent) {
            Ok(encoded) => {
                if let Err(err) = store
                    .set_ex(&agent_info_key(&app_id), RECORD_TTL_SECS, &encoded)
                    .await
                {
                    return fail(debug_mode, CODE_FAILURE, err.to_string());
                }
            }
            Err(err) => return fail(debug_mode, CODE_FAILURE, err.to_string()),
        }
        if state.config().sweep_on_report {
            if let Err(err) = dispatch::sweep_processing_queue(&state, &app_id).await {
                warn!(%app_id, %err, "processing-queue sweep failed");
            }
        }
    }

    let woke = state.rendezvous().deliver(saved).await;
    debug!(task_id = %reported.task_id, %app_id, woke, "task report stored");
    ok("task status updated successfully", Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_register::register;
    use crate::config::ServerConfig;
    use crate::dispatch::add_task;
    use crate::test_support::{signed_headers, test_state};
    use forge_protocol::{task_lock_key, AgentInfo, BOOTSTRAP_SECRET};
    use std::time::{Duration, Instant};

    async fn registered_state(config: ServerConfig) -> AppState {
        let state = test_state(config);
        let body = r#"{"app_id":"A1","secret":"s1"}"#.to_string();
        let headers = signed_headers("A1", BOOTSTRAP_SECRET, &body);
        assert!(register(State(state.clone()), headers, body)
            .await
            .0
            .is_success());
        state
    }

    fn short_poll() -> ServerConfig {
        ServerConfig {
            long_loop_duration: Duration::from_millis(200),
            task_wait_tick: Duration::from_millis(20),
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn pending_task_is_fetched_and_locked() {
        let state = registered_state(short_poll()).await;
        let task = add_task(&state, "A1", "PING", "hello").await.unwrap();

        let headers = signed_headers("A1", "s1", "");
        let resp = get_task(State(state.clone()), headers, String::new())
            .await
            .0;
        assert!(resp.is_success(), "unexpected: {}", resp.message);
        assert_eq!(resp.data["task_id"], task.task_id.as_str());
        assert_eq!(resp.data["payload"], "hello");

        // Claimed: lock present, id parked in processing.
        assert!(state
            .store()
            .get(&task_lock_key("A1", &task.task_id))
            .await
            .unwrap()
            .is_some());
        assert_eq!(
            state
                .store()
                .lrem(&processing_queue_key("A1"), 0, &task.task_id)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn empty_queue_times_out_with_code_two() {
        let state = registered_state(short_poll()).await;
        let headers = signed_headers("A1", "s1", "");
        let started = Instant::now();
        let resp = get_task(State(state), headers, String::new()).await.0;
        assert_eq!(resp.code, CODE_RETRY);
        assert_eq!(resp.message, NO_TASK_TIMEOUT);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(180), "returned too early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "deadline ignored: {elapsed:?}");
    }

    #[tokio::test]
    async fn task_arriving_mid_poll_is_delivered() {
        let state = registered_state(ServerConfig {
            long_loop_duration: Duration::from_secs(2),
            task_wait_tick: Duration::from_millis(20),
            ..ServerConfig::default()
        })
        .await;

        let spawned = state.clone();
        let enqueue = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            add_task(&spawned, "A1", "PING", "late").await.unwrap()
        });

        let headers = signed_headers("A1", "s1", "");
        let resp = get_task(State(state), headers, String::new()).await.0;
        let task = enqueue.await.unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.data["task_id"], task.task_id.as_str());
    }

    #[tokio::test]
    async fn racing_fetches_deliver_exactly_once() {
        let state = registered_state(short_poll()).await;
        let task = add_task(&state, "A1", "PING", "only-one").await.unwrap();

        let left = get_task(
            State(state.clone()),
            signed_headers("A1", "s1", ""),
            String::new(),
        );
        let right = get_task(
            State(state.clone()),
            signed_headers("A1", "s1", ""),
            String::new(),
        );
        let (left, right) = tokio::join!(left, right);
        let (left, right) = (left.0, right.0);

        let winners = [&left, &right]
            .iter()
            .filter(|resp| resp.is_success())
            .count();
        assert_eq!(winners, 1, "left={:?} right={:?}", left.code, right.code);
        let loser = if left.is_success() { &right } else { &left };
        assert_eq!(loser.code, CODE_RETRY);

        // Net effect: the id sits in processing exactly once.
        assert_eq!(
            state
                .store()
                .lrem(&processing_queue_key("A1"), 0, &task.task_id)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn terminal_report_clears_processing_and_wakes_the_slot() {
        let state = registered_state(short_poll()).await;
        let task = add_task(&state, "A1", "PING", "hello").await.unwrap();
        let fetched = get_task(
            State(state.clone()),
            signed_headers("A1", "s1", ""),
            String::new(),
        )
        .await
        .0;
        assert!(fetched.is_success());

        let slot = state.rendezvous().subscribe(&task.task_id).await;

        let mut done = task.clone();
        done.do_status = TaskStatus::Success;
        done.result = "world".into();
        let body = serde_json::to_string(&done).unwrap();
        let resp = report_task(
            State(state.clone()),
            signed_headers("A1", "s1", &body),
            body,
        )
        .await
        .0;
        assert!(resp.is_success(), "unexpected: {}", resp.message);

        // Stored record carries the terminal status and result.
        let raw = state
            .store()
            .get(&task_key("A1", &task.task_id))
            .await
            .unwrap()
            .unwrap();
        let stored: Task = serde_json::from_slice(&raw).unwrap();
        assert_eq!(stored.do_status, TaskStatus::Success);
        assert_eq!(stored.result, "world");

        // Processing no longer holds the id.
        assert_eq!(
            state
                .store()
                .lrem(&processing_queue_key("A1"), 0, &task.task_id)
                .await
                .unwrap(),
            0
        );

        // The waiting caller got the report.
        assert_eq!(slot.await.unwrap().result, "world");

        // Terminal reports advance the processed counter.
        let raw = state
            .store()
            .get(&agent_info_key("A1"))
            .await
            .unwrap()
            .unwrap();
        let agent: AgentInfo = serde_json::from_slice(&raw).unwrap();
        assert_eq!(agent.processed_task_count, 1);
    }

    #[tokio::test]
    async fn reporting_an_unknown_task_fails() {
        let state = registered_state(ServerConfig {
            debug: true,
            ..short_poll()
        })
        .await;
        let mut ghost = add_task(&state, "A1", "PING", "x").await.unwrap();
        ghost.task_id = "does-not-exist".into();
        ghost.do_status = TaskStatus::Success;
        let body = serde_json::to_string(&ghost).unwrap();
        let resp = report_task(State(state), signed_headers("A1", "s1", &body), body)
            .await
            .0;
        assert_eq!(resp.code, CODE_FAILURE);
        assert_eq!(resp.message, "task info not found");
    }

    #[tokio::test]
    async fn doing_report_keeps_the_processing_entry() {
        let state = registered_state(short_poll()).await;
        let task = add_task(&state, "A1", "PING", "x").await.unwrap();
        assert!(get_task(
            State(state.clone()),
            signed_headers("A1", "s1", ""),
            String::new(),
        )
        .await
        .0
        .is_success());

        let mut progress = task.clone();
        progress.do_status = TaskStatus::Doing;
        let body = serde_json::to_string(&progress).unwrap();
        assert!(report_task(
            State(state.clone()),
            signed_headers("A1", "s1", &body),
            body,
        )
        .await
        .0
        .is_success());

        assert_eq!(
            state
                .store()
                .lrem(&processing_queue_key("A1"), 0, &task.task_id)
                .await
                .unwrap(),
            1
        );
    }
}
