use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use forge_agent::{Agent, Task, TaskHandler};
use forge_core::util::{env_bool, env_u64};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Demo handler dispatching on `task_type`. Payloads are JSON strings;
/// anything unrecognized is answered with an error object rather than a
/// dropped task.
struct DemoHandler;

#[async_trait::async_trait]
impl TaskHandler for DemoHandler {
    async fn handle(&self, task: &Task) -> String {
        match task.task_type.as_str() {
            "math.add" => {
                let input: serde_json::Value =
                    serde_json::from_str(&task.payload).unwrap_or_default();
                let a = input.get("a").and_then(|v| v.as_f64()).unwrap_or(0.0);
                let b = input.get("b").and_then(|v| v.as_f64()).unwrap_or(0.0);
                json!({"sum": a + b}).to_string()
            }
            "time.now" => {
                let now_ms = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as i64;
                json!({"now_ms": now_ms}).to_string()
            }
            "echo" => task.payload.clone(),
            other => json!({"error": "unknown task type", "task_type": other}).to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let server =
        std::env::var("FORGE_SERVER").unwrap_or_else(|_| "http://127.0.0.1:8087".into());
    let app_id = std::env::var("FORGE_APP_ID").context("FORGE_APP_ID is required")?;
    let secret = std::env::var("FORGE_SECRET").context("FORGE_SECRET is required")?;

    let mut agent = Agent::new(app_id, secret)?
        .with_server_addr(server.as_str())
        .with_debug(env_bool("FORGE_DEBUG"))
        .with_skip_tls_verify(env_bool("FORGE_SKIP_TLS"))
        .with_check_interval(env_u64("FORGE_CHECK_INTERVAL_SECS", 10))
        .with_task_interval(Duration::from_millis(env_u64("FORGE_TASK_INTERVAL_MS", 1_000)))
        .with_http_timeout(Duration::from_secs(env_u64("FORGE_HTTP_TIMEOUT_SECS", 60)));
    let worker_limit = env_u64("FORGE_WORKER_LIMIT", 0);
    if worker_limit > 0 {
        agent = agent.with_worker_limit(worker_limit as usize);
    }

    let handle = agent.register(Arc::new(DemoHandler)).await?;
    info!(server = %server, "connector polling for tasks");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            Ok(())
        }
        result = handle.join() => {
            result.context("agent stopped")
        }
    }
}
