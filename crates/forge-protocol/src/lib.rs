use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unified API envelope returned by every coordinator endpoint.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Response {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

/// `Response.code` for a successful call.
pub const CODE_SUCCESS: i32 = 0;
/// `Response.code` for a generic failure.
pub const CODE_FAILURE: i32 = 1;
/// `Response.code` for benign conditions the caller retries through:
/// long-poll deadline with no task, or a contended delivery lock.
pub const CODE_RETRY: i32 = 2;

/// A unit of work dispatched to a named agent.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Task {
    pub task_id: String,
    pub task_type: String,
    pub do_status: TaskStatus,
    pub create_at: DateTime<Utc>,
    pub payload: String,
    #[serde(default)]
    pub result: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Doing,
    Success,
    Timeout,
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Doing
    }
}

/// Per-agent record held by the coordinator.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AgentInfo {
    pub app_id: String,
    pub secret: String,
    /// Unix seconds of the first successful register.
    pub register_time: i64,
    /// Unix seconds of the most recent authenticated request.
    pub last_ping_time: i64,
    pub do_status: AgentStatus,
    pub processed_task_count: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Registered,
    Timeout,
}

/// Body of the register call.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegisterRequest {
    pub app_id: String,
    pub secret: String,
}

/// Shared secret for the register endpoint only; every other call is signed
/// with the session secret established at registration.
pub const BOOTSTRAP_SECRET: &str = "orange-forge";

pub const HEADER_APP_ID: &str = "x-forge-appid";
pub const HEADER_TIME: &str = "x-forge-time";
pub const HEADER_SIGN: &str = "x-forge-sign";

pub const API_REGISTER: &str = "/orange-forge/api/register";
pub const API_PING: &str = "/orange-forge/api/ping";
pub const API_GET_TASK: &str = "/orange-forge/api/getTask";
pub const API_REPORT_TASK: &str = "/orange-forge/api/reportTask";

/// Sliding TTL for agent records, task records, and queues.
pub const RECORD_TTL_SECS: u64 = 604_800;
/// Shorter TTL applied when signature verification refreshes an agent record.
pub const VERIFY_REFRESH_TTL_SECS: u64 = 86_400;
/// Single-delivery lock window.
pub const LOCK_TTL_SECS: u64 = 120;
/// An agent whose last authenticated request is older than this is stale.
pub const LIVENESS_THRESHOLD_SECS: i64 = 90;

pub fn agent_info_key(app_id: &str) -> String {
    format!("client:{app_id}:info")
}

pub fn task_key(app_id: &str, task_id: &str) -> String {
    format!("client:{app_id}:task:{task_id}")
}

pub fn task_queue_key(app_id: &str) -> String {
    format!("client:{app_id}:task_queue")
}

pub fn processing_queue_key(app_id: &str) -> String {
    format!("client:{app_id}:processing_queue")
}

pub fn task_lock_key(app_id: &str, task_id: &str) -> String {
    format!("lock:client:{app_id}:task:{task_id}")
}

impl Response {
    pub fn success(message: impl Into<String>, data: Value) -> Self {
        Self {
            code: CODE_SUCCESS,
            message: message.into(),
            data,
        }
    }

    pub fn failure(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: Value::Null,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == CODE_SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_roundtrip_is_identity() {
        let task = Task {
            task_id: "5f6f3a0e-8f68-4d61-9f0a-02f3a9c8a001".into(),
            task_type: "PING".into(),
            do_status: TaskStatus::Doing,
            create_at: "2026-03-01T09:30:00Z".parse().unwrap(),
            payload: json!({"a": 1}).to_string(),
            result: String::new(),
        };
        let encoded = serde_json::to_string(&task).unwrap();
        let decoded: Task = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.task_id, task.task_id);
        assert_eq!(decoded.task_type, task.task_type);
        assert_eq!(decoded.do_status, task.do_status);
        assert_eq!(decoded.create_at, task.create_at);
        assert_eq!(decoded.payload, task.payload);
        assert_eq!(decoded.result, task.result);
    }

    #[test]
    fn statuses_use_wire_literals() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Doing).unwrap(),
            "\"doing\""
        );
        assert_eq!(
            serde_json::to_string(&TaskStatus::Success).unwrap(),
            "\"success\""
        );
        assert_eq!(
            serde_json::to_string(&AgentStatus::Registered).unwrap(),
            "\"registered\""
        );
        assert_eq!(
            serde_json::to_string(&AgentStatus::Timeout).unwrap(),
            "\"timeout\""
        );
    }

    #[test]
    fn key_layout_matches_store_convention() {
        assert_eq!(agent_info_key("A1"), "client:A1:info");
        assert_eq!(task_queue_key("A1"), "client:A1:task_queue");
        assert_eq!(processing_queue_key("A1"), "client:A1:processing_queue");
        assert_eq!(task_key("A1", "t-1"), "client:A1:task:t-1");
        assert_eq!(task_lock_key("A1", "t-1"), "lock:client:A1:task:t-1");
    }

    #[test]
    fn response_envelope_defaults_data_to_null() {
        let decoded: Response =
            serde_json::from_str(r#"{"code":2,"message":"no task"}"#).unwrap();
        assert_eq!(decoded.code, CODE_RETRY);
        assert!(decoded.data.is_null());
        assert!(!decoded.is_success());
    }
}
