use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use forge_protocol::{
    agent_info_key, AgentInfo, AgentStatus, RegisterRequest, Response, CODE_FAILURE,
    RECORD_TTL_SECS,
};
use forge_store::Store;
use tracing::info;

use crate::app_state::AppState;
use crate::auth;
use crate::responses::{fail, ok};

/// Create or refresh an agent record. Signed with the bootstrap secret;
/// the session secret carried in the body takes over from here on.
#[utoipa::path(
    post,
    path = "/orange-forge/api/register",
    tag = "Forge",
    request_body = String,
    responses(
        (status = 200, description = "Envelope with the stored record, secret masked", body = serde_json::Value)
    )
)]
pub(crate) async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Json<Response> {
    let debug = state.config().debug;
    let Some(args) = auth::signed_args(&headers) else {
        return fail(debug, CODE_FAILURE, auth::MISSING_HEADERS);
    };
    if let Err(err) = auth::verify_bootstrap(&args, &body) {
        return fail(debug, CODE_FAILURE, err.to_string());
    }

    let req: RegisterRequest = match serde_json::from_str(&body) {
        Ok(req) => req,
        Err(_) => return fail(debug, CODE_FAILURE, "invalid JSON"),
    };
    if req.app_id.is_empty() || req.secret.is_empty() {
        return fail(debug, CODE_FAILURE, "app_id and secret are required");
    }

    let key = agent_info_key(&req.app_id);
    let now = Utc::now().timestamp();
    let mut info = match state.store().get(&key).await {
        Ok(Some(raw)) => match serde_json::from_slice::<AgentInfo>(&raw) {
            Ok(prev) => prev,
            Err(_) => fresh_record(&req, now),
        },
        Ok(None) => fresh_record(&req, now),
        Err(err) => return fail(debug, CODE_FAILURE, err.to_string()),
    };
    // Re-registering keeps register_time and the processed counter but
    // re-asserts liveness and may rotate the session secret.
    info.app_id = req.app_id.clone();
    info.secret = req.secret;
    info.last_ping_time = now;
    info.do_status = AgentStatus::Registered;

    let encoded = match serde_json::to_vec(&info) {
        Ok(encoded) => encoded,
        Err(err) => return fail(debug, CODE_FAILURE, err.to_string()),
    };
    if let Err(err) = state.store().set_ex(&key, RECORD_TTL_SECS, &encoded).await {
        return fail(debug, CODE_FAILURE, err.to_string());
    }
    info!(app_id = %info.app_id, "agent registered");

    info.secret = "***".to_string();
    match serde_json::to_value(&info) {
        Ok(data) => ok("registration successful", data),
        Err(err) => fail(debug, CODE_FAILURE, err.to_string()),
    }
}

fn fresh_record(req: &RegisterRequest, now: i64) -> AgentInfo {
    AgentInfo {
        app_id: req.app_id.clone(),
        secret: req.secret.clone(),
        register_time: now,
        last_ping_time: now,
        do_status: AgentStatus::Registered,
        processed_task_count: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::test_support::{signed_headers, test_state};
    use forge_protocol::BOOTSTRAP_SECRET;

    #[tokio::test]
    async fn register_stores_record_and_masks_secret() {
        let state = test_state(ServerConfig::default());
        let body = r#"{"app_id":"A1","secret":"s1"}"#.to_string();
        let headers = signed_headers("A1", BOOTSTRAP_SECRET, &body);
        let resp = register(State(state.clone()), headers, body).await.0;
        assert!(resp.is_success(), "unexpected: {}", resp.message);
        assert_eq!(resp.data["app_id"], "A1");
        assert_eq!(resp.data["secret"], "***");
        assert_eq!(resp.data["do_status"], "registered");

        let raw = state
            .store()
            .get(&agent_info_key("A1"))
            .await
            .unwrap()
            .unwrap();
        let stored: AgentInfo = serde_json::from_slice(&raw).unwrap();
        assert_eq!(stored.secret, "s1");
        assert_eq!(stored.register_time, stored.last_ping_time);
    }

    #[tokio::test]
    async fn reregistering_preserves_register_time() {
        let state = test_state(ServerConfig::default());
        let body = r#"{"app_id":"A1","secret":"s1"}"#.to_string();
        let headers = signed_headers("A1", BOOTSTRAP_SECRET, &body);
        assert!(register(State(state.clone()), headers, body).await.0.is_success());

        let raw = state
            .store()
            .get(&agent_info_key("A1"))
            .await
            .unwrap()
            .unwrap();
        let first: AgentInfo = serde_json::from_slice(&raw).unwrap();

        let body = r#"{"app_id":"A1","secret":"s2"}"#.to_string();
        let headers = signed_headers("A1", BOOTSTRAP_SECRET, &body);
        assert!(register(State(state.clone()), headers, body).await.0.is_success());

        let raw = state
            .store()
            .get(&agent_info_key("A1"))
            .await
            .unwrap()
            .unwrap();
        let second: AgentInfo = serde_json::from_slice(&raw).unwrap();
        assert_eq!(second.register_time, first.register_time);
        assert!(second.last_ping_time >= first.last_ping_time);
        assert_eq!(second.secret, "s2");
    }

    #[tokio::test]
    async fn wrong_bootstrap_signature_is_rejected() {
        let state = test_state(ServerConfig { debug: true, ..ServerConfig::default() });
        let body = r#"{"app_id":"A1","secret":"s1"}"#.to_string();
        let headers = signed_headers("A1", "not-the-bootstrap", &body);
        let resp = register(State(state), headers, body).await.0;
        assert_eq!(resp.code, CODE_FAILURE);
        assert_eq!(resp.message, "signature verification failed");
    }

    #[tokio::test]
    async fn empty_credentials_are_rejected() {
        let state = test_state(ServerConfig { debug: true, ..ServerConfig::default() });
        let body = r#"{"app_id":"","secret":"s1"}"#.to_string();
        let headers = signed_headers("A1", BOOTSTRAP_SECRET, &body);
        let resp = register(State(state), headers, body).await.0;
        assert_eq!(resp.code, CODE_FAILURE);
        assert_eq!(resp.message, "app_id and secret are required");
    }

    #[tokio::test]
    async fn missing_headers_are_rejected() {
        let state = test_state(ServerConfig { debug: true, ..ServerConfig::default() });
        let resp = register(State(state), HeaderMap::new(), String::new())
            .await
            .0;
        assert_eq!(resp.code, CODE_FAILURE);
        assert_eq!(resp.message, auth::MISSING_HEADERS);
    }
}
