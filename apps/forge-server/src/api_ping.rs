use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use forge_protocol::{
    agent_info_key, AgentStatus, Response, CODE_FAILURE, RECORD_TTL_SECS,
};
use forge_store::Store;
use serde_json::json;
use tracing::debug;

use crate::app_state::AppState;
use crate::auth;
use crate::responses::{fail, ok};

/// Liveness beat. Keeps `do_status = registered` and rewrites the record
/// with the full sliding TTL.
#[utoipa::path(
    post,
    path = "/orange-forge/api/ping",
    tag = "Forge",
    request_body = String,
    responses((status = 200, description = "pong", body = serde_json::Value))
)]
pub(crate) async fn ping(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Json<Response> {
    let debug_mode = state.config().debug;
    let Some(args) = auth::signed_args(&headers) else {
        return fail(debug_mode, CODE_FAILURE, auth::MISSING_HEADERS);
    };
    let mut info = match auth::verify_session(&state, &args, &body).await {
        Ok(info) => info,
        Err(err) => return fail(debug_mode, CODE_FAILURE, err.to_string()),
    };
    debug!(app_id = %args.app_id, "ping");

    info.last_ping_time = Utc::now().timestamp();
    info.do_status = AgentStatus::Registered;
    let encoded = match serde_json::to_vec(&info) {
        Ok(encoded) => encoded,
        Err(err) => return fail(debug_mode, CODE_FAILURE, err.to_string()),
    };
    if let Err(err) = state
        .store()
        .set_ex(&agent_info_key(&args.app_id), RECORD_TTL_SECS, &encoded)
        .await
    {
        return fail(debug_mode, CODE_FAILURE, err.to_string());
    }
    ok("pong", json!("pong"))
}
