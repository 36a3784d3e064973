use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chrono::SecondsFormat;
use serde_json::json;

use crate::app_state::AppState;
use crate::router::paths;

/// Health probe.
#[utoipa::path(
    get,
    path = "/healthz",
    tag = "Meta",
    responses((status = 200, description = "Service healthy", body = serde_json::Value))
)]
pub(crate) async fn healthz() -> impl IntoResponse {
    Json(json!({"ok": true}))
}

/// Service metadata and endpoint index.
#[utoipa::path(
    get,
    path = "/about",
    tag = "Meta",
    responses((status = 200, description = "Service metadata", body = serde_json::Value))
)]
pub(crate) async fn about(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "server_name": state.server_name(),
        "session_id": state.session_id(),
        "run_at": state.started_at().to_rfc3339_opts(SecondsFormat::Secs, true),
        "endpoints": [
            format!("GET {}", paths::HEALTHZ),
            format!("GET {}", paths::ABOUT),
            format!("GET {}", paths::SPEC_OPENAPI),
            format!("POST {}", paths::REGISTER),
            format!("POST {}", paths::PING),
            format!("POST {}", paths::GET_TASK),
            format!("POST {}", paths::REPORT_TASK),
        ],
    }))
}

/// Generated OpenAPI document.
pub(crate) async fn spec_openapi() -> impl IntoResponse {
    Json(crate::openapi::document())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::test_support::test_state;
    use axum::response::IntoResponse;
    use http_body_util::BodyExt;
    use serde_json::Value;

    #[tokio::test]
    async fn about_reports_session_identity() {
        let state = test_state(ServerConfig::default());
        let session_id = state.session_id().to_string();
        let response = about(State(state)).await.into_response();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["session_id"], session_id.as_str());
        assert_eq!(json["server_name"], "test");
        assert!(json["endpoints"]
            .as_array()
            .unwrap()
            .iter()
            .any(|e| e == "POST /orange-forge/api/getTask"));
    }
}
