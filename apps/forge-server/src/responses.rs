use axum::Json;
use forge_protocol::{Response, CODE_FAILURE};
use serde_json::Value;

/// Success envelope. Every endpoint answers HTTP 200 and distinguishes
/// outcomes through `Response.code`.
pub(crate) fn ok(message: impl Into<String>, data: Value) -> Json<Response> {
    Json(Response::success(message, data))
}

/// Failure envelope. Outside debug mode, generic failures flatten to a
/// fixed message so internals never leak; code-2 responses keep their
/// text since callers act on them.
pub(crate) fn fail(debug: bool, code: i32, message: impl Into<String>) -> Json<Response> {
    let message = if !debug && code == CODE_FAILURE {
        "internal server error".to_string()
    } else {
        message.into()
    };
    Json(Response::failure(code, message))
}
