use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue};
use forge_core::{signing, timefmt};
use forge_protocol::{HEADER_APP_ID, HEADER_SIGN, HEADER_TIME};
use forge_store::MemoryStore;

use crate::app_state::AppState;
use crate::config::ServerConfig;

pub(crate) fn test_state(config: ServerConfig) -> AppState {
    AppState::new(Arc::new(MemoryStore::new()), config, "test")
}

/// Headers for one signed call, timestamped now.
pub(crate) fn signed_headers(app_id: &str, secret: &str, body: &str) -> HeaderMap {
    let date_time = timefmt::now_string();
    let sign = signing::compute_signature(app_id, secret, body, &date_time);
    let mut headers = HeaderMap::new();
    headers.insert(HEADER_APP_ID, HeaderValue::from_str(app_id).unwrap());
    headers.insert(HEADER_TIME, HeaderValue::from_str(&date_time).unwrap());
    headers.insert(HEADER_SIGN, HeaderValue::from_str(&sign).unwrap());
    headers
}
