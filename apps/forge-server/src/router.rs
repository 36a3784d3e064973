use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::{api_meta, api_ping, api_register, api_tasks};

/// Route path constants (single source to reduce drift).
pub mod paths {
    pub const HEALTHZ: &str = "/healthz";
    pub const ABOUT: &str = "/about";
    pub const SPEC_OPENAPI: &str = "/spec/openapi.json";
    pub const REGISTER: &str = forge_protocol::API_REGISTER;
    pub const PING: &str = forge_protocol::API_PING;
    pub const GET_TASK: &str = forge_protocol::API_GET_TASK;
    pub const REPORT_TASK: &str = forge_protocol::API_REPORT_TASK;
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(paths::HEALTHZ, get(api_meta::healthz))
        .route(paths::ABOUT, get(api_meta::about))
        .route(paths::SPEC_OPENAPI, get(api_meta::spec_openapi))
        .route(paths::REGISTER, post(api_register::register))
        .route(paths::PING, post(api_ping::ping))
        .route(paths::GET_TASK, post(api_tasks::get_task))
        .route(paths::REPORT_TASK, post(api_tasks::report_task))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
