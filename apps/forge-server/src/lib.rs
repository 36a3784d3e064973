//! Coordinator side of the forge dispatch fabric.
//!
//! Local callers hand tasks to [`AppState::run_single_task`]; agents reach
//! the signed HTTP surface built by [`build_router`]. All persistent state
//! lives behind the [`forge_store::Store`] abstraction.

mod api_meta;
mod api_ping;
mod api_register;
mod api_tasks;
mod app_state;
mod auth;
mod config;
mod dispatch;
mod openapi;
mod rendezvous;
mod responses;
mod router;
#[cfg(test)]
mod test_support;

pub use app_state::AppState;
pub use config::ServerConfig;
pub use dispatch::{DispatchError, SingleTaskOutcome};
pub use router::{build_router, paths};
