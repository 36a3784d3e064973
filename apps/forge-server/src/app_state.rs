use std::sync::Arc;

use chrono::{DateTime, Utc};
use forge_store::Store;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::rendezvous::Rendezvous;

/// Shared coordinator state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn Store>,
    rendezvous: Arc<Rendezvous>,
    config: Arc<ServerConfig>,
    server_name: String,
    session_id: String,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: ServerConfig, server_name: impl Into<String>) -> Self {
        Self {
            store,
            rendezvous: Arc::new(Rendezvous::default()),
            config: Arc::new(config),
            server_name: server_name.into(),
            session_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub(crate) fn rendezvous(&self) -> &Rendezvous {
        &self.rendezvous
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
