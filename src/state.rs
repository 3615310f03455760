//! Shared application state, injected into every handler via axum's `State`
//! extractor.

use crate::config::Config;
use crate::db::Pool;
use crate::logbus::LogBus;
use crate::ports::PortAllocator;
use crate::provider::{anthropic::AnthropicProvider, null::NullProvider, ModelProvider};
use crate::supervisor::ProcessSupervisor;
use axum::extract::FromRef;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// A registered, in-flight generation stream (§3's Stream Session).
pub struct StreamSession {
    pub chat_id: i64,
    pub owner_user_id: i64,
    pub cancel: CancellationToken,
}

#[derive(Clone, Default)]
pub struct StreamSessionRegistry {
    sessions: Arc<Mutex<HashMap<String, Arc<StreamSession>>>>,
}

impl StreamSessionRegistry {
    pub async fn register(&self, stream_id: String, session: StreamSession) {
        self.sessions.lock().await.insert(stream_id, Arc::new(session));
    }

    pub async fn cancel(&self, stream_id: &str) -> bool {
        if let Some(session) = self.sessions.lock().await.remove(stream_id) {
            session.cancel.cancel();
            true
        } else {
            false
        }
    }

    pub async fn remove(&self, stream_id: &str) {
        self.sessions.lock().await.remove(stream_id);
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Pool,
    pub log_bus: LogBus,
    pub ports: Arc<PortAllocator>,
    pub supervisor: Arc<ProcessSupervisor>,
    pub streams: StreamSessionRegistry,
}

impl AppState {
    pub fn new(config: Config, db: Pool) -> Self {
        let config = Arc::new(config);
        let ports = Arc::new(PortAllocator::new(config.process.base_port, config.process.max_ports));
        let log_bus = LogBus::new();
        let supervisor = Arc::new(ProcessSupervisor::new(
            config.process.clone(),
            ports.clone(),
            log_bus.clone(),
        ));

        Self {
            config,
            db,
            log_bus,
            ports,
            supervisor,
            streams: StreamSessionRegistry::default(),
        }
    }

    /// Build a model client for the given provider name, using the
    /// configured credential. Falls back to [`NullProvider`] only when no
    /// provider is configured at all, so local development without API keys
    /// still exercises the pipeline end to end.
    pub fn provider_for(&self, provider: &str) -> Result<Box<dyn ModelProvider>, crate::error::AppError> {
        match self.config.providers.for_provider(provider) {
            Some(key) => Ok(Box::new(AnthropicProvider::new(key.to_string()))),
            None => {
                if provider == "null" {
                    Ok(Box::new(NullProvider::echoing_text("")))
                } else {
                    Err(crate::error::AppError::Validation(format!(
                        "no credential configured for provider '{provider}'"
                    )))
                }
            }
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        (*state.config).clone()
    }
}
