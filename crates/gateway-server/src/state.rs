use std::sync::Arc;

use gateway_core::GatewayConfig;

use crate::auth::AuthManager;
use crate::backend::{CliBackend, CompletionBackend};
use crate::sessions::SessionStore;
use crate::streaming::StreamRegistry;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub sessions: Arc<SessionStore>,
    pub backend: Arc<dyn CompletionBackend>,
    pub auth: Arc<AuthManager>,
    pub streams: Arc<StreamRegistry>,
}

impl AppState {
    /// Production wiring: real CLI backend, credentials discovered from the
    /// process environment. Spawns the session sweeper.
    pub fn new(config: GatewayConfig) -> Self {
        let backend = Arc::new(CliBackend::new(config.claude_binary.clone()));
        let auth = Arc::new(AuthManager::discover(config.api_key.clone()));
        Self::with_parts(config, backend, auth)
    }

    /// Test wiring: caller supplies the backend and auth manager.
    pub fn with_parts(
        config: GatewayConfig,
        backend: Arc<dyn CompletionBackend>,
        auth: Arc<AuthManager>,
    ) -> Self {
        let sessions = Arc::new(SessionStore::new(
            config.session_ttl,
            config.session_cleanup_interval,
        ));
        sessions.start_sweeper();

        AppState {
            config: Arc::new(config),
            sessions,
            backend,
            auth,
            streams: Arc::new(StreamRegistry::new()),
        }
    }
}
