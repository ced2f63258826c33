use std::sync::Arc;

use crate::routes::auth::AuthConfig;
use crate::services::orchestrator::JobOrchestrator;
use crate::services::recorder::OutcomeRecorder;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<JobOrchestrator>,
    pub recorder: Arc<OutcomeRecorder>,
    pub auth: Arc<AuthConfig>,
}

impl AppState {
    pub fn new(orchestrator: JobOrchestrator, recorder: OutcomeRecorder, auth: AuthConfig) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            recorder: Arc::new(recorder),
            auth: Arc::new(auth),
        }
    }
}
