use std::sync::Arc;

use ld_infra::Orchestrator;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub config: AppConfig,
}
