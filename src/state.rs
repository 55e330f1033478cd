use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::Storage;
use crate::services::orchestrator::BookingOrchestrator;

pub struct AppState {
    pub config: AppConfig,
    pub storage: Arc<dyn Storage>,
    pub orchestrator: Arc<BookingOrchestrator>,
}
