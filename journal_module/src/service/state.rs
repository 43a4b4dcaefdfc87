use std::sync::Arc;

use crate::ingestion::IngestionPipeline;

use super::config::ServiceConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub pipeline: Arc<IngestionPipeline>,
}
