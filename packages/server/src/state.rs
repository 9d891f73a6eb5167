use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::auth::Authorizer;
use crate::config::AppConfig;
use crate::reliability::{EscalationService, ReliabilityEngine};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: AppConfig,
    pub authorizer: Arc<dyn Authorizer>,
    pub engine: ReliabilityEngine,
    pub escalation: EscalationService,
}
