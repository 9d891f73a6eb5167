pub mod classification;
pub mod failure_events;
pub mod stage_results;
pub mod upload_finalized;

pub use classification::consume_classification_requests;
pub use failure_events::consume_failure_events;
pub use stage_results::consume_stage_results;
pub use upload_finalized::consume_upload_finalized;

use std::sync::Arc;

use mq::Mq;
use sea_orm::DatabaseConnection;

use common::config::{ClassifierConfig, MqAppConfig};

use crate::pipeline::Pipeline;
use crate::reliability::EscalationService;

/// Everything a consumer loop needs; built once in `main` and shared.
pub struct ConsumerCtx {
    pub db: DatabaseConnection,
    pub mq: Arc<Mq>,
    pub pipeline: Pipeline,
    pub escalation: EscalationService,
    pub queues: MqAppConfig,
    pub classifier: ClassifierConfig,
}
