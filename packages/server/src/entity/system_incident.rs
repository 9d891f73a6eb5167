use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One detected anomaly in the processing pipeline.
///
/// `open_signature` carries the caller's dedup signature while the incident
/// is unresolved and is cleared on resolve; the unique constraint on it is
/// what guarantees at most one open incident per signature, even under
/// concurrent `record()` calls.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "system_incident")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// One of: asset, job, derivative, upload, download.
    #[sea_orm(indexed)]
    pub source_type: String,

    #[sea_orm(indexed)]
    pub source_id: Option<String>,

    #[sea_orm(indexed)]
    pub tenant_id: Option<String>,

    /// One of: critical, error, warning, info.
    #[sea_orm(indexed)]
    pub severity: String,

    pub title: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub message: Option<String>,

    /// Free-form bag: repair_attempts counter, ticket_id once escalated,
    /// caller-supplied context.
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: serde_json::Value,

    pub retryable: bool,

    pub requires_support: bool,

    #[sea_orm(default_value = false)]
    pub auto_resolved: bool,

    /// Caller-supplied dedup key, kept for history after resolution.
    pub unique_signature: Option<String>,

    /// Equal to `unique_signature` while unresolved, NULL afterwards.
    #[sea_orm(unique)]
    pub open_signature: Option<String>,

    pub detected_at: DateTimeUtc,

    /// NULL while the incident is open.
    pub resolved_at: Option<DateTimeUtc>,
}

impl ActiveModelBehavior for ActiveModel {}
