use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One client upload in flight (or finished).
///
/// Carries the shared failure-tracking fields: `failure_reason`,
/// `failure_count`, `last_failed_at`, `escalation_ticket_id`.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "upload_session")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(indexed)]
    pub tenant_id: String,

    /// Asset the session produces. Set before finalize.
    #[sea_orm(indexed)]
    pub asset_id: Uuid,

    pub filename: String,

    /// One of: open, finalizing, finalized, failed.
    #[sea_orm(indexed)]
    pub state: String,

    pub bytes_expected: i64,

    pub bytes_received: i64,

    pub checksum_expected: Option<String>,

    pub checksum_actual: Option<String>,

    /// One of the upload failure reasons; NULL until a failure happens.
    pub failure_reason: Option<String>,

    /// Monotonic count of domain-level failures.
    #[sea_orm(default_value = 0)]
    pub failure_count: i32,

    pub last_failed_at: Option<DateTimeUtc>,

    pub escalation_ticket_id: Option<Uuid>,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,

    pub deleted_at: Option<DateTimeUtc>,
}

impl ActiveModelBehavior for ActiveModel {}

/// Upload session lifecycle states.
pub struct SessionState;

impl SessionState {
    pub const OPEN: &'static str = "open";
    pub const FINALIZING: &'static str = "finalizing";
    pub const FINALIZED: &'static str = "finalized";
    pub const FAILED: &'static str = "failed";
}
