use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Failure-tracking row for derivative generation on one asset.
///
/// One row per (asset, stage); repeat failures bump `failure_count` rather
/// than inserting new rows.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "asset_derivative_failure")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(indexed)]
    pub tenant_id: String,

    #[sea_orm(indexed)]
    pub asset_id: Uuid,

    /// Pipeline stage the failure belongs to (thumbnail, metadata, tagging,
    /// promotion).
    pub stage: String,

    /// One of the derivative failure reasons.
    pub failure_reason: String,

    #[sea_orm(column_type = "Text")]
    pub detail: String,

    #[sea_orm(default_value = 0)]
    pub failure_count: i32,

    pub last_failed_at: DateTimeUtc,

    pub escalation_ticket_id: Option<Uuid>,

    pub created_at: DateTimeUtc,

    pub deleted_at: Option<DateTimeUtc>,
}

impl ActiveModelBehavior for ActiveModel {}
