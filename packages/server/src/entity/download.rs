use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One delivery of an asset to an end user.
///
/// Carries the shared failure-tracking fields; the delivery surface records
/// failures here and the reliability engine picks them up.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "download")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(indexed)]
    pub tenant_id: String,

    #[sea_orm(indexed)]
    pub asset_id: Uuid,

    pub requested_by: Option<String>,

    /// One of the download failure reasons; NULL while healthy.
    pub failure_reason: Option<String>,

    #[sea_orm(default_value = 0)]
    pub failure_count: i32,

    pub last_failed_at: Option<DateTimeUtc>,

    pub escalation_ticket_id: Option<Uuid>,

    pub created_at: DateTimeUtc,

    pub deleted_at: Option<DateTimeUtc>,
}

impl ActiveModelBehavior for ActiveModel {}
