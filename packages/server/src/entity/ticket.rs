use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Human-facing support ticket, the terminal artifact of an unresolved
/// escalation. Created exactly once per escalation source.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ticket")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(indexed)]
    pub tenant_id: String,

    pub subject: String,

    #[sea_orm(column_type = "Text")]
    pub body: String,

    pub severity: String,

    pub source_type: String,

    pub source_id: String,

    /// Incident that escalated into this ticket, when one exists.
    #[sea_orm(indexed)]
    pub incident_id: Option<Uuid>,

    /// Agent-produced triage summary, when classification ran.
    #[sea_orm(column_type = "Text", nullable)]
    pub ai_summary: Option<String>,

    /// One of: open, closed.
    pub status: String,

    pub created_at: DateTimeUtc,

    pub closed_at: Option<DateTimeUtc>,
}

impl ActiveModelBehavior for ActiveModel {}
