use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::ticket;

use super::shared::Pagination;

/// Query parameters for listing tickets.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListTicketParams {
    /// Filter by status (open, closed).
    #[param(example = "open")]
    pub status: Option<String>,
    /// Page number (1-indexed).
    #[param(example = 1)]
    pub page: Option<u64>,
    /// Items per page (1-100, default 20).
    #[param(example = 20)]
    pub per_page: Option<u64>,
}

/// Support ticket as seen by the admin surface.
#[derive(Serialize, utoipa::ToSchema)]
pub struct TicketResponse {
    pub id: Uuid,
    pub tenant_id: String,
    #[schema(example = "Derivative (thumbnail) for asset ... failing: encoder_crashed")]
    pub subject: String,
    pub body: String,
    #[schema(example = "error")]
    pub severity: String,
    #[schema(example = "derivative")]
    pub source_type: String,
    pub source_id: String,
    pub incident_id: Option<Uuid>,
    /// Agent-produced triage summary, when classification ran.
    pub ai_summary: Option<String>,
    #[schema(example = "open")]
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl From<ticket::Model> for TicketResponse {
    fn from(m: ticket::Model) -> Self {
        Self {
            id: m.id,
            tenant_id: m.tenant_id,
            subject: m.subject,
            body: m.body,
            severity: m.severity,
            source_type: m.source_type,
            source_id: m.source_id,
            incident_id: m.incident_id,
            ai_summary: m.ai_summary,
            status: m.status,
            created_at: m.created_at,
            closed_at: m.closed_at,
        }
    }
}

/// Paginated list of tickets.
#[derive(Serialize, utoipa::ToSchema)]
pub struct TicketListResponse {
    pub data: Vec<TicketResponse>,
    pub pagination: Pagination,
}
