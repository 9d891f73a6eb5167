use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::system_incident;
use crate::incidents::IncidentStats;
use crate::reliability::reconcile::FieldChange;

use super::shared::Pagination;

/// Query parameters for listing incidents.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListIncidentParams {
    /// Filter by source type (asset, job, derivative, upload, download).
    #[param(example = "asset")]
    pub source_type: Option<String>,
    /// Filter by severity (critical, error, warning, info).
    #[param(example = "error")]
    pub severity: Option<String>,
    /// Filter by resolved status.
    #[param(example = false)]
    pub resolved: Option<bool>,
    /// Page number (1-indexed).
    #[param(example = 1)]
    pub page: Option<u64>,
    /// Items per page (1-100, default 20).
    #[param(example = 20)]
    pub per_page: Option<u64>,
}

/// Query parameters for the triage view.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct TriageParams {
    /// Maximum incidents to return (1-500, default 100).
    #[param(example = 100)]
    pub limit: Option<u64>,
}

/// Incident record as persisted and queried.
#[derive(Serialize, utoipa::ToSchema)]
pub struct IncidentResponse {
    pub id: Uuid,
    #[schema(example = "asset")]
    pub source_type: String,
    pub source_id: Option<String>,
    pub tenant_id: Option<String>,
    #[schema(example = "error")]
    pub severity: String,
    #[schema(example = "Asset processing stalled")]
    pub title: String,
    pub message: Option<String>,
    /// Free-form context: repair attempts, triage verdicts, ticket linkage.
    pub metadata: serde_json::Value,
    pub retryable: bool,
    pub requires_support: bool,
    pub auto_resolved: bool,
    pub unique_signature: Option<String>,
    #[schema(example = "2025-09-01T08:00:00Z")]
    pub detected_at: DateTime<Utc>,
    /// Null while the incident is open.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<system_incident::Model> for IncidentResponse {
    fn from(m: system_incident::Model) -> Self {
        Self {
            id: m.id,
            source_type: m.source_type,
            source_id: m.source_id,
            tenant_id: m.tenant_id,
            severity: m.severity,
            title: m.title,
            message: m.message,
            metadata: m.metadata,
            retryable: m.retryable,
            requires_support: m.requires_support,
            auto_resolved: m.auto_resolved,
            unique_signature: m.unique_signature,
            detected_at: m.detected_at,
            resolved_at: m.resolved_at,
        }
    }
}

/// Paginated list of incidents.
#[derive(Serialize, utoipa::ToSchema)]
pub struct IncidentListResponse {
    pub data: Vec<IncidentResponse>,
    pub pagination: Pagination,
}

/// Incident log statistics.
#[derive(Serialize, utoipa::ToSchema)]
pub struct IncidentStatsResponse {
    /// Total unresolved (open) incidents.
    #[schema(example = 5)]
    pub total_unresolved: u64,
    /// Total resolved incidents.
    #[schema(example = 42)]
    pub total_resolved: u64,
    /// Unresolved count by source type.
    pub unresolved_by_source: HashMap<String, u64>,
    /// Unresolved count by severity.
    pub unresolved_by_severity: HashMap<String, u64>,
}

impl From<IncidentStats> for IncidentStatsResponse {
    fn from(s: IncidentStats) -> Self {
        Self {
            total_unresolved: s.total_unresolved,
            total_resolved: s.total_resolved,
            unresolved_by_source: s.unresolved_by_source,
            unresolved_by_severity: s.unresolved_by_severity,
        }
    }
}

/// Outcome of a manual recovery attempt.
#[derive(Serialize, utoipa::ToSchema)]
pub struct RecoveryResponse {
    /// Whether repair resolved the incident.
    pub resolved: bool,
    /// Fields the repair corrected.
    pub changes: Vec<FieldChange>,
}

/// Request body for bulk-resolving incidents.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct BulkResolveRequest {
    pub incident_ids: Vec<Uuid>,
}

/// Response for bulk-resolve.
#[derive(Serialize, utoipa::ToSchema)]
pub struct BulkResolveResponse {
    /// Number of incidents transitioned to resolved.
    #[schema(example = 3)]
    pub resolved: usize,
}
