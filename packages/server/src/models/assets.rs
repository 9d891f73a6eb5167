use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use common::{AnalysisPhase, StageStatus, VisibilityStatus};

use crate::entity::asset;
use crate::reliability::reconcile::FieldChange;

/// Pipeline state of one asset, for the admin surface.
#[derive(Serialize, utoipa::ToSchema)]
pub struct AssetPipelineResponse {
    pub id: Uuid,
    pub tenant_id: String,
    pub brand_id: String,
    #[schema(example = "logo.png")]
    pub filename: String,
    pub visibility: VisibilityStatus,
    pub thumbnail_status: StageStatus,
    pub metadata_status: StageStatus,
    pub tagging_status: StageStatus,
    pub promotion_status: StageStatus,
    pub analysis_phase: AnalysisPhase,
    /// The raw flag bag, for debugging drift.
    pub metadata: serde_json::Value,
    pub version: i32,
    pub updated_at: DateTime<Utc>,
}

impl From<asset::Model> for AssetPipelineResponse {
    fn from(m: asset::Model) -> Self {
        Self {
            id: m.id,
            tenant_id: m.tenant_id,
            brand_id: m.brand_id,
            filename: m.filename,
            visibility: m.visibility,
            thumbnail_status: m.thumbnail_status,
            metadata_status: m.metadata_status,
            tagging_status: m.tagging_status,
            promotion_status: m.promotion_status,
            analysis_phase: m.analysis_phase,
            metadata: m.metadata,
            version: m.version,
            updated_at: m.updated_at,
        }
    }
}

/// Outcome of a manual reconciliation.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ReconcileResponse {
    /// Whether anything was corrected.
    pub updated: bool,
    /// The corrections, field by field.
    pub changes: Vec<FieldChange>,
}
