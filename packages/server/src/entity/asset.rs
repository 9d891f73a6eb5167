use common::{AnalysisPhase, StageStatus, VisibilityStatus};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One uploaded file under processing.
///
/// Per-stage progress lives in the typed status columns; `metadata` is an
/// open bag for derivative keys and auxiliary flags
/// (`thumbnails_generated`, `metadata_extracted`, `processing_failed`,
/// `promotion_failed`, `failure_reason`, `pipeline_completed_at`,
/// `visibility_override`). The typed columns are authoritative;
/// reconciliation repairs drift between the two.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "asset")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(indexed)]
    pub tenant_id: String,

    #[sea_orm(indexed)]
    pub brand_id: String,

    pub filename: String,

    /// sha-256 hex of the stored bytes, set at upload finalize.
    pub content_hash: Option<String>,

    pub content_type: Option<String>,

    pub size_bytes: Option<i64>,

    /// End-user visibility only. Never reflects processing progress.
    #[sea_orm(indexed)]
    pub visibility: VisibilityStatus,

    pub thumbnail_status: StageStatus,
    pub metadata_status: StageStatus,
    pub tagging_status: StageStatus,
    pub promotion_status: StageStatus,

    /// Coarse pipeline cursor. Only ever advances.
    #[sea_orm(indexed)]
    pub analysis_phase: AnalysisPhase,

    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: serde_json::Value,

    /// Bumped on every pipeline write; guards read-modify-write cycles.
    pub version: i32,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,

    /// Soft delete. Hard deletes only happen via explicit destructive admin
    /// action.
    pub deleted_at: Option<DateTimeUtc>,
}

impl ActiveModelBehavior for ActiveModel {}
