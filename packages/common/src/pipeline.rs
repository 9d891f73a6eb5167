use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::incident::IncidentSource;
use crate::mq::Message;
use crate::status::AnalysisPhase;

/// One discrete unit of asset processing.
///
/// Stages for one asset run strictly in this order; there is no ordering
/// across assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Thumbnail,
    Metadata,
    Tagging,
    Promotion,
}

impl PipelineStage {
    pub const ALL: &'static [PipelineStage] = &[
        Self::Thumbnail,
        Self::Metadata,
        Self::Tagging,
        Self::Promotion,
    ];

    /// First stage of every pipeline.
    pub fn first() -> Self {
        Self::Thumbnail
    }

    /// The stage dispatched after this one completes, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Thumbnail => Some(Self::Metadata),
            Self::Metadata => Some(Self::Tagging),
            Self::Tagging => Some(Self::Promotion),
            Self::Promotion => None,
        }
    }

    /// The analysis phase an asset is in while this stage runs.
    pub fn phase(&self) -> AnalysisPhase {
        match self {
            Self::Thumbnail => AnalysisPhase::GeneratingThumbnails,
            Self::Metadata => AnalysisPhase::ExtractingMetadata,
            Self::Tagging => AnalysisPhase::Tagging,
            Self::Promotion => AnalysisPhase::Promoting,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thumbnail => "thumbnail",
            Self::Metadata => "metadata",
            Self::Tagging => "tagging",
            Self::Promotion => "promotion",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|v| v.as_str() == s)
            .copied()
            .ok_or_else(|| {
                format!("Invalid stage '{s}'. Must be one of thumbnail, metadata, tagging, promotion")
            })
    }
}

/// A stage job message sent to the worker queue.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageJob {
    /// Job identifier (UUID).
    pub job_id: String,
    pub asset_id: Uuid,
    pub tenant_id: String,
    pub brand_id: String,
    pub stage: PipelineStage,
    /// Source filename, used by metadata extraction for type sniffing.
    pub filename: String,
    /// sha-256 hex of the stored bytes, when known.
    pub content_hash: Option<String>,
}

impl StageJob {
    pub fn new(
        asset_id: Uuid,
        tenant_id: impl Into<String>,
        brand_id: impl Into<String>,
        stage: PipelineStage,
        filename: impl Into<String>,
        content_hash: Option<String>,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            asset_id,
            tenant_id: tenant_id.into(),
            brand_id: brand_id.into(),
            stage,
            filename: filename.into(),
            content_hash,
        }
    }
}

impl Message for StageJob {
    fn message_type() -> &'static str {
        "stage_job"
    }

    fn message_id(&self) -> &str {
        &self.job_id
    }
}

/// How a stage job ended.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageOutcome {
    Completed {
        /// Stage-produced keys merged into the asset's metadata bag
        /// (e.g. `thumbnails`, `extracted`, `tags`).
        artifacts: serde_json::Value,
    },
    Failed {
        /// Domain-specific failure reason string (see the reason enums).
        reason: String,
        detail: String,
        retryable: bool,
    },
}

/// A stage result message sent back to the server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageResult {
    pub job_id: String,
    pub asset_id: Uuid,
    pub tenant_id: String,
    pub stage: PipelineStage,
    pub outcome: StageOutcome,
}

impl Message for StageResult {
    fn message_type() -> &'static str {
        "stage_result"
    }

    fn message_id(&self) -> &str {
        &self.job_id
    }
}

/// Published by the upload surface once the last byte of a session arrived.
///
/// Consuming this message is what starts an asset's pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadFinalized {
    /// Sessions finalize at most once; the session ID doubles as the
    /// message key.
    pub event_id: String,
    pub session_id: Uuid,
    pub asset_id: Uuid,
    pub tenant_id: String,
    pub brand_id: String,
    pub filename: String,
    pub size_bytes: i64,
    /// Checksum the client declared up front.
    pub checksum_expected: String,
    /// Checksum computed over the stored bytes.
    pub checksum_actual: String,
}

impl UploadFinalized {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: Uuid,
        asset_id: Uuid,
        tenant_id: impl Into<String>,
        brand_id: impl Into<String>,
        filename: impl Into<String>,
        size_bytes: i64,
        checksum_expected: impl Into<String>,
        checksum_actual: impl Into<String>,
    ) -> Self {
        Self {
            event_id: session_id.to_string(),
            session_id,
            asset_id,
            tenant_id: tenant_id.into(),
            brand_id: brand_id.into(),
            filename: filename.into(),
            size_bytes,
            checksum_expected: checksum_expected.into(),
            checksum_actual: checksum_actual.into(),
        }
    }
}

impl Message for UploadFinalized {
    fn message_type() -> &'static str {
        "upload_finalized"
    }

    fn message_id(&self) -> &str {
        &self.event_id
    }
}

/// Emitted after a stage failure has been recorded.
///
/// Failure handling and follow-up triage are decoupled: the stage-result
/// consumer only records and emits this event; a separate subscriber decides
/// whether to enqueue classification or escalate directly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FailureReported {
    pub event_id: String,
    pub source_type: IncidentSource,
    pub source_id: String,
    pub tenant_id: String,
    pub asset_id: Option<Uuid>,
    pub stage: Option<PipelineStage>,
    pub failure_reason: String,
    pub failure_count: i32,
    pub detail: String,
    /// Incident recorded for this failure, when one was.
    pub incident_id: Option<Uuid>,
}

impl Message for FailureReported {
    fn message_type() -> &'static str {
        "failure_reported"
    }

    fn message_id(&self) -> &str {
        &self.event_id
    }
}

/// Request for the classification agent to triage a failure.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub request_id: String,
    pub source_type: IncidentSource,
    pub source_id: String,
    pub tenant_id: String,
    pub incident_id: Option<Uuid>,
    pub failure_reason: String,
    pub failure_count: i32,
    /// Raw failure trace. Truncated before it is embedded in a prompt.
    pub trace: String,
}

impl Message for ClassificationRequest {
    fn message_type() -> &'static str {
        "classification_request"
    }

    fn message_id(&self) -> &str {
        &self.request_id
    }
}

/// Fire-and-forget audit event, appended to the activity queue and never read
/// back by the pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub event_id: String,
    /// Dotted topic, e.g. "pipeline.started", "incident.recorded".
    pub topic: String,
    pub tenant_id: Option<String>,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            topic: topic.into(),
            tenant_id: None,
            payload,
            occurred_at: Utc::now(),
        }
    }

    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}

impl Message for ActivityEvent {
    fn message_type() -> &'static str {
        "activity_event"
    }

    fn message_id(&self) -> &str {
        &self.event_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_chain_ends_at_promotion() {
        let mut stage = PipelineStage::first();
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            seen.push(next);
            stage = next;
        }
        assert_eq!(seen, PipelineStage::ALL);
        assert_eq!(stage, PipelineStage::Promotion);
    }

    #[test]
    fn stage_phase_is_monotonic() {
        let mut prev = PipelineStage::first().phase();
        for stage in PipelineStage::ALL.iter().skip(1) {
            assert!(stage.phase().rank() > prev.rank());
            prev = stage.phase();
        }
    }

    #[test]
    fn stage_result_roundtrip() {
        let result = StageResult {
            job_id: "j-1".into(),
            asset_id: Uuid::new_v4(),
            tenant_id: "t-1".into(),
            stage: PipelineStage::Thumbnail,
            outcome: StageOutcome::Failed {
                reason: "encoder_crashed".into(),
                detail: "signal 11".into(),
                retryable: true,
            },
        };
        let json = serde_json::to_string(&result).unwrap();
        let parsed: StageResult = serde_json::from_str(&json).unwrap();
        match parsed.outcome {
            StageOutcome::Failed { reason, retryable, .. } => {
                assert_eq!(reason, "encoder_crashed");
                assert!(retryable);
            }
            _ => panic!("expected Failed outcome"),
        }
    }
}
