pub mod config;
pub mod failure;
pub mod hash;
pub mod incident;
pub mod mq;
pub mod pipeline;
pub mod retry;
pub mod status;

pub use failure::{
    CLASSIFICATION_THRESHOLD, DerivativeFailureReason, DownloadFailureReason,
    ESCALATION_THRESHOLD, UploadFailureReason,
};
pub use hash::ContentHash;
pub use incident::{FailureReport, IncidentSeverity, IncidentSource, TriageSeverity};
pub use pipeline::{
    ActivityEvent, ClassificationRequest, FailureReported, PipelineStage, StageJob, StageOutcome,
    StageResult, UploadFinalized,
};
pub use status::{AnalysisPhase, StageStatus, VisibilityStatus};
