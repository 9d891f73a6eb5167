#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// End-user visibility of an asset.
///
/// Describes only whether the asset appears in end-user views, never
/// processing progress. When the `sea-orm` feature is enabled, this enum can
/// be used directly in SeaORM entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityStatus {
    /// Shown in end-user views.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "visible"))]
    Visible,
    /// Not yet (or no longer) shown; processing may still be in flight.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "hidden"))]
    Hidden,
    /// Processing failed in a way end users are allowed to see.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "failed"))]
    Failed,
}

impl VisibilityStatus {
    pub const ALL: &'static [VisibilityStatus] = &[Self::Visible, Self::Hidden, Self::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Visible => "visible",
            Self::Hidden => "hidden",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for VisibilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for VisibilityStatus {
    fn default() -> Self {
        Self::Hidden
    }
}

/// Status of one processing stage for one asset.
///
/// Each stage (thumbnail, metadata, tagging, promotion) carries its own
/// independent instance of this state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not yet dispatched.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "pending"))]
    Pending,
    /// A worker is on it.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "processing"))]
    Processing,
    /// Stage finished successfully.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "completed"))]
    Completed,
    /// Stage failed at the domain level (not a transient queue error).
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "failed"))]
    Failed,
    /// Stage intentionally not run (e.g., plan does not include it).
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "skipped"))]
    Skipped,
}

impl StageStatus {
    pub const ALL: &'static [StageStatus] = &[
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Failed,
        Self::Skipped,
    ];

    /// Returns true once the stage can no longer change on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Returns true if the stage ended without blocking the pipeline.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Coarse pipeline cursor for one asset.
///
/// Phases are strictly ordered; reconciliation may advance the cursor but
/// must never move it backward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisPhase {
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "uploading"))]
    Uploading,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "generating_thumbnails"))]
    GeneratingThumbnails,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "extracting_metadata"))]
    ExtractingMetadata,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "tagging"))]
    Tagging,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "promoting"))]
    Promoting,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "complete"))]
    Complete,
}

impl AnalysisPhase {
    pub const ALL: &'static [AnalysisPhase] = &[
        Self::Uploading,
        Self::GeneratingThumbnails,
        Self::ExtractingMetadata,
        Self::Tagging,
        Self::Promoting,
        Self::Complete,
    ];

    /// Position in the pipeline ordering. Higher is later.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Uploading => 0,
            Self::GeneratingThumbnails => 1,
            Self::ExtractingMetadata => 2,
            Self::Tagging => 3,
            Self::Promoting => 4,
            Self::Complete => 5,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// The later of two phases. Used when advancing the cursor so it can
    /// never regress.
    pub fn max(self, other: Self) -> Self {
        if other.rank() > self.rank() { other } else { self }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::GeneratingThumbnails => "generating_thumbnails",
            Self::ExtractingMetadata => "extracting_metadata",
            Self::Tagging => "tagging",
            Self::Promoting => "promoting",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for AnalysisPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for AnalysisPhase {
    fn default() -> Self {
        Self::Uploading
    }
}

/// Error when parsing an invalid status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError {
    kind: &'static str,
    invalid: String,
}

impl ParseStatusError {
    fn new(kind: &'static str, invalid: &str) -> Self {
        Self {
            kind,
            invalid: invalid.to_string(),
        }
    }
}

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {} '{}'", self.kind, self.invalid)
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for VisibilityStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|v| v.as_str() == s)
            .copied()
            .ok_or_else(|| ParseStatusError::new("visibility status", s))
    }
}

impl FromStr for StageStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|v| v.as_str() == s)
            .copied()
            .ok_or_else(|| ParseStatusError::new("stage status", s))
    }
}

impl FromStr for AnalysisPhase {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|v| v.as_str() == s)
            .copied()
            .ok_or_else(|| ParseStatusError::new("analysis phase", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_roundtrip() {
        for status in StageStatus::ALL {
            let json = serde_json::to_string(status).unwrap();
            let parsed: StageStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(*status, parsed);
        }
        for phase in AnalysisPhase::ALL {
            let json = serde_json::to_string(phase).unwrap();
            let parsed: AnalysisPhase = serde_json::from_str(&json).unwrap();
            assert_eq!(*phase, parsed);
        }
    }

    #[test]
    fn test_from_str() {
        assert_eq!(
            "completed".parse::<StageStatus>().unwrap(),
            StageStatus::Completed
        );
        assert_eq!(
            "generating_thumbnails".parse::<AnalysisPhase>().unwrap(),
            AnalysisPhase::GeneratingThumbnails
        );
        assert!("Completed".parse::<StageStatus>().is_err());
        assert!("done".parse::<AnalysisPhase>().is_err());
    }

    #[test]
    fn test_phase_ordering() {
        let mut prev = AnalysisPhase::Uploading;
        for phase in AnalysisPhase::ALL.iter().skip(1) {
            assert!(phase.rank() > prev.rank(), "{phase} must come after {prev}");
            prev = *phase;
        }
    }

    #[test]
    fn test_phase_max_never_regresses() {
        assert_eq!(
            AnalysisPhase::Complete.max(AnalysisPhase::Uploading),
            AnalysisPhase::Complete
        );
        assert_eq!(
            AnalysisPhase::Uploading.max(AnalysisPhase::Tagging),
            AnalysisPhase::Tagging
        );
    }

    #[test]
    fn test_stage_terminality() {
        assert!(!StageStatus::Pending.is_terminal());
        assert!(!StageStatus::Processing.is_terminal());
        assert!(StageStatus::Completed.is_terminal());
        assert!(StageStatus::Failed.is_terminal());
        assert!(StageStatus::Skipped.is_terminal());
        assert!(StageStatus::Skipped.is_success());
        assert!(!StageStatus::Failed.is_success());
    }
}
