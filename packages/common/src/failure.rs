use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A failure-tracking entity escalates to a support ticket once its
/// failure count reaches this value.
pub const ESCALATION_THRESHOLD: i32 = 3;

/// AI triage of a failure is requested once the failure count reaches this
/// value (or earlier, for reasons in the stage's critical set).
pub const CLASSIFICATION_THRESHOLD: i32 = 2;

/// Why an upload session failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UploadFailureReason {
    /// Byte transfer aborted or the client went away mid-upload.
    TransferFailed,
    /// All bytes arrived but assembling the asset record failed.
    FinalizeFailed,
    /// Initial thumbnail pass failed during finalize.
    ThumbnailFailed,
    /// Uploaded bytes do not match the declared checksum.
    ChecksumMismatch,
    /// Tenant is over its storage quota.
    QuotaExceeded,
    /// Session sat open past its deadline.
    Expired,
}

impl UploadFailureReason {
    pub const ALL: &'static [UploadFailureReason] = &[
        Self::TransferFailed,
        Self::FinalizeFailed,
        Self::ThumbnailFailed,
        Self::ChecksumMismatch,
        Self::QuotaExceeded,
        Self::Expired,
    ];

    /// Whether re-running the operation can plausibly succeed without
    /// operator or client intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransferFailed | Self::FinalizeFailed | Self::ThumbnailFailed => true,
            // Needs a re-upload, quota change, or is simply dead.
            Self::ChecksumMismatch | Self::QuotaExceeded | Self::Expired => false,
        }
    }

    /// Reasons that warrant AI triage on first occurrence.
    pub fn is_classification_critical(&self) -> bool {
        matches!(
            self,
            Self::TransferFailed | Self::FinalizeFailed | Self::ThumbnailFailed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransferFailed => "transfer_failed",
            Self::FinalizeFailed => "finalize_failed",
            Self::ThumbnailFailed => "thumbnail_failed",
            Self::ChecksumMismatch => "checksum_mismatch",
            Self::QuotaExceeded => "quota_exceeded",
            Self::Expired => "expired",
        }
    }
}

/// Why a download delivery failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DownloadFailureReason {
    /// The asset's backing object is gone.
    SourceMissing,
    /// Stored bytes no longer match the recorded content hash.
    IntegrityCheckFailed,
    /// The serving identity lacks read permission on the backing store.
    PermissionError,
    /// Backing store unreachable.
    StorageUnreachable,
    /// No scratch space to stream through.
    DiskFull,
}

impl DownloadFailureReason {
    pub const ALL: &'static [DownloadFailureReason] = &[
        Self::SourceMissing,
        Self::IntegrityCheckFailed,
        Self::PermissionError,
        Self::StorageUnreachable,
        Self::DiskFull,
    ];

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StorageUnreachable | Self::DiskFull => true,
            // Permission and integrity problems need config or data repair.
            Self::SourceMissing | Self::IntegrityCheckFailed | Self::PermissionError => false,
        }
    }

    pub fn is_classification_critical(&self) -> bool {
        matches!(self, Self::IntegrityCheckFailed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceMissing => "source_missing",
            Self::IntegrityCheckFailed => "integrity_check_failed",
            Self::PermissionError => "permission_error",
            Self::StorageUnreachable => "storage_unreachable",
            Self::DiskFull => "disk_full",
        }
    }
}

/// Why derivative generation (thumbnail, preview, transcode) failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DerivativeFailureReason {
    /// The encoder process crashed.
    EncoderCrashed,
    /// Source bytes are not decodable.
    SourceCorrupt,
    /// Format has no registered encoder.
    UnsupportedFormat,
    /// Encoder ran past its deadline.
    Timeout,
    /// No scratch space for intermediate output.
    DiskFull,
}

impl DerivativeFailureReason {
    pub const ALL: &'static [DerivativeFailureReason] = &[
        Self::EncoderCrashed,
        Self::SourceCorrupt,
        Self::UnsupportedFormat,
        Self::Timeout,
        Self::DiskFull,
    ];

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::EncoderCrashed | Self::Timeout | Self::DiskFull => true,
            Self::SourceCorrupt | Self::UnsupportedFormat => false,
        }
    }

    pub fn is_classification_critical(&self) -> bool {
        matches!(self, Self::EncoderCrashed | Self::SourceCorrupt)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EncoderCrashed => "encoder_crashed",
            Self::SourceCorrupt => "source_corrupt",
            Self::UnsupportedFormat => "unsupported_format",
            Self::Timeout => "timeout",
            Self::DiskFull => "disk_full",
        }
    }
}

macro_rules! impl_reason_traits {
    ($ty:ident, $kind:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .find(|v| v.as_str() == s)
                    .copied()
                    .ok_or_else(|| {
                        format!(
                            concat!("Invalid ", $kind, " failure reason '{}'. Valid values: {}"),
                            s,
                            Self::ALL
                                .iter()
                                .map(|v| v.as_str())
                                .collect::<Vec<_>>()
                                .join(", ")
                        )
                    })
            }
        }
    };
}

impl_reason_traits!(UploadFailureReason, "upload");
impl_reason_traits!(DownloadFailureReason, "download");
impl_reason_traits!(DerivativeFailureReason, "derivative");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_reason_roundtrip() {
        for reason in UploadFailureReason::ALL {
            assert_eq!(
                reason.as_str().parse::<UploadFailureReason>().unwrap(),
                *reason
            );
        }
        assert!("exploded".parse::<UploadFailureReason>().is_err());
    }

    #[test]
    fn upload_critical_set_matches_policy() {
        assert!(UploadFailureReason::TransferFailed.is_classification_critical());
        assert!(UploadFailureReason::FinalizeFailed.is_classification_critical());
        assert!(UploadFailureReason::ThumbnailFailed.is_classification_critical());
        assert!(!UploadFailureReason::ChecksumMismatch.is_classification_critical());
        assert!(!UploadFailureReason::Expired.is_classification_critical());
    }

    #[test]
    fn non_retryable_reasons_need_intervention() {
        assert!(!UploadFailureReason::QuotaExceeded.is_retryable());
        assert!(!DownloadFailureReason::PermissionError.is_retryable());
        assert!(!DerivativeFailureReason::UnsupportedFormat.is_retryable());
        assert!(DerivativeFailureReason::Timeout.is_retryable());
        assert!(DownloadFailureReason::StorageUnreachable.is_retryable());
    }

    #[test]
    fn thresholds_are_ordered() {
        // Classification kicks in before escalation.
        assert!(CLASSIFICATION_THRESHOLD < ESCALATION_THRESHOLD);
    }
}
