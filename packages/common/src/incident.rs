use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a recorded incident.
///
/// Triage ordering is `Critical > Error > Warning > Info`; `rank()` gives the
/// numeric ordering used by the triage view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IncidentSeverity {
    Critical,
    Error,
    Warning,
    Info,
}

impl IncidentSeverity {
    pub const ALL: &'static [IncidentSeverity] =
        &[Self::Critical, Self::Error, Self::Warning, Self::Info];

    /// Numeric severity for ordering. Higher is more severe.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Critical => 3,
            Self::Error => 2,
            Self::Warning => 1,
            Self::Info => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for IncidentSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|v| v.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Invalid severity '{s}'. Must be one of critical, error, warning, info"))
    }
}

/// What kind of entity an incident was detected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IncidentSource {
    Asset,
    Job,
    Derivative,
    Upload,
    Download,
}

impl IncidentSource {
    pub const ALL: &'static [IncidentSource] = &[
        Self::Asset,
        Self::Job,
        Self::Derivative,
        Self::Upload,
        Self::Download,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Job => "job",
            Self::Derivative => "derivative",
            Self::Upload => "upload",
            Self::Download => "download",
        }
    }
}

impl fmt::Display for IncidentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|v| v.as_str() == s)
            .copied()
            .ok_or_else(|| {
                format!("Invalid source_type '{s}'. Must be one of asset, job, derivative, upload, download")
            })
    }
}

/// A "something went wrong" report, the single ingress shape for the
/// reliability engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    pub source_type: IncidentSource,
    /// ID of the entity the failure was observed on.
    ///
    /// `None` when the entity cannot be determined (e.g., the job payload did
    /// not deserialize far enough to extract it).
    pub source_id: Option<String>,
    pub tenant_id: Option<String>,
    pub severity: IncidentSeverity,
    pub title: String,
    #[serde(default)]
    pub message: Option<String>,
    /// Whether re-running the failed operation can plausibly succeed.
    pub retryable: bool,
    /// Escalate to a human regardless of repair outcome.
    #[serde(default)]
    pub requires_support: bool,
    /// Dedup key: at most one unresolved incident may exist per signature.
    #[serde(default)]
    pub unique_signature: Option<String>,
    #[serde(default = "empty_metadata")]
    pub metadata: serde_json::Value,
}

fn empty_metadata() -> serde_json::Value {
    serde_json::json!({})
}

impl FailureReport {
    pub fn new(
        source_type: IncidentSource,
        source_id: impl Into<String>,
        severity: IncidentSeverity,
        title: impl Into<String>,
    ) -> Self {
        Self {
            source_type,
            source_id: Some(source_id.into()),
            tenant_id: None,
            severity,
            title: title.into(),
            message: None,
            retryable: false,
            requires_support: false,
            unique_signature: None,
            metadata: empty_metadata(),
        }
    }

    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn requires_support(mut self, requires_support: bool) -> Self {
        self.requires_support = requires_support;
        self
    }

    pub fn signature(mut self, signature: impl Into<String>) -> Self {
        self.unique_signature = Some(signature.into());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Severity scale of the classification agent's triage verdict.
///
/// This is the agent's own scale, not [`IncidentSeverity`]: `System` means
/// "a human must look at this" and is the escalation-worthy verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageSeverity {
    System,
    Error,
    Warning,
}

impl TriageSeverity {
    pub fn is_escalation_worthy(&self) -> bool {
        matches!(self, Self::System)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

impl fmt::Display for TriageSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriageSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "error" => Ok(Self::Error),
            "warning" => Ok(Self::Warning),
            _ => Err(format!("Invalid triage severity '{s}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_is_critical_first() {
        assert!(IncidentSeverity::Critical.rank() > IncidentSeverity::Error.rank());
        assert!(IncidentSeverity::Error.rank() > IncidentSeverity::Warning.rank());
        assert!(IncidentSeverity::Warning.rank() > IncidentSeverity::Info.rank());
    }

    #[test]
    fn severity_parse_roundtrip() {
        for sev in IncidentSeverity::ALL {
            assert_eq!(sev.as_str().parse::<IncidentSeverity>().unwrap(), *sev);
        }
        assert!("fatal".parse::<IncidentSeverity>().is_err());
    }

    #[test]
    fn source_parse_roundtrip() {
        for src in IncidentSource::ALL {
            assert_eq!(src.as_str().parse::<IncidentSource>().unwrap(), *src);
        }
    }

    #[test]
    fn report_builder_defaults() {
        let report = FailureReport::new(
            IncidentSource::Upload,
            "u-1",
            IncidentSeverity::Error,
            "Transfer failed",
        )
        .tenant("t-1")
        .retryable(true)
        .signature("upload-failed:u-1");

        assert_eq!(report.source_id.as_deref(), Some("u-1"));
        assert!(!report.requires_support);
        assert!(report.retryable);
        assert_eq!(report.unique_signature.as_deref(), Some("upload-failed:u-1"));
        assert_eq!(report.metadata, serde_json::json!({}));
    }

    #[test]
    fn only_system_triage_escalates() {
        assert!(TriageSeverity::System.is_escalation_worthy());
        assert!(!TriageSeverity::Error.is_escalation_worthy());
        assert!(!TriageSeverity::Warning.is_escalation_worthy());
    }
}
