use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use common::config::ClassifierConfig;
use common::pipeline::ClassificationRequest;
use common::{CLASSIFICATION_THRESHOLD, TriageSeverity};

/// Traces are cut to this many characters before they are embedded in a
/// prompt.
pub const TRACE_LIMIT: usize = 2000;

/// How far apart (in characters) "severity" and "system" may sit in a
/// malformed reply for the fallback to treat it as escalation-worthy.
const FALLBACK_WINDOW: usize = 64;

/// Classification agent errors.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Agent returned HTTP {0}: {1}")]
    Http(u16, String),
}

/// Parsed triage verdict.
///
/// Advisory only: triage never gates correctness, it only informs the ticket
/// a human will read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triage {
    pub severity: TriageSeverity,
    pub summary: Option<String>,
    pub recommendation: Option<String>,
}

/// Dispatch condition for AI triage, uniform across stages: repeated failure
/// or a reason from the stage's critical set.
pub fn should_classify(failure_count: i32, reason_is_critical: bool) -> bool {
    failure_count >= CLASSIFICATION_THRESHOLD || reason_is_critical
}

/// Cut a trace to [`TRACE_LIMIT`] characters.
pub fn truncate_trace(trace: &str) -> String {
    if trace.chars().count() <= TRACE_LIMIT {
        return trace.to_string();
    }
    trace.chars().take(TRACE_LIMIT).collect()
}

/// Build the triage prompt.
///
/// Embeds identifiers only, never credentials or asset bytes; the trace is
/// truncated before transmission.
pub fn build_prompt(request: &ClassificationRequest) -> String {
    format!(
        "You triage failures in an asset processing pipeline.\n\
         Classify the failure below and answer with a JSON object containing\n\
         \"summary\" (one paragraph), \"severity\" (one of \"system\", \"error\",\n\
         \"warning\"; \"system\" means a human operator must intervene) and\n\
         optionally \"recommendation\".\n\n\
         source: {} {}\n\
         tenant: {}\n\
         failure_reason: {}\n\
         failure_count: {}\n\n\
         trace:\n{}\n",
        request.source_type,
        request.source_id,
        request.tenant_id,
        request.failure_reason,
        request.failure_count,
        truncate_trace(&request.trace),
    )
}

fn parse_severity_word(word: &str) -> Option<TriageSeverity> {
    match word.to_ascii_lowercase().as_str() {
        "system" | "critical" => Some(TriageSeverity::System),
        "error" => Some(TriageSeverity::Error),
        "warning" => Some(TriageSeverity::Warning),
        _ => None,
    }
}

/// Pull the first JSON object out of a reply that may wrap it in prose or
/// markdown fences.
fn extract_json_object(raw: &str) -> Option<serde_json::Value> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw)
        && value.is_object()
    {
        return Some(value);
    }

    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<serde_json::Value>(&raw[start..=end])
        .ok()
        .filter(|v| v.is_object())
}

/// Last-resort severity guess for replies that are not JSON at all: the word
/// "system" near "severity" reads as escalation-worthy, anything else as
/// warning. The upstream text generator is not contractually bound to emit
/// valid JSON, so this path is expected, not exceptional.
fn fallback_severity(raw: &str) -> TriageSeverity {
    let lower: Vec<char> = raw.to_lowercase().chars().collect();
    let needle: Vec<char> = "severity".chars().collect();
    let target: Vec<char> = "system".chars().collect();

    let contains_at = |haystack: &[char], pattern: &[char]| -> Vec<usize> {
        if pattern.is_empty() || haystack.len() < pattern.len() {
            return Vec::new();
        }
        (0..=haystack.len() - pattern.len())
            .filter(|&i| &haystack[i..i + pattern.len()] == pattern)
            .collect()
    };

    for idx in contains_at(&lower, &needle) {
        let start = idx.saturating_sub(FALLBACK_WINDOW);
        let end = (idx + needle.len() + FALLBACK_WINDOW).min(lower.len());
        if !contains_at(&lower[start..end], &target).is_empty() {
            return TriageSeverity::System;
        }
    }

    TriageSeverity::Warning
}

/// Tolerantly parse an agent reply.
///
/// Never fails: a reply that defies extraction still yields a triage with
/// the fallback severity and no summary.
pub fn parse_reply(raw: &str) -> Triage {
    if let Some(value) = extract_json_object(raw) {
        let severity = value
            .get("severity")
            .and_then(|v| v.as_str())
            .and_then(parse_severity_word);

        let summary = value
            .get("summary")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let recommendation = value
            .get("recommendation")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if let Some(severity) = severity {
            return Triage {
                severity,
                summary,
                recommendation,
            };
        }

        debug!("Agent reply had JSON but no usable severity, using fallback");
        return Triage {
            severity: fallback_severity(raw),
            summary,
            recommendation,
        };
    }

    debug!("Agent reply was not JSON, using fallback severity");
    Triage {
        severity: fallback_severity(raw),
        summary: None,
        recommendation: None,
    }
}

/// Black-box text-classification capability.
#[async_trait]
pub trait ClassifierAgent: Send + Sync {
    /// Send a prompt, get the raw reply text back.
    async fn classify(&self, prompt: &str) -> Result<String, ClassifierError>;
}

/// HTTP-backed classifier agent.
pub struct HttpClassifierAgent {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpClassifierAgent {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl ClassifierAgent for HttpClassifierAgent {
    async fn classify(&self, prompt: &str) -> Result<String, ClassifierError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .await
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(ClassifierError::Http(status.as_u16(), body));
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::IncidentSource;

    fn request(trace: &str, count: i32) -> ClassificationRequest {
        ClassificationRequest {
            request_id: "r-1".into(),
            source_type: IncidentSource::Upload,
            source_id: "u-1".into(),
            tenant_id: "t-1".into(),
            incident_id: None,
            failure_reason: "transfer_failed".into(),
            failure_count: count,
            trace: trace.into(),
        }
    }

    #[test]
    fn dispatch_condition_is_count_or_critical() {
        assert!(!should_classify(0, false));
        assert!(!should_classify(1, false));
        assert!(should_classify(2, false));
        assert!(should_classify(0, true));
    }

    #[test]
    fn prompt_truncates_long_traces() {
        let trace = "x".repeat(5000);
        let prompt = build_prompt(&request(&trace, 1));
        // The embedded trace is bounded even though the original was not.
        assert!(prompt.len() < 3000);
        assert!(prompt.contains(&"x".repeat(TRACE_LIMIT)));
        assert!(!prompt.contains(&"x".repeat(TRACE_LIMIT + 1)));
    }

    #[test]
    fn prompt_embeds_identifiers() {
        let prompt = build_prompt(&request("boom", 2));
        assert!(prompt.contains("u-1"));
        assert!(prompt.contains("t-1"));
        assert!(prompt.contains("transfer_failed"));
    }

    #[test]
    fn parses_well_formed_reply() {
        let triage = parse_reply(
            r#"{"summary": "Encoder keeps crashing on HDR inputs.", "severity": "system", "recommendation": "Pin encoder to v2.1"}"#,
        );
        assert_eq!(triage.severity, TriageSeverity::System);
        assert_eq!(
            triage.summary.as_deref(),
            Some("Encoder keeps crashing on HDR inputs.")
        );
        assert_eq!(triage.recommendation.as_deref(), Some("Pin encoder to v2.1"));
    }

    #[test]
    fn parses_json_wrapped_in_prose() {
        let triage = parse_reply(
            "Sure! Here is my assessment:\n```json\n{\"severity\": \"warning\", \"summary\": \"Transient network blip.\"}\n```\nLet me know if you need more.",
        );
        assert_eq!(triage.severity, TriageSeverity::Warning);
        assert_eq!(triage.summary.as_deref(), Some("Transient network blip."));
    }

    #[test]
    fn critical_maps_to_system() {
        let triage = parse_reply(r#"{"severity": "critical", "summary": "Disk is gone."}"#);
        assert_eq!(triage.severity, TriageSeverity::System);
    }

    #[test]
    fn garbage_with_system_near_severity_escalates() {
        let triage = parse_reply("I'd rate the severity as system level, the broker is down");
        assert_eq!(triage.severity, TriageSeverity::System);
        assert!(triage.summary.is_none());
    }

    #[test]
    fn garbage_defaults_to_warning() {
        let triage = parse_reply("cannot help with that");
        assert_eq!(triage.severity, TriageSeverity::Warning);
    }

    #[test]
    fn system_far_from_severity_does_not_escalate() {
        let filler = "a ".repeat(100);
        let text = format!("severity unclear {filler} the system was fine");
        assert_eq!(parse_reply(&text).severity, TriageSeverity::Warning);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let trace = "é".repeat(TRACE_LIMIT + 100);
        let truncated = truncate_trace(&trace);
        assert_eq!(truncated.chars().count(), TRACE_LIMIT);
    }
}
