use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use common::{ESCALATION_THRESHOLD, FailureReport, IncidentSource};

use crate::entity::{download, system_incident, upload_session};
use crate::incidents::{ResolveResult, incident_store};
use crate::locks::AssetLocks;
use crate::reliability::reconcile::{FieldChange, Reconciler};

/// Result of one auto-repair attempt.
#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    pub resolved: bool,
    pub changes: Vec<FieldChange>,
}

impl RecoveryOutcome {
    fn failed() -> Self {
        Self {
            resolved: false,
            changes: Vec::new(),
        }
    }
}

/// Single ingress point for "something went wrong" reports from any pipeline
/// stage. Records incidents, attempts repair, and decides escalation
/// eligibility; actual ticket creation belongs to the escalation service.
#[derive(Clone)]
pub struct ReliabilityEngine {
    db: DatabaseConnection,
    reconciler: Reconciler,
}

impl ReliabilityEngine {
    pub fn new(db: DatabaseConnection, locks: AssetLocks) -> Self {
        let reconciler = Reconciler::new(db.clone(), locks);
        Self { db, reconciler }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Record a failure report as an incident, deduplicating by signature.
    #[instrument(skip(self, report), fields(source = %report.source_type, title = %report.title))]
    pub async fn report(&self, report: &FailureReport) -> anyhow::Result<system_incident::Model> {
        let incident = incident_store(&self.db).record(report).await?;

        info!(
            incident_id = %incident.id,
            source_type = %incident.source_type,
            source_id = ?incident.source_id,
            severity = %incident.severity,
            "Recorded incident"
        );

        Ok(incident)
    }

    /// Try to auto-repair the condition behind an incident.
    ///
    /// On success the incident is resolved with `auto_resolved = true`; on
    /// failure its `repair_attempts` counter is bumped so repeated failures
    /// become visible to the escalation policy.
    #[instrument(skip(self, incident), fields(incident_id = %incident.id))]
    pub async fn attempt_recovery(
        &self,
        incident: &system_incident::Model,
    ) -> anyhow::Result<RecoveryOutcome> {
        let outcome = match incident.source_type.parse::<IncidentSource>() {
            Ok(IncidentSource::Asset) | Ok(IncidentSource::Derivative) => {
                self.repair_asset(incident).await
            }
            Ok(IncidentSource::Upload) => self.repair_upload(incident).await?,
            Ok(IncidentSource::Download) => self.repair_download(incident).await?,
            Ok(IncidentSource::Job) => RecoveryOutcome::failed(),
            Err(_) => {
                warn!(source_type = %incident.source_type, "Unknown incident source, cannot repair");
                RecoveryOutcome::failed()
            }
        };

        if outcome.resolved {
            incident_store(&self.db).resolve(incident.id, true).await?;
            info!(
                incident_id = %incident.id,
                changes = outcome.changes.len(),
                "Incident auto-resolved by repair"
            );
        } else {
            let attempts = incident
                .metadata
                .get("repair_attempts")
                .and_then(|v| v.as_i64())
                .unwrap_or(0)
                + 1;
            incident_store(&self.db)
                .merge_metadata(incident, serde_json::json!({ "repair_attempts": attempts }))
                .await?;
            info!(
                incident_id = %incident.id,
                repair_attempts = attempts,
                "Repair attempt did not resolve incident"
            );
        }

        Ok(outcome)
    }

    /// Mark an incident resolved.
    pub async fn resolve(&self, incident_id: Uuid, auto: bool) -> anyhow::Result<ResolveResult> {
        Ok(incident_store(&self.db).resolve(incident_id, auto).await?)
    }

    /// Whether an incident qualifies for escalation.
    ///
    /// Eligibility does not create a ticket; it only hands the incident to
    /// the escalation service.
    pub fn escalation_eligible(
        incident: &system_incident::Model,
        repair_failed: bool,
        failure_count: i32,
    ) -> bool {
        incident.requires_support || (repair_failed && failure_count >= ESCALATION_THRESHOLD)
    }

    /// Asset and derivative incidents are repaired by reconciliation:
    /// "repair succeeded" means it corrected at least one field.
    async fn repair_asset(&self, incident: &system_incident::Model) -> RecoveryOutcome {
        let asset_id = incident
            .source_id
            .as_deref()
            .and_then(|id| id.parse::<Uuid>().ok())
            .or_else(|| {
                incident
                    .metadata
                    .get("asset_id")
                    .and_then(|v| v.as_str())
                    .and_then(|id| id.parse::<Uuid>().ok())
            });

        let Some(asset_id) = asset_id else {
            warn!(incident_id = %incident.id, "Incident has no usable asset ID");
            return RecoveryOutcome::failed();
        };

        match self.reconciler.reconcile_asset(asset_id).await {
            Ok(reconciliation) => RecoveryOutcome {
                resolved: reconciliation.updated,
                changes: reconciliation.changes,
            },
            Err(e) => {
                warn!(
                    incident_id = %incident.id,
                    asset_id = %asset_id,
                    error = %e,
                    "Reconciliation during repair failed"
                );
                RecoveryOutcome::failed()
            }
        }
    }

    /// An upload incident is repaired once the session reached `finalized`
    /// (the condition that triggered it cleared itself).
    async fn repair_upload(
        &self,
        incident: &system_incident::Model,
    ) -> anyhow::Result<RecoveryOutcome> {
        let Some(session_id) = incident
            .source_id
            .as_deref()
            .and_then(|id| id.parse::<Uuid>().ok())
        else {
            return Ok(RecoveryOutcome::failed());
        };

        let session = upload_session::Entity::find_by_id(session_id)
            .one(&self.db)
            .await?;

        let resolved = session
            .map(|s| s.state == upload_session::SessionState::FINALIZED)
            .unwrap_or(false);

        Ok(RecoveryOutcome {
            resolved,
            changes: Vec::new(),
        })
    }

    /// A download incident is repaired once the failing row was cleaned up.
    async fn repair_download(
        &self,
        incident: &system_incident::Model,
    ) -> anyhow::Result<RecoveryOutcome> {
        let Some(download_id) = incident
            .source_id
            .as_deref()
            .and_then(|id| id.parse::<Uuid>().ok())
        else {
            return Ok(RecoveryOutcome::failed());
        };

        let row = download::Entity::find_by_id(download_id)
            .filter(download::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?;

        Ok(RecoveryOutcome {
            resolved: row.is_none(),
            changes: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn incident(requires_support: bool) -> system_incident::Model {
        system_incident::Model {
            id: Uuid::new_v4(),
            source_type: "upload".into(),
            source_id: Some(Uuid::new_v4().to_string()),
            tenant_id: Some("t-1".into()),
            severity: "error".into(),
            title: "Upload transfer failed".into(),
            message: None,
            metadata: serde_json::json!({}),
            retryable: true,
            requires_support,
            auto_resolved: false,
            unique_signature: None,
            open_signature: None,
            detected_at: Utc::now(),
            resolved_at: None,
        }
    }

    #[test]
    fn requires_support_is_always_eligible() {
        let inc = incident(true);
        assert!(ReliabilityEngine::escalation_eligible(&inc, false, 0));
    }

    #[test]
    fn failed_repair_alone_is_not_enough_below_threshold() {
        let inc = incident(false);
        assert!(!ReliabilityEngine::escalation_eligible(&inc, true, 2));
        assert!(ReliabilityEngine::escalation_eligible(&inc, true, 3));
        assert!(ReliabilityEngine::escalation_eligible(&inc, true, 7));
    }

    #[test]
    fn successful_repair_suppresses_eligibility() {
        let inc = incident(false);
        assert!(!ReliabilityEngine::escalation_eligible(&inc, false, 5));
    }
}
