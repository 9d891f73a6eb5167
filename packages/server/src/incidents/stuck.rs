use std::time::Duration;

use chrono::Utc;
use common::config::StuckScanConfig;
use common::{AnalysisPhase, FailureReport, IncidentSeverity, IncidentSource};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect};
use tracing::{error, info};
use uuid::Uuid;

use crate::entity::asset;
use crate::locks::AssetLocks;
use crate::reliability::{EscalationService, ReliabilityEngine};

/// Run the stuck-asset detector as a background task.
///
/// A "stuck" asset is detected indirectly: a non-terminal analysis phase
/// combined with a stale `updated_at`. Detection is a periodic scan, not a
/// per-job timer.
pub async fn run_stuck_asset_detector(
    db: DatabaseConnection,
    locks: AssetLocks,
    config: StuckScanConfig,
) {
    let engine = ReliabilityEngine::new(db.clone(), locks);
    let escalation = EscalationService::new(db.clone());
    let scan_interval = Duration::from_secs(config.scan_interval_secs);

    info!(
        timeout_secs = config.stuck_timeout_secs,
        scan_interval_secs = config.scan_interval_secs,
        "Starting stuck asset detector"
    );

    let mut interval = tokio::time::interval(scan_interval);

    loop {
        interval.tick().await;

        if let Err(e) = detect_and_handle_stuck_assets(&db, &engine, &escalation, &config).await {
            error!(error = %e, "Stuck asset detection failed");
        }
    }
}

/// Scan for stalled assets, record incidents, attempt repair.
async fn detect_and_handle_stuck_assets(
    db: &DatabaseConnection,
    engine: &ReliabilityEngine,
    escalation: &EscalationService,
    config: &StuckScanConfig,
) -> anyhow::Result<()> {
    let stale_threshold = Utc::now() - chrono::Duration::seconds(config.stuck_timeout_secs as i64);

    let stuck_asset_ids: Vec<Uuid> = asset::Entity::find()
        .select_only()
        .column(asset::Column::Id)
        .filter(asset::Column::AnalysisPhase.ne(AnalysisPhase::Complete))
        .filter(asset::Column::UpdatedAt.lt(stale_threshold))
        .filter(asset::Column::DeletedAt.is_null())
        .into_tuple()
        .all(db)
        .await?;

    if stuck_asset_ids.is_empty() {
        return Ok(());
    }

    info!(count = stuck_asset_ids.len(), "Found stalled assets");

    for asset_id in stuck_asset_ids {
        if let Err(e) = handle_stuck_asset(db, engine, escalation, asset_id, config).await {
            error!(
                asset_id = %asset_id,
                error = %e,
                "Failed to handle stalled asset"
            );
        }
    }

    Ok(())
}

async fn handle_stuck_asset(
    db: &DatabaseConnection,
    engine: &ReliabilityEngine,
    escalation: &EscalationService,
    asset_id: Uuid,
    config: &StuckScanConfig,
) -> anyhow::Result<()> {
    // Re-read: the asset may have moved on since the scan.
    let Some(model) = asset::Entity::find_by_id(asset_id).one(db).await? else {
        return Ok(());
    };
    if model.analysis_phase.is_terminal() {
        return Ok(());
    }

    let report = FailureReport::new(
        IncidentSource::Asset,
        asset_id.to_string(),
        IncidentSeverity::Error,
        "Asset processing stalled",
    )
    .tenant(model.tenant_id.clone())
    .message(format!(
        "Analysis phase '{}' unchanged for over {} seconds",
        model.analysis_phase, config.stuck_timeout_secs
    ))
    .retryable(true)
    .signature(format!("stuck:{asset_id}"))
    .metadata(serde_json::json!({
        "asset_id": asset_id.to_string(),
        "analysis_phase": model.analysis_phase.as_str(),
    }));

    // record() dedups by signature, so a still-stuck asset does not pile up
    // one incident per scan.
    let incident = engine.report(&report).await?;

    if incident.resolved_at.is_some() {
        return Ok(());
    }

    let outcome = engine.attempt_recovery(&incident).await?;

    if outcome.resolved {
        info!(
            asset_id = %asset_id,
            incident_id = %incident.id,
            changes = outcome.changes.len(),
            "Stalled asset repaired by reconciliation"
        );
        return Ok(());
    }

    // Repair just failed, so the attempt counter we hold is one behind.
    let repair_attempts = incident
        .metadata
        .get("repair_attempts")
        .and_then(|v| v.as_i64())
        .unwrap_or(0) as i32
        + 1;

    if ReliabilityEngine::escalation_eligible(&incident, true, repair_attempts) {
        match escalation.create_ticket(&incident, None).await {
            Ok(Some(ticket)) => {
                info!(
                    asset_id = %asset_id,
                    incident_id = %incident.id,
                    ticket_id = %ticket.id,
                    repair_attempts,
                    "Stalled asset escalated to support ticket"
                );
            }
            Ok(None) => {
                info!(
                    incident_id = %incident.id,
                    "Incident source not escalatable, left open"
                );
            }
            Err(e) => {
                // Escalation failure never aborts the scan.
                error!(incident_id = %incident.id, error = %e, "Escalation failed");
            }
        }
    } else {
        info!(
            asset_id = %asset_id,
            incident_id = %incident.id,
            repair_attempts,
            "Stalled asset could not be auto-repaired, incident remains open"
        );
    }

    Ok(())
}
