use std::sync::Arc;

use chrono::Utc;
use mq::{BroccoliError, BrokerMessage};
use sea_orm::sea_query::LockType;
use sea_orm::{ActiveModelTrait, EntityTrait, QuerySelect, Set, TransactionTrait};
use tracing::{error, info, warn};
use uuid::Uuid;

use common::pipeline::{FailureReported, UploadFinalized};
use common::{
    AnalysisPhase, ContentHash, FailureReport, IncidentSeverity, IncidentSource, StageStatus,
    UploadFailureReason, VisibilityStatus,
};

use crate::entity::{asset, upload_session};

use super::ConsumerCtx;

/// Consume upload-finalized events from the upload surface.
///
/// Verifies the stored bytes against the declared checksum, flips the session
/// to its terminal state, and starts the asset's pipeline. A checksum
/// mismatch takes the failure path instead: session marked failed, incident
/// recorded, failure event emitted.
pub async fn consume_upload_finalized(ctx: Arc<ConsumerCtx>) {
    let queue_name = ctx.queues.upload_queue_name.clone();
    info!(queue = %queue_name, "Starting upload finalize consumer");

    let mq = ctx.mq.clone();
    let result = mq
        .process_messages(
            &queue_name,
            None,
            None,
            move |message: BrokerMessage<UploadFinalized>| {
                let ctx = ctx.clone();
                async move {
                    let event = message.payload;
                    let session_id = event.session_id;

                    if let Err(e) = process_upload_finalized(&ctx, &event).await {
                        error!(
                            session_id = %session_id,
                            error = %e,
                            "Failed to process upload finalize"
                        );
                        return Err(BroccoliError::Job(e.to_string()));
                    }
                    Ok(())
                }
            },
        )
        .await;

    if let Err(e) = result {
        error!(error = %e, "Upload finalize consumer stopped unexpectedly");
    }
}

async fn process_upload_finalized(
    ctx: &ConsumerCtx,
    event: &UploadFinalized,
) -> anyhow::Result<()> {
    let txn = ctx.db.begin().await?;

    let Some(session) = upload_session::Entity::find_by_id(event.session_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
    else {
        txn.rollback().await?;
        warn!(session_id = %event.session_id, "Finalize event for unknown upload session");
        return Ok(());
    };

    if session.state == upload_session::SessionState::FINALIZED {
        txn.rollback().await?;
        info!(session_id = %session.id, "Session already finalized, skipping");
        return Ok(());
    }

    let now = Utc::now();

    let checksum_ok = match (
        ContentHash::from_hex(&event.checksum_expected),
        ContentHash::from_hex(&event.checksum_actual),
    ) {
        (Ok(expected), Ok(actual)) => expected == actual,
        // A checksum we cannot even parse counts as a mismatch.
        _ => false,
    };

    if !checksum_ok {
        let failure_count = session.failure_count + 1;
        let reason = UploadFailureReason::ChecksumMismatch;

        let update = upload_session::ActiveModel {
            id: Set(session.id),
            state: Set(upload_session::SessionState::FAILED.into()),
            checksum_actual: Set(Some(event.checksum_actual.clone())),
            failure_reason: Set(Some(reason.as_str().to_string())),
            failure_count: Set(failure_count),
            last_failed_at: Set(Some(now)),
            updated_at: Set(now),
            ..Default::default()
        };
        update.update(&txn).await?;
        txn.commit().await?;

        let detail = format!(
            "Expected checksum {} but stored bytes hash to {}",
            event.checksum_expected, event.checksum_actual
        );
        let report = FailureReport::new(
            IncidentSource::Upload,
            session.id.to_string(),
            IncidentSeverity::Error,
            "Upload checksum mismatch",
        )
        .tenant(session.tenant_id.clone())
        .message(detail.clone())
        .retryable(reason.is_retryable())
        .signature(format!("upload-failed:{}", session.id))
        .metadata(serde_json::json!({
            "failure_reason": reason.as_str(),
            "failure_count": failure_count,
        }));
        let incident = ctx.pipeline.engine().report(&report).await?;

        let failure_event = FailureReported {
            event_id: Uuid::new_v4().to_string(),
            source_type: IncidentSource::Upload,
            source_id: session.id.to_string(),
            tenant_id: session.tenant_id.clone(),
            asset_id: Some(session.asset_id),
            stage: None,
            failure_reason: reason.as_str().to_string(),
            failure_count,
            detail,
            incident_id: Some(incident.id),
        };
        ctx.mq
            .publish(&ctx.queues.failure_queue_name, None, &failure_event, None)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to publish failure event: {e}"))?;

        warn!(
            session_id = %session.id,
            failure_count,
            "Upload failed checksum verification"
        );
        return Ok(());
    }

    let update = upload_session::ActiveModel {
        id: Set(session.id),
        state: Set(upload_session::SessionState::FINALIZED.into()),
        bytes_received: Set(event.size_bytes),
        checksum_actual: Set(Some(event.checksum_actual.clone())),
        updated_at: Set(now),
        ..Default::default()
    };
    update.update(&txn).await?;

    // The session owns asset creation at finalize; a retried event reuses the
    // existing row.
    let asset_model = match asset::Entity::find_by_id(event.asset_id).one(&txn).await? {
        Some(existing) => existing,
        None => {
            let model = asset::ActiveModel {
                id: Set(event.asset_id),
                tenant_id: Set(event.tenant_id.clone()),
                brand_id: Set(event.brand_id.clone()),
                filename: Set(event.filename.clone()),
                content_hash: Set(Some(event.checksum_actual.clone())),
                content_type: Set(None),
                size_bytes: Set(Some(event.size_bytes)),
                visibility: Set(VisibilityStatus::Hidden),
                thumbnail_status: Set(StageStatus::Pending),
                metadata_status: Set(StageStatus::Pending),
                tagging_status: Set(StageStatus::Pending),
                promotion_status: Set(StageStatus::Pending),
                analysis_phase: Set(AnalysisPhase::Uploading),
                metadata: Set(serde_json::json!({})),
                version: Set(0),
                created_at: Set(now),
                updated_at: Set(now),
                deleted_at: Set(None),
            };
            model.insert(&txn).await?
        }
    };

    txn.commit().await?;

    info!(
        session_id = %session.id,
        asset_id = %asset_model.id,
        size_bytes = event.size_bytes,
        "Upload finalized, starting pipeline"
    );

    ctx.pipeline.start(&asset_model).await
}
