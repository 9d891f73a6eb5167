use std::sync::Arc;

use chrono::Utc;
use mq::Mq;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use common::config::MqAppConfig;
use common::mq::QueueTask;
use common::pipeline::{ActivityEvent, FailureReported, StageJob, StageResult};
use common::{
    FailureReport, IncidentSeverity, IncidentSource, PipelineStage, StageStatus,
};

use crate::entity::{asset, asset_derivative_failure};
use crate::incidents::incident_store;
use crate::locks::AssetLocks;
use crate::reliability::reconcile::{AssetSnapshot, keys, reconcile};
use crate::reliability::ReliabilityEngine;
use crate::services::{ActivitySink, Feature, PlanService};

/// Server-side pipeline orchestration: starting a pipeline, chaining stages,
/// and absorbing stage results.
///
/// All asset writes go through here or through the reconciler, both under the
/// per-asset lock.
#[derive(Clone)]
pub struct Pipeline {
    db: DatabaseConnection,
    mq: Arc<Mq>,
    locks: AssetLocks,
    plans: Arc<dyn PlanService>,
    activity: ActivitySink,
    engine: ReliabilityEngine,
    queues: MqAppConfig,
}

impl Pipeline {
    pub fn new(
        db: DatabaseConnection,
        mq: Arc<Mq>,
        locks: AssetLocks,
        plans: Arc<dyn PlanService>,
        activity: ActivitySink,
        queues: MqAppConfig,
    ) -> Self {
        let engine = ReliabilityEngine::new(db.clone(), locks.clone());
        Self {
            db,
            mq,
            locks,
            plans,
            activity,
            engine,
            queues,
        }
    }

    pub fn engine(&self) -> &ReliabilityEngine {
        &self.engine
    }

    /// Kick off processing for a freshly finalized asset.
    #[instrument(skip(self, asset_model), fields(asset_id = %asset_model.id))]
    pub async fn start(&self, asset_model: &asset::Model) -> anyhow::Result<()> {
        self.activity.record(
            ActivityEvent::new(
                "pipeline.started",
                serde_json::json!({ "asset_id": asset_model.id.to_string() }),
            )
            .tenant(asset_model.tenant_id.clone()),
        );

        self.dispatch_stage(asset_model, PipelineStage::first())
            .await
    }

    /// Move an asset into the given stage and enqueue its job.
    ///
    /// Plan-gated stages the tenant is not entitled to are marked `Skipped`
    /// and the chain continues with the next stage.
    pub async fn dispatch_stage(
        &self,
        asset_model: &asset::Model,
        stage: PipelineStage,
    ) -> anyhow::Result<()> {
        let mut stage = stage;

        loop {
            if stage == PipelineStage::Tagging
                && !self
                    .plans
                    .allows(&asset_model.tenant_id, Feature::AiTagging)
                    .await
            {
                self.mark_stage(asset_model.id, stage, StageStatus::Skipped)
                    .await?;
                info!(
                    asset_id = %asset_model.id,
                    tenant_id = %asset_model.tenant_id,
                    "Tagging not in tenant plan, stage skipped"
                );
                match stage.next() {
                    Some(next) => {
                        stage = next;
                        continue;
                    }
                    None => return Ok(()),
                }
            }

            self.mark_stage(asset_model.id, stage, StageStatus::Processing)
                .await?;

            let job = StageJob::new(
                asset_model.id,
                asset_model.tenant_id.clone(),
                asset_model.brand_id.clone(),
                stage,
                asset_model.filename.clone(),
                asset_model.content_hash.clone(),
            );
            let task = QueueTask {
                id: job.job_id.clone(),
                task_type: "stage".into(),
                payload: serde_json::to_value(&job)?,
            };
            self.mq
                .publish(&self.queues.stage_queue_name, None, &task, None)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to enqueue {stage} job: {e}"))?;

            info!(
                asset_id = %asset_model.id,
                stage = %stage,
                job_id = %job.job_id,
                "Dispatched stage job"
            );

            return Ok(());
        }
    }

    /// Absorb a successful stage result: record the stage status, merge
    /// artifacts, reconcile derived state, and chain the next stage.
    #[instrument(skip(self, result), fields(asset_id = %result.asset_id, stage = %result.stage))]
    pub async fn complete_stage(
        &self,
        result: &StageResult,
        artifacts: &serde_json::Value,
    ) -> anyhow::Result<()> {
        // The lock guard must not outlive this block: chaining the next stage
        // re-acquires the same asset's lock.
        let model = {
            let _guard = self.locks.acquire(result.asset_id).await;

            let txn = self.db.begin().await?;

            let Some(model) = asset::Entity::find_by_id(result.asset_id)
                .lock(LockType::Update)
                .one(&txn)
                .await?
            else {
                txn.rollback().await?;
                warn!("Stage result for unknown asset, dropping");
                return Ok(());
            };

            if stage_status(&model, result.stage) == StageStatus::Completed {
                // Queue redelivery; this result is already absorbed.
                txn.rollback().await?;
                info!("Stage already completed, skipping duplicate result");
                return Ok(());
            }

            let mut metadata = if model.metadata.is_object() {
                model.metadata.clone()
            } else {
                serde_json::json!({})
            };
            if let (Some(bag), Some(extra)) = (metadata.as_object_mut(), artifacts.as_object()) {
                for (k, v) in extra {
                    bag.insert(k.clone(), v.clone());
                }
            }
            if result.stage == PipelineStage::Promotion {
                metadata["pipeline_completed_at"] =
                    serde_json::Value::String(Utc::now().to_rfc3339());
            }

            let content_type = artifacts
                .get("content_type")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .or(model.content_type.clone());

            // Reconcile over the post-completion state so phase, flags, and
            // visibility all come from the one rule set.
            let mut snapshot = AssetSnapshot::from(&model);
            set_snapshot_stage(&mut snapshot, result.stage, StageStatus::Completed);
            snapshot.metadata = metadata;

            // A succeeded retry clears the blocking failure flags, as long as
            // no other stage is still failed.
            let any_failed = [
                snapshot.thumbnail_status,
                snapshot.metadata_status,
                snapshot.tagging_status,
                snapshot.promotion_status,
            ]
            .contains(&StageStatus::Failed);
            if !any_failed && let Some(bag) = snapshot.metadata.as_object_mut() {
                bag.remove(keys::PROCESSING_FAILED);
                bag.remove(keys::FAILURE_TERMINAL);
                bag.remove("failure_reason");
            }

            let outcome = reconcile(&snapshot);

            let mut update = asset::ActiveModel {
                id: Set(model.id),
                metadata: Set(outcome.metadata),
                visibility: Set(outcome.visibility),
                analysis_phase: Set(outcome.analysis_phase),
                content_type: Set(content_type),
                version: Set(model.version + 1),
                updated_at: Set(Utc::now()),
                ..Default::default()
            };
            set_active_stage(&mut update, result.stage, StageStatus::Completed);
            update.update(&txn).await?;

            txn.commit().await?;
            model
        };

        // The condition behind any open stage-failure incident just cleared.
        let signature = format!("stage-failed:{}:{}", result.stage, result.asset_id);
        let store = incident_store(&self.db);
        if let Some(open) = store.find_open_by_signature(&signature).await? {
            store.resolve(open.id, true).await?;
            info!(incident_id = %open.id, "Stage recovered, incident auto-resolved");
        }

        self.activity.record(
            ActivityEvent::new(
                "pipeline.stage_completed",
                serde_json::json!({
                    "asset_id": model.id.to_string(),
                    "stage": result.stage.as_str(),
                }),
            )
            .tenant(model.tenant_id.clone()),
        );

        match result.stage.next() {
            Some(next) => {
                let Some(refreshed) = asset::Entity::find_by_id(result.asset_id)
                    .one(&self.db)
                    .await?
                else {
                    return Ok(());
                };
                self.dispatch_stage(&refreshed, next).await
            }
            None => {
                info!(asset_id = %model.id, "Pipeline completed");
                self.activity.record(
                    ActivityEvent::new(
                        "pipeline.completed",
                        serde_json::json!({ "asset_id": model.id.to_string() }),
                    )
                    .tenant(model.tenant_id.clone()),
                );
                Ok(())
            }
        }
    }

    /// Absorb a failed stage result.
    ///
    /// Persists the failure on the asset and its derivative failure row,
    /// records an incident through the single funnel, optionally attempts
    /// repair, and returns the event for the failure-events queue.
    #[instrument(skip(self, result), fields(asset_id = %result.asset_id, stage = %result.stage))]
    pub async fn fail_stage(
        &self,
        result: &StageResult,
        reason: &str,
        detail: &str,
        retryable: bool,
    ) -> anyhow::Result<Option<FailureReported>> {
        let failure_row = {
            let _guard = self.locks.acquire(result.asset_id).await;

            let txn = self.db.begin().await?;

            let Some(model) = asset::Entity::find_by_id(result.asset_id)
                .lock(LockType::Update)
                .one(&txn)
                .await?
            else {
                txn.rollback().await?;
                warn!("Stage failure for unknown asset, dropping");
                return Ok(None);
            };

            let mut metadata = if model.metadata.is_object() {
                model.metadata.clone()
            } else {
                serde_json::json!({})
            };
            metadata[keys::PROCESSING_FAILED] = serde_json::Value::Bool(true);
            metadata[keys::FAILURE_TERMINAL] = serde_json::Value::Bool(!retryable);
            metadata["failure_reason"] = serde_json::Value::String(reason.to_string());

            let mut snapshot = AssetSnapshot::from(&model);
            set_snapshot_stage(&mut snapshot, result.stage, StageStatus::Failed);
            snapshot.metadata = metadata;
            let outcome = reconcile(&snapshot);

            let mut update = asset::ActiveModel {
                id: Set(model.id),
                metadata: Set(outcome.metadata),
                visibility: Set(outcome.visibility),
                analysis_phase: Set(outcome.analysis_phase),
                version: Set(model.version + 1),
                updated_at: Set(Utc::now()),
                ..Default::default()
            };
            set_active_stage(&mut update, result.stage, StageStatus::Failed);
            update.update(&txn).await?;

            let failure_row = upsert_derivative_failure(
                &txn,
                &model,
                result.stage,
                reason,
                detail,
            )
            .await?;

            txn.commit().await?;
            failure_row
        };

        let severity = if retryable {
            IncidentSeverity::Error
        } else {
            IncidentSeverity::Critical
        };
        let report = FailureReport::new(
            IncidentSource::Derivative,
            failure_row.id.to_string(),
            severity,
            format!("{} stage failed: {}", result.stage, reason),
        )
        .tenant(result.tenant_id.clone())
        .message(detail.to_string())
        .retryable(retryable)
        .signature(format!("stage-failed:{}:{}", result.stage, result.asset_id))
        .metadata(serde_json::json!({
            "asset_id": result.asset_id.to_string(),
            "stage": result.stage.as_str(),
            "failure_reason": reason,
            "failure_count": failure_row.failure_count,
        }));

        let incident = self.engine.report(&report).await?;

        if retryable && incident.resolved_at.is_none() {
            // Best-effort repair; a failure here must not lose the event.
            if let Err(e) = self.engine.attempt_recovery(&incident).await {
                warn!(incident_id = %incident.id, error = %e, "Recovery attempt errored");
            }
        }

        self.activity.record(
            ActivityEvent::new(
                "pipeline.stage_failed",
                serde_json::json!({
                    "asset_id": result.asset_id.to_string(),
                    "stage": result.stage.as_str(),
                    "reason": reason,
                }),
            )
            .tenant(result.tenant_id.clone()),
        );

        Ok(Some(FailureReported {
            event_id: Uuid::new_v4().to_string(),
            source_type: IncidentSource::Derivative,
            source_id: failure_row.id.to_string(),
            tenant_id: result.tenant_id.clone(),
            asset_id: Some(result.asset_id),
            stage: Some(result.stage),
            failure_reason: reason.to_string(),
            failure_count: failure_row.failure_count,
            detail: detail.to_string(),
            incident_id: Some(incident.id),
        }))
    }

    /// Set one stage column without touching anything else.
    async fn mark_stage(
        &self,
        asset_id: Uuid,
        stage: PipelineStage,
        status: StageStatus,
    ) -> anyhow::Result<()> {
        let _guard = self.locks.acquire(asset_id).await;

        let txn = self.db.begin().await?;

        let Some(model) = asset::Entity::find_by_id(asset_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
        else {
            txn.rollback().await?;
            anyhow::bail!("Asset {asset_id} not found");
        };

        let mut update = asset::ActiveModel {
            id: Set(model.id),
            analysis_phase: Set(model.analysis_phase.max(stage.phase())),
            version: Set(model.version + 1),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        set_active_stage(&mut update, stage, status);
        update.update(&txn).await?;

        txn.commit().await?;
        Ok(())
    }
}

fn stage_status(model: &asset::Model, stage: PipelineStage) -> StageStatus {
    match stage {
        PipelineStage::Thumbnail => model.thumbnail_status,
        PipelineStage::Metadata => model.metadata_status,
        PipelineStage::Tagging => model.tagging_status,
        PipelineStage::Promotion => model.promotion_status,
    }
}

fn set_snapshot_stage(snapshot: &mut AssetSnapshot, stage: PipelineStage, status: StageStatus) {
    match stage {
        PipelineStage::Thumbnail => snapshot.thumbnail_status = status,
        PipelineStage::Metadata => snapshot.metadata_status = status,
        PipelineStage::Tagging => snapshot.tagging_status = status,
        PipelineStage::Promotion => snapshot.promotion_status = status,
    }
}

fn set_active_stage(active: &mut asset::ActiveModel, stage: PipelineStage, status: StageStatus) {
    match stage {
        PipelineStage::Thumbnail => active.thumbnail_status = Set(status),
        PipelineStage::Metadata => active.metadata_status = Set(status),
        PipelineStage::Tagging => active.tagging_status = Set(status),
        PipelineStage::Promotion => active.promotion_status = Set(status),
    }
}

/// Bump the derivative failure row for (asset, stage), creating it on first
/// failure. The failure count only ever increments.
async fn upsert_derivative_failure<C: sea_orm::ConnectionTrait>(
    conn: &C,
    asset_model: &asset::Model,
    stage: PipelineStage,
    reason: &str,
    detail: &str,
) -> Result<asset_derivative_failure::Model, sea_orm::DbErr> {
    let now = Utc::now();

    let existing = asset_derivative_failure::Entity::find()
        .filter(asset_derivative_failure::Column::AssetId.eq(asset_model.id))
        .filter(asset_derivative_failure::Column::Stage.eq(stage.as_str()))
        .filter(asset_derivative_failure::Column::DeletedAt.is_null())
        .one(conn)
        .await?;

    match existing {
        Some(row) => {
            let update = asset_derivative_failure::ActiveModel {
                id: Set(row.id),
                failure_reason: Set(reason.to_string()),
                detail: Set(detail.to_string()),
                failure_count: Set(row.failure_count + 1),
                last_failed_at: Set(now),
                ..Default::default()
            };
            update.update(conn).await
        }
        None => {
            let model = asset_derivative_failure::ActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(asset_model.tenant_id.clone()),
                asset_id: Set(asset_model.id),
                stage: Set(stage.as_str().to_string()),
                failure_reason: Set(reason.to_string()),
                detail: Set(detail.to_string()),
                failure_count: Set(1),
                last_failed_at: Set(now),
                escalation_ticket_id: Set(None),
                created_at: Set(now),
                deleted_at: Set(None),
            };
            model.insert(conn).await
        }
    }
}
