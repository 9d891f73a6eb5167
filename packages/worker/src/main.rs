mod config;
mod error;
mod handlers;

use anyhow::Context;
use common::IncidentSource;
use common::config::RetryPolicyConfig;
use common::mq::{Message, QueueTask};
use common::pipeline::{FailureReported, StageJob, StageOutcome, StageResult};
use common::retry::{
    RetryCleanupGuard, RetryDecision, RetryTracker, calculate_backoff, spawn_cleanup_task,
};
use common::DerivativeFailureReason;
use error::WorkerError;
use mq::{BroccoliError, BrokerMessage, MqConfig, init_mq};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = config::WorkerAppConfig::load().context("Failed to load config")?;
    info!("Worker starting: {}", config.worker.id);

    let mq = Arc::new(
        init_mq(MqConfig {
            url: config.mq.url.clone(),
            pool_size: config.mq.pool_size,
        })
        .await
        .context("Failed to initialize MQ")?,
    );

    info!(
        stage_queue = %config.mq.stage_queue_name,
        result_queue = %config.mq.result_queue_name,
        failure_queue = %config.mq.failure_queue_name,
        max_retries = config.mq.retry.max_retries,
        "MQ connected"
    );

    let result_queue = config.mq.result_queue_name.clone();
    let failure_queue = config.mq.failure_queue_name.clone();
    let retry_config = config.mq.retry.clone();
    let mq_for_handler = Arc::clone(&mq);

    let retry_tracker = Arc::new(Mutex::new(RetryTracker::new(retry_config.max_retries)));

    // TODO: Store handle for graceful shutdown. Currently the task runs until
    // process exit.
    let _cleanup_handle = spawn_cleanup_task(
        retry_tracker.clone(),
        Duration::from_secs(retry_config.cleanup_interval_secs),
        Duration::from_secs(retry_config.max_age_secs),
    );

    let result = mq
        .process_messages(
            &config.mq.stage_queue_name,
            Some(config.worker.batch_size), // concurrent workers
            None,
            move |message: BrokerMessage<QueueTask>| {
                let mq = Arc::clone(&mq_for_handler);
                let result_queue = result_queue.clone();
                let failure_queue = failure_queue.clone();
                let retry_config = retry_config.clone();
                let retry_tracker = Arc::clone(&retry_tracker);
                async move {
                    process_message(
                        message,
                        &mq,
                        &result_queue,
                        &failure_queue,
                        &retry_config,
                        &retry_tracker,
                    )
                    .await
                }
            },
        )
        .await;

    if let Err(e) = result {
        error!(error = %e, "Worker stopped unexpectedly");
    }

    Ok(())
}

async fn process_message(
    message: BrokerMessage<QueueTask>,
    mq: &Arc<mq::Mq>,
    result_queue: &str,
    failure_queue: &str,
    retry_config: &RetryPolicyConfig,
    retry_tracker: &Arc<Mutex<RetryTracker>>,
) -> Result<(), BroccoliError> {
    let task = message.payload;
    let job_id = task.message_id().to_string();

    if task.task_type != "stage" {
        warn!(task_type = %task.task_type, "Unknown task type, skipping");
        return Ok(());
    }

    let job: StageJob = match serde_json::from_value(task.payload.clone()) {
        Ok(j) => j,
        Err(e) => {
            error!(job_id = %job_id, error = %e, "Failed to parse StageJob");

            // Salvage what identifiers we can so the server can still record
            // the failure against something.
            let asset_id = task
                .payload
                .get("asset_id")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<Uuid>().ok());
            let tenant_id = task
                .payload
                .get("tenant_id")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string();

            let event = FailureReported {
                event_id: Uuid::new_v4().to_string(),
                source_type: IncidentSource::Job,
                source_id: job_id.clone(),
                tenant_id,
                asset_id,
                stage: None,
                failure_reason: "payload_invalid".into(),
                failure_count: 1,
                detail: format!("Failed to parse StageJob: {}", e),
                incident_id: None,
            };

            if let Err(pub_err) = mq.publish(failure_queue, None, &event, None).await {
                error!(error = %pub_err, "Failed to publish failure event");
            }

            return Ok(());
        }
    };

    let asset_id = job.asset_id;

    let mut cleanup_guard = RetryCleanupGuard::new(retry_tracker, &job_id);

    loop {
        match process_job(&job, mq, result_queue).await {
            Ok(()) => {
                retry_tracker.lock().await.clear(&job_id);
                cleanup_guard.defuse();
                return Ok(());
            }
            Err(e) => {
                let error_str = e.to_string();
                let decision = retry_tracker
                    .lock()
                    .await
                    .record_failure(&job_id, &error_str);

                match decision {
                    RetryDecision::Retry { attempt, .. } => {
                        let delay = calculate_backoff(
                            attempt,
                            retry_config.base_delay_ms,
                            retry_config.max_delay_ms,
                        );
                        warn!(
                            asset_id = %asset_id,
                            job_id = %job_id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Retrying stage job processing"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::Exhausted { history } => {
                        error!(
                            asset_id = %asset_id,
                            job_id = %job_id,
                            retry_count = history.len(),
                            error = %e,
                            "Transient retries exhausted, reporting stage failure"
                        );

                        let result = StageResult {
                            job_id: job_id.clone(),
                            asset_id,
                            tenant_id: job.tenant_id.clone(),
                            stage: job.stage,
                            outcome: StageOutcome::Failed {
                                reason: DerivativeFailureReason::Timeout.as_str().into(),
                                detail: error_str,
                                retryable: true,
                            },
                        };

                        if let Err(pub_err) = mq.publish(result_queue, None, &result, None).await {
                            error!(error = %pub_err, "Failed to publish exhausted stage result");
                            return Err(BroccoliError::Publish(format!(
                                "Failed to publish stage result: {}",
                                pub_err
                            )));
                        }

                        cleanup_guard.defuse();
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn process_job(
    job: &StageJob,
    mq: &Arc<mq::Mq>,
    result_queue: &str,
) -> Result<(), BroccoliError> {
    info!(
        asset_id = %job.asset_id,
        job_id = %job.job_id,
        stage = %job.stage,
        "Processing stage job"
    );

    let outcome = match handlers::handle_stage(job) {
        Ok(artifacts) => StageOutcome::Completed { artifacts },
        Err(WorkerError::Stage { reason, detail }) => {
            warn!(
                asset_id = %job.asset_id,
                stage = %job.stage,
                reason = %reason,
                "Stage handler reported domain failure"
            );
            StageOutcome::Failed {
                reason: reason.as_str().into(),
                detail,
                retryable: reason.is_retryable(),
            }
        }
        Err(WorkerError::Queue(e)) => {
            return Err(BroccoliError::Job(e));
        }
    };

    let result = StageResult {
        job_id: job.job_id.clone(),
        asset_id: job.asset_id,
        tenant_id: job.tenant_id.clone(),
        stage: job.stage,
        outcome,
    };

    mq.publish(result_queue, None, &result, None)
        .await
        .map_err(|e| BroccoliError::Publish(format!("Failed to publish StageResult: {e}")))?;

    info!(
        asset_id = %result.asset_id,
        stage = %result.stage,
        completed = matches!(result.outcome, StageOutcome::Completed { .. }),
        "Published stage result"
    );

    Ok(())
}
