use std::sync::Arc;

use mq::{BroccoliError, BrokerMessage};
use tracing::{error, info};

use common::pipeline::{StageOutcome, StageResult};

use super::ConsumerCtx;

/// Consume stage results from the result queue.
pub async fn consume_stage_results(ctx: Arc<ConsumerCtx>) {
    let queue_name = ctx.queues.result_queue_name.clone();
    info!(queue = %queue_name, "Starting stage result consumer");

    let mq = ctx.mq.clone();
    let result = mq
        .process_messages(
            &queue_name,
            None,
            None,
            move |message: BrokerMessage<StageResult>| {
                let ctx = ctx.clone();
                async move {
                    let result = message.payload;
                    let job_id = result.job_id.clone();

                    if let Err(e) = process_stage_result(&ctx, &result).await {
                        error!(
                            asset_id = %result.asset_id,
                            stage = %result.stage,
                            job_id = %job_id,
                            error = %e,
                            "Failed to process stage result"
                        );
                        return Err(BroccoliError::Job(e.to_string()));
                    }
                    Ok(())
                }
            },
        )
        .await;

    if let Err(e) = result {
        error!(error = %e, "Stage result consumer stopped unexpectedly");
    }
}

/// Process a single stage result.
///
/// Success flows into the orchestrator; failure is recorded and re-emitted as
/// a `FailureReported` event for the triage/escalation subscriber. The two
/// are deliberately decoupled through the queue.
async fn process_stage_result(ctx: &ConsumerCtx, result: &StageResult) -> anyhow::Result<()> {
    match &result.outcome {
        StageOutcome::Completed { artifacts } => {
            ctx.pipeline.complete_stage(result, artifacts).await
        }
        StageOutcome::Failed {
            reason,
            detail,
            retryable,
        } => {
            let Some(event) = ctx
                .pipeline
                .fail_stage(result, reason, detail, *retryable)
                .await?
            else {
                return Ok(());
            };

            ctx.mq
                .publish(&ctx.queues.failure_queue_name, None, &event, None)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to publish failure event: {e}"))?;

            info!(
                asset_id = %result.asset_id,
                stage = %result.stage,
                reason = %reason,
                failure_count = event.failure_count,
                "Stage failure recorded and reported"
            );

            Ok(())
        }
    }
}
