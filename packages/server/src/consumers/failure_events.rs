use std::sync::Arc;

use mq::{BroccoliError, BrokerMessage};
use tracing::{debug, error, info};
use uuid::Uuid;

use common::pipeline::{ClassificationRequest, FailureReported};
use common::{
    DerivativeFailureReason, DownloadFailureReason, FailureReport, IncidentSeverity,
    IncidentSource, UploadFailureReason,
};

use crate::reliability::should_classify;

use super::ConsumerCtx;

/// Consume failure-reported events.
///
/// This subscriber owns the triage decision: repeated or critical failures go
/// to the classification queue, everything else goes straight to the
/// (threshold-gated) escalation check. The stage-result consumer that emitted
/// the event knows nothing about either.
pub async fn consume_failure_events(ctx: Arc<ConsumerCtx>) {
    let queue_name = ctx.queues.failure_queue_name.clone();
    info!(queue = %queue_name, "Starting failure event consumer");

    let mq = ctx.mq.clone();
    let result = mq
        .process_messages(
            &queue_name,
            None,
            None,
            move |message: BrokerMessage<FailureReported>| {
                let ctx = ctx.clone();
                async move {
                    let event = message.payload;

                    if let Err(e) = process_failure_event(&ctx, &event).await {
                        error!(
                            source = %event.source_type,
                            source_id = %event.source_id,
                            error = %e,
                            "Failed to process failure event"
                        );
                        return Err(BroccoliError::Job(e.to_string()));
                    }
                    Ok(())
                }
            },
        )
        .await;

    if let Err(e) = result {
        error!(error = %e, "Failure event consumer stopped unexpectedly");
    }
}

async fn process_failure_event(ctx: &ConsumerCtx, event: &FailureReported) -> anyhow::Result<()> {
    // Worker-originated events (e.g. undecodable payloads) arrive without an
    // incident; the funnel records one here so nothing fails silently.
    let incident_id = match event.incident_id {
        Some(id) => Some(id),
        None => {
            let report = FailureReport::new(
                event.source_type,
                event.source_id.clone(),
                IncidentSeverity::Error,
                format!("{} failure: {}", event.source_type, event.failure_reason),
            )
            .tenant(event.tenant_id.clone())
            .message(event.detail.clone())
            .signature(format!(
                "{}-failed:{}",
                event.source_type, event.source_id
            ));
            Some(ctx.pipeline.engine().report(&report).await?.id)
        }
    };

    let critical = reason_is_critical(event.source_type, &event.failure_reason);

    if ctx.classifier.enabled && should_classify(event.failure_count, critical) {
        let request = ClassificationRequest {
            request_id: Uuid::new_v4().to_string(),
            source_type: event.source_type,
            source_id: event.source_id.clone(),
            tenant_id: event.tenant_id.clone(),
            incident_id,
            failure_reason: event.failure_reason.clone(),
            failure_count: event.failure_count,
            trace: event.detail.clone(),
        };
        ctx.mq
            .publish(&ctx.queues.classify_queue_name, None, &request, None)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to enqueue classification request: {e}"))?;

        info!(
            source = %event.source_type,
            source_id = %event.source_id,
            failure_count = event.failure_count,
            critical,
            "Dispatched failure for AI triage"
        );
        return Ok(());
    }

    // No triage warranted; apply the escalation threshold directly.
    match ctx
        .escalation
        .load_entity(event.source_type, &event.source_id)
        .await?
    {
        Some(entity) => {
            let outcome = ctx.escalation.create_ticket_if_needed(&entity, None).await;
            if outcome.created {
                info!(
                    source = %event.source_type,
                    source_id = %event.source_id,
                    "Failure escalated to ticket without triage"
                );
            }
        }
        None => {
            debug!(
                source = %event.source_type,
                source_id = %event.source_id,
                "No failure-tracking entity behind event, nothing to escalate"
            );
        }
    }

    Ok(())
}

/// Per-domain critical sets for the triage dispatch condition.
fn reason_is_critical(source: IncidentSource, reason: &str) -> bool {
    match source {
        IncidentSource::Upload => reason
            .parse::<UploadFailureReason>()
            .map(|r| r.is_classification_critical())
            .unwrap_or(false),
        IncidentSource::Download => reason
            .parse::<DownloadFailureReason>()
            .map(|r| r.is_classification_critical())
            .unwrap_or(false),
        IncidentSource::Derivative => reason
            .parse::<DerivativeFailureReason>()
            .map(|r| r.is_classification_critical())
            .unwrap_or(false),
        IncidentSource::Asset | IncidentSource::Job => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_sets_are_per_domain() {
        assert!(reason_is_critical(IncidentSource::Upload, "transfer_failed"));
        assert!(reason_is_critical(
            IncidentSource::Derivative,
            "encoder_crashed"
        ));
        assert!(reason_is_critical(
            IncidentSource::Download,
            "integrity_check_failed"
        ));
        // A reason string from the wrong domain does not count.
        assert!(!reason_is_critical(
            IncidentSource::Download,
            "transfer_failed"
        ));
        assert!(!reason_is_critical(IncidentSource::Job, "anything"));
    }
}
