use std::sync::Arc;

use mq::{BroccoliError, BrokerMessage};
use sea_orm::DatabaseConnection;
use tracing::{debug, error, info, warn};

use common::pipeline::ClassificationRequest;

use crate::incidents::incident_store;
use crate::reliability::classify::{build_prompt, parse_reply};
use crate::reliability::{ClassifierAgent, EscalationService, TicketOutcome};

use super::ConsumerCtx;

/// Consume classification requests and run the agent bridge.
pub async fn consume_classification_requests(
    ctx: Arc<ConsumerCtx>,
    agent: Arc<dyn ClassifierAgent>,
) {
    let queue_name = ctx.queues.classify_queue_name.clone();
    info!(queue = %queue_name, "Starting classification consumer");

    let mq = ctx.mq.clone();
    let result = mq
        .process_messages(
            &queue_name,
            None,
            None,
            move |message: BrokerMessage<ClassificationRequest>| {
                let ctx = ctx.clone();
                let agent = agent.clone();
                async move {
                    let request = message.payload;

                    if let Err(e) =
                        process_classification(&ctx.db, &ctx.escalation, agent.as_ref(), &request)
                            .await
                    {
                        error!(
                            request_id = %request.request_id,
                            error = %e,
                            "Failed to process classification request"
                        );
                        return Err(BroccoliError::Job(e.to_string()));
                    }
                    Ok(())
                }
            },
        )
        .await;

    if let Err(e) = result {
        error!(error = %e, "Classification consumer stopped unexpectedly");
    }
}

/// Run triage for one failure and apply the escalation check.
///
/// Triage is advisory: whatever the agent says (or fails to say), this always
/// ends in the threshold-gated escalation check, so a dead classifier can
/// never suppress a ticket.
async fn process_classification(
    db: &DatabaseConnection,
    escalation: &EscalationService,
    agent: &dyn ClassifierAgent,
    request: &ClassificationRequest,
) -> anyhow::Result<Option<TicketOutcome>> {
    let prompt = build_prompt(request);

    let ai_summary = match agent.classify(&prompt).await {
        Ok(raw) => {
            let triage = parse_reply(&raw);
            info!(
                request_id = %request.request_id,
                severity = %triage.severity,
                has_summary = triage.summary.is_some(),
                "Agent triaged failure"
            );

            // Attach the verdict to the incident for the admin surface.
            if let Some(incident_id) = request.incident_id {
                let store = incident_store(db);
                match store.get_by_id(incident_id).await {
                    Ok(Some(incident)) => {
                        let patch = serde_json::json!({
                            "triage": {
                                "severity": triage.severity.as_str(),
                                "summary": triage.summary,
                                "recommendation": triage.recommendation,
                            }
                        });
                        if let Err(e) = store.merge_metadata(&incident, patch).await {
                            warn!(
                                incident_id = %incident_id,
                                error = %e,
                                "Failed to attach triage to incident"
                            );
                        }
                    }
                    Ok(None) => {
                        debug!(incident_id = %incident_id, "Incident gone before triage landed")
                    }
                    Err(e) => {
                        warn!(incident_id = %incident_id, error = %e, "Failed to load incident")
                    }
                }
            }

            triage.summary
        }
        Err(e) => {
            // Classification failure must not suppress escalation.
            warn!(
                request_id = %request.request_id,
                error = %e,
                "Classification agent failed, continuing without summary"
            );
            None
        }
    };

    match escalation
        .load_entity(request.source_type, &request.source_id)
        .await?
    {
        Some(entity) => {
            let outcome = escalation.create_ticket_if_needed(&entity, ai_summary).await;
            if let Some(ref error) = outcome.error {
                warn!(
                    source = %request.source_type,
                    source_id = %request.source_id,
                    error = %error,
                    "Escalation after triage failed"
                );
            }
            Ok(Some(outcome))
        }
        None => {
            debug!(
                source = %request.source_type,
                source_id = %request.source_id,
                "No failure-tracking entity behind classification request"
            );
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use uuid::Uuid;

    use common::IncidentSource;
    use crate::entity::{asset_derivative_failure, ticket};
    use crate::reliability::classify::ClassifierError;

    struct DeadAgent;

    #[async_trait]
    impl ClassifierAgent for DeadAgent {
        async fn classify(&self, _prompt: &str) -> Result<String, ClassifierError> {
            Err(ClassifierError::Network("simulated timeout".into()))
        }
    }

    #[tokio::test]
    async fn agent_failure_still_reaches_escalation_check() {
        let row_id = Uuid::new_v4();
        let ticket_id = Uuid::new_v4();

        let failure_row = asset_derivative_failure::Model {
            id: row_id,
            tenant_id: "t-1".into(),
            asset_id: Uuid::new_v4(),
            stage: "thumbnail".into(),
            failure_reason: "encoder_crashed".into(),
            detail: "signal 11".into(),
            failure_count: 3,
            last_failed_at: Utc::now(),
            escalation_ticket_id: Some(ticket_id),
            created_at: Utc::now(),
            deleted_at: None,
        };
        let existing_ticket = ticket::Model {
            id: ticket_id,
            tenant_id: "t-1".into(),
            subject: "Derivative failing".into(),
            body: "".into(),
            severity: "error".into(),
            source_type: "derivative".into(),
            source_id: row_id.to_string(),
            incident_id: None,
            ai_summary: None,
            status: "open".into(),
            created_at: Utc::now(),
            closed_at: None,
        };

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![failure_row]])
            .append_query_results([vec![existing_ticket]])
            .into_connection();
        let escalation = EscalationService::new(db.clone());

        let request = ClassificationRequest {
            request_id: "r-1".into(),
            source_type: IncidentSource::Derivative,
            source_id: row_id.to_string(),
            tenant_id: "t-1".into(),
            incident_id: None,
            failure_reason: "encoder_crashed".into(),
            failure_count: 3,
            trace: "signal 11".into(),
        };

        // The agent times out, yet the escalation check still runs and
        // surfaces the ticket.
        let outcome = process_classification(&db, &escalation, &DeadAgent, &request)
            .await
            .unwrap()
            .expect("entity should be found");

        assert!(!outcome.created);
        assert_eq!(outcome.ticket.map(|t| t.id), Some(ticket_id));
        assert!(outcome.error.is_none());
    }
}
