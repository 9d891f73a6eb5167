use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use common::{ESCALATION_THRESHOLD, IncidentSource};

use crate::entity::{
    asset_derivative_failure, download, system_incident, ticket, upload_session,
};
use crate::incidents::incident_store;

/// Ticket lifecycle states.
pub struct TicketStatus;

impl TicketStatus {
    pub const OPEN: &'static str = "open";
    pub const CLOSED: &'static str = "closed";
}

/// The uniform escalation predicate shared by every failure-tracking domain.
pub fn escalation_due(failure_count: i32, escalation_ticket_id: Option<Uuid>) -> bool {
    escalation_ticket_id.is_some() || failure_count >= ESCALATION_THRESHOLD
}

/// A failure-tracking row from any of the three domains, viewed through the
/// shared fields.
#[derive(Debug, Clone)]
pub enum FailureEntity {
    Upload(upload_session::Model),
    Download(download::Model),
    Derivative(asset_derivative_failure::Model),
}

impl FailureEntity {
    pub fn source_type(&self) -> IncidentSource {
        match self {
            Self::Upload(_) => IncidentSource::Upload,
            Self::Download(_) => IncidentSource::Download,
            Self::Derivative(_) => IncidentSource::Derivative,
        }
    }

    pub fn source_id(&self) -> String {
        match self {
            Self::Upload(m) => m.id.to_string(),
            Self::Download(m) => m.id.to_string(),
            Self::Derivative(m) => m.id.to_string(),
        }
    }

    pub fn tenant_id(&self) -> &str {
        match self {
            Self::Upload(m) => &m.tenant_id,
            Self::Download(m) => &m.tenant_id,
            Self::Derivative(m) => &m.tenant_id,
        }
    }

    pub fn failure_count(&self) -> i32 {
        match self {
            Self::Upload(m) => m.failure_count,
            Self::Download(m) => m.failure_count,
            Self::Derivative(m) => m.failure_count,
        }
    }

    pub fn escalation_ticket_id(&self) -> Option<Uuid> {
        match self {
            Self::Upload(m) => m.escalation_ticket_id,
            Self::Download(m) => m.escalation_ticket_id,
            Self::Derivative(m) => m.escalation_ticket_id,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Upload(m) => m.failure_reason.as_deref(),
            Self::Download(m) => m.failure_reason.as_deref(),
            Self::Derivative(m) => Some(m.failure_reason.as_str()),
        }
    }

    fn subject(&self) -> String {
        let reason = self.failure_reason().unwrap_or("unknown");
        match self {
            Self::Upload(m) => format!("Upload {} failing: {}", m.id, reason),
            Self::Download(m) => format!("Download {} failing: {}", m.id, reason),
            Self::Derivative(m) => {
                format!("Derivative ({}) for asset {} failing: {}", m.stage, m.asset_id, reason)
            }
        }
    }

    fn body(&self, ai_summary: Option<&str>) -> String {
        let mut body = format!(
            "Repeated pipeline failure.\n\nsource: {} {}\ntenant: {}\nreason: {}\nfailure_count: {}\n",
            self.source_type(),
            self.source_id(),
            self.tenant_id(),
            self.failure_reason().unwrap_or("unknown"),
            self.failure_count(),
        );
        if let Some(summary) = ai_summary {
            body.push_str("\nTriage summary:\n");
            body.push_str(summary);
            body.push('\n');
        }
        body
    }
}

/// Outcome of a `create_ticket_if_needed` call.
///
/// Escalation must never crash the calling pipeline job, so failures are
/// carried here instead of being propagated.
#[derive(Debug, Clone)]
pub struct TicketOutcome {
    pub created: bool,
    pub ticket: Option<ticket::Model>,
    pub error: Option<String>,
}

impl TicketOutcome {
    fn skipped() -> Self {
        Self {
            created: false,
            ticket: None,
            error: None,
        }
    }

    fn existing(ticket: Option<ticket::Model>) -> Self {
        Self {
            created: false,
            ticket,
            error: None,
        }
    }

    fn created(ticket: ticket::Model) -> Self {
        Self {
            created: true,
            ticket: Some(ticket),
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            created: false,
            ticket: None,
            error: Some(error.into()),
        }
    }
}

/// Converts unresolved, escalation-eligible failures into durable support
/// tickets, exactly once per source.
#[derive(Clone)]
pub struct EscalationService {
    db: DatabaseConnection,
}

impl EscalationService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Load the failure-tracking row behind an incident source, if the source
    /// is one of the escalation domains.
    pub async fn load_entity(
        &self,
        source_type: IncidentSource,
        source_id: &str,
    ) -> anyhow::Result<Option<FailureEntity>> {
        let Ok(id) = source_id.parse::<Uuid>() else {
            return Ok(None);
        };

        let entity = match source_type {
            IncidentSource::Upload => upload_session::Entity::find_by_id(id)
                .one(&self.db)
                .await?
                .map(FailureEntity::Upload),
            IncidentSource::Download => download::Entity::find_by_id(id)
                .one(&self.db)
                .await?
                .map(FailureEntity::Download),
            IncidentSource::Derivative => asset_derivative_failure::Entity::find_by_id(id)
                .one(&self.db)
                .await?
                .map(FailureEntity::Derivative),
            IncidentSource::Asset | IncidentSource::Job => None,
        };

        Ok(entity)
    }

    /// Open a ticket for an escalation-eligible incident.
    ///
    /// Idempotent: a `ticket_id` already stamped into the incident metadata
    /// short-circuits to the existing ticket. Returns `Ok(None)` when the
    /// incident's source is not a recognized escalation source.
    #[instrument(skip(self, incident), fields(incident_id = %incident.id))]
    pub async fn create_ticket(
        &self,
        incident: &system_incident::Model,
        ai_summary: Option<String>,
    ) -> anyhow::Result<Option<ticket::Model>> {
        if let Some(existing_id) = incident
            .metadata
            .get("ticket_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<Uuid>().ok())
        {
            let existing = ticket::Entity::find_by_id(existing_id).one(&self.db).await?;
            if existing.is_some() {
                return Ok(existing);
            }
            warn!(
                incident_id = %incident.id,
                ticket_id = %existing_id,
                "Incident references a missing ticket, creating a new one"
            );
        }

        let Ok(source_type) = incident.source_type.parse::<IncidentSource>() else {
            return Ok(None);
        };
        if source_type == IncidentSource::Job {
            // Job-source incidents have no durable entity to hang a ticket on.
            return Ok(None);
        }
        let Some(source_id) = incident.source_id.clone() else {
            return Ok(None);
        };

        let now = Utc::now();
        let model = ticket::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(incident.tenant_id.clone().unwrap_or_else(|| "unknown".into())),
            subject: Set(incident.title.clone()),
            body: Set(incident.message.clone().unwrap_or_else(|| incident.title.clone())),
            severity: Set(incident.severity.clone()),
            source_type: Set(incident.source_type.clone()),
            source_id: Set(source_id),
            incident_id: Set(Some(incident.id)),
            ai_summary: Set(ai_summary),
            status: Set(TicketStatus::OPEN.into()),
            created_at: Set(now),
            closed_at: Set(None),
        };
        let created = model.insert(&self.db).await?;

        incident_store(&self.db)
            .merge_metadata(
                incident,
                serde_json::json!({ "ticket_id": created.id.to_string() }),
            )
            .await?;

        info!(
            incident_id = %incident.id,
            ticket_id = %created.id,
            "Opened support ticket for incident"
        );

        Ok(Some(created))
    }

    /// Open a ticket for a failure-tracking entity once its failure count
    /// reaches the escalation threshold.
    ///
    /// Called from stage-job failure contexts; any internal error is caught,
    /// logged, and reported through the outcome.
    #[instrument(skip(self, entity, ai_summary), fields(source = %entity.source_type(), source_id = %entity.source_id()))]
    pub async fn create_ticket_if_needed(
        &self,
        entity: &FailureEntity,
        ai_summary: Option<String>,
    ) -> TicketOutcome {
        if let Some(ticket_id) = entity.escalation_ticket_id() {
            // Already escalated; surface the existing ticket.
            match ticket::Entity::find_by_id(ticket_id).one(&self.db).await {
                Ok(existing) => return TicketOutcome::existing(existing),
                Err(e) => {
                    warn!(error = %e, ticket_id = %ticket_id, "Failed to load existing ticket");
                    return TicketOutcome::existing(None);
                }
            }
        }

        if !escalation_due(entity.failure_count(), entity.escalation_ticket_id()) {
            return TicketOutcome::skipped();
        }

        match self.open_ticket_for_entity(entity, ai_summary).await {
            Ok(created) => {
                info!(
                    ticket_id = %created.id,
                    failure_count = entity.failure_count(),
                    "Escalated repeated failure to support ticket"
                );
                TicketOutcome::created(created)
            }
            Err(e) => {
                error!(
                    source = %entity.source_type(),
                    source_id = %entity.source_id(),
                    error = %e,
                    "Ticket creation failed; pipeline continues"
                );
                TicketOutcome::failed(e.to_string())
            }
        }
    }

    async fn open_ticket_for_entity(
        &self,
        entity: &FailureEntity,
        ai_summary: Option<String>,
    ) -> anyhow::Result<ticket::Model> {
        let txn = self.db.begin().await?;

        let now = Utc::now();
        let ticket_id = Uuid::new_v4();
        let model = ticket::ActiveModel {
            id: Set(ticket_id),
            tenant_id: Set(entity.tenant_id().to_string()),
            subject: Set(entity.subject()),
            body: Set(entity.body(ai_summary.as_deref())),
            severity: Set("error".into()),
            source_type: Set(entity.source_type().to_string()),
            source_id: Set(entity.source_id()),
            incident_id: Set(None),
            ai_summary: Set(ai_summary),
            status: Set(TicketStatus::OPEN.into()),
            created_at: Set(now),
            closed_at: Set(None),
        };
        let created = model.insert(&txn).await?;

        // Stamp the ticket onto the failure row so the next failure finds it.
        match entity {
            FailureEntity::Upload(m) => {
                let update = upload_session::ActiveModel {
                    id: Set(m.id),
                    escalation_ticket_id: Set(Some(ticket_id)),
                    updated_at: Set(now),
                    ..Default::default()
                };
                update.update(&txn).await?;
            }
            FailureEntity::Download(m) => {
                let update = download::ActiveModel {
                    id: Set(m.id),
                    escalation_ticket_id: Set(Some(ticket_id)),
                    ..Default::default()
                };
                update.update(&txn).await?;
            }
            FailureEntity::Derivative(m) => {
                let update = asset_derivative_failure::ActiveModel {
                    id: Set(m.id),
                    escalation_ticket_id: Set(Some(ticket_id)),
                    ..Default::default()
                };
                update.update(&txn).await?;
            }
        }

        txn.commit().await?;

        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn derivative_row(failure_count: i32, ticket: Option<Uuid>) -> FailureEntity {
        FailureEntity::Derivative(asset_derivative_failure::Model {
            id: Uuid::new_v4(),
            tenant_id: "t-1".into(),
            asset_id: Uuid::new_v4(),
            stage: "thumbnail".into(),
            failure_reason: "encoder_crashed".into(),
            detail: "signal 11".into(),
            failure_count,
            last_failed_at: Utc::now(),
            escalation_ticket_id: ticket,
            created_at: Utc::now(),
            deleted_at: None,
        })
    }

    #[test]
    fn escalation_fires_at_threshold_never_below() {
        assert!(!escalation_due(0, None));
        assert!(!escalation_due(1, None));
        assert!(!escalation_due(2, None));
        assert!(escalation_due(3, None));
        assert!(escalation_due(4, None));
        // An existing ticket makes the count irrelevant.
        assert!(escalation_due(0, Some(Uuid::new_v4())));
    }

    #[tokio::test]
    async fn below_threshold_creates_nothing() {
        // No query expectations: the predicate short-circuits before any
        // database access.
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let service = EscalationService::new(db);

        let outcome = service
            .create_ticket_if_needed(&derivative_row(2, None), None)
            .await;

        assert!(!outcome.created);
        assert!(outcome.ticket.is_none());
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn existing_ticket_is_returned_not_duplicated() {
        let ticket_id = Uuid::new_v4();
        let existing = ticket::Model {
            id: ticket_id,
            tenant_id: "t-1".into(),
            subject: "Derivative failing".into(),
            body: "".into(),
            severity: "error".into(),
            source_type: "derivative".into(),
            source_id: "x".into(),
            incident_id: None,
            ai_summary: None,
            status: "open".into(),
            created_at: Utc::now(),
            closed_at: None,
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![existing.clone()]])
            .into_connection();
        let service = EscalationService::new(db);

        let outcome = service
            .create_ticket_if_needed(&derivative_row(5, Some(ticket_id)), None)
            .await;

        assert!(!outcome.created);
        assert_eq!(outcome.ticket.map(|t| t.id), Some(ticket_id));
    }

    #[tokio::test]
    async fn ticket_creation_failure_is_caught_not_propagated() {
        // Threshold met but the insert errors: the outcome carries the error
        // instead of crashing the calling consumer.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_errors([sea_orm::DbErr::Custom("ticket table unavailable".into())])
            .into_connection();
        let service = EscalationService::new(db);

        let outcome = service
            .create_ticket_if_needed(&derivative_row(3, None), None)
            .await;

        assert!(!outcome.created);
        assert!(outcome.error.is_some());
    }
}
