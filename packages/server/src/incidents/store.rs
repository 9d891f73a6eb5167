use std::collections::HashMap;

use chrono::Utc;
use common::{FailureReport, IncidentSeverity, IncidentSource};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
};
use uuid::Uuid;

use crate::entity::system_incident;

/// Result of attempting to resolve an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveResult {
    /// Incident was successfully resolved.
    Resolved,
    /// Incident was not found.
    NotFound,
    /// Incident was already resolved.
    AlreadyResolved,
}

/// Aggregate counts over the incident log.
#[derive(Debug, Clone)]
pub struct IncidentStats {
    pub total_unresolved: u64,
    pub total_resolved: u64,
    /// Unresolved incident count grouped by source type.
    pub unresolved_by_source: HashMap<String, u64>,
    /// Unresolved incident count grouped by severity.
    pub unresolved_by_severity: HashMap<String, u64>,
}

/// Append/query layer over the durable incident log.
pub struct IncidentStore<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> IncidentStore<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Persist a failure report as an incident.
    ///
    /// When the report carries a `unique_signature` and an unresolved
    /// incident with the same signature already exists, that incident is
    /// returned and no new row is written. The check-then-insert is backed by
    /// the unique constraint on `open_signature`, so two concurrent calls
    /// still end with exactly one open row.
    pub async fn record(&self, report: &FailureReport) -> Result<system_incident::Model, DbErr> {
        if let Some(signature) = &report.unique_signature
            && let Some(existing) = self.find_open_by_signature(signature).await?
        {
            return Ok(existing);
        }

        let now = Utc::now();
        let model = system_incident::ActiveModel {
            id: Set(Uuid::new_v4()),
            source_type: Set(report.source_type.to_string()),
            source_id: Set(report.source_id.clone()),
            tenant_id: Set(report.tenant_id.clone()),
            severity: Set(report.severity.to_string()),
            title: Set(report.title.clone()),
            message: Set(report.message.clone()),
            metadata: Set(report.metadata.clone()),
            retryable: Set(report.retryable),
            requires_support: Set(report.requires_support),
            auto_resolved: Set(false),
            unique_signature: Set(report.unique_signature.clone()),
            open_signature: Set(report.unique_signature.clone()),
            detected_at: Set(now),
            resolved_at: Set(None),
        };

        match model.insert(self.conn).await {
            Ok(inserted) => Ok(inserted),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                // Lost the race: another writer opened the incident first.
                let Some(signature) = &report.unique_signature else {
                    return Err(e);
                };
                self.find_open_by_signature(signature)
                    .await?
                    .ok_or_else(|| {
                        DbErr::Custom(
                            "UniqueConstraintViolation but existing open incident not found"
                                .to_string(),
                        )
                    })
            }
            Err(e) => Err(e),
        }
    }

    /// Find the unresolved incident carrying the given dedup signature.
    pub async fn find_open_by_signature(
        &self,
        signature: &str,
    ) -> Result<Option<system_incident::Model>, DbErr> {
        system_incident::Entity::find()
            .filter(system_incident::Column::OpenSignature.eq(signature))
            .one(self.conn)
            .await
    }

    /// List incidents, newest first.
    pub async fn list(
        &self,
        source_type: Option<IncidentSource>,
        severity: Option<IncidentSeverity>,
        resolved: Option<bool>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<system_incident::Model>, u64), DbErr> {
        let mut query = system_incident::Entity::find();

        if let Some(src) = source_type {
            query = query.filter(system_incident::Column::SourceType.eq(src.as_str()));
        }
        if let Some(sev) = severity {
            query = query.filter(system_incident::Column::Severity.eq(sev.as_str()));
        }
        if let Some(res) = resolved {
            if res {
                query = query.filter(system_incident::Column::ResolvedAt.is_not_null());
            } else {
                query = query.filter(system_incident::Column::ResolvedAt.is_null());
            }
        }

        let total = query.clone().count(self.conn).await?;

        let incidents = query
            .order_by_desc(system_incident::Column::DetectedAt)
            .offset((page.saturating_sub(1)) * per_page)
            .limit(per_page)
            .all(self.conn)
            .await?;

        Ok((incidents, total))
    }

    /// Unresolved incidents in triage order: severity first
    /// (critical > error > warning > info), then most recent.
    pub async fn triage(&self, limit: u64) -> Result<Vec<system_incident::Model>, DbErr> {
        let mut open: Vec<system_incident::Model> = system_incident::Entity::find()
            .filter(system_incident::Column::ResolvedAt.is_null())
            .order_by_desc(system_incident::Column::DetectedAt)
            .limit(limit)
            .all(self.conn)
            .await?;

        open.sort_by(|a, b| {
            let rank = |m: &system_incident::Model| {
                m.severity
                    .parse::<IncidentSeverity>()
                    .map(|s| s.rank())
                    .unwrap_or(0)
            };
            rank(b)
                .cmp(&rank(a))
                .then(b.detected_at.cmp(&a.detected_at))
        });

        Ok(open)
    }

    /// Get a single incident by ID.
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<system_incident::Model>, DbErr> {
        system_incident::Entity::find_by_id(id).one(self.conn).await
    }

    /// Mark an incident as resolved, clearing its open signature so the
    /// signature can be reported again later.
    pub async fn resolve(&self, id: Uuid, auto: bool) -> Result<ResolveResult, DbErr> {
        let update = system_incident::Entity::update_many()
            .col_expr(
                system_incident::Column::ResolvedAt,
                sea_orm::sea_query::Expr::value(Utc::now()),
            )
            .col_expr(
                system_incident::Column::AutoResolved,
                sea_orm::sea_query::Expr::value(auto),
            )
            .col_expr(
                system_incident::Column::OpenSignature,
                sea_orm::sea_query::Expr::value(Option::<String>::None),
            )
            .filter(system_incident::Column::Id.eq(id))
            .filter(system_incident::Column::ResolvedAt.is_null());

        let update_result = update.exec(self.conn).await?;

        if update_result.rows_affected > 0 {
            return Ok(ResolveResult::Resolved);
        }

        let exists = system_incident::Entity::find_by_id(id)
            .one(self.conn)
            .await?
            .is_some();

        if exists {
            Ok(ResolveResult::AlreadyResolved)
        } else {
            Ok(ResolveResult::NotFound)
        }
    }

    /// Resolve multiple incidents at once. Returns the number of rows
    /// affected.
    pub async fn resolve_many(&self, ids: &[Uuid], auto: bool) -> Result<u64, DbErr> {
        let result = system_incident::Entity::update_many()
            .col_expr(
                system_incident::Column::ResolvedAt,
                sea_orm::sea_query::Expr::value(Utc::now()),
            )
            .col_expr(
                system_incident::Column::AutoResolved,
                sea_orm::sea_query::Expr::value(auto),
            )
            .col_expr(
                system_incident::Column::OpenSignature,
                sea_orm::sea_query::Expr::value(Option::<String>::None),
            )
            .filter(system_incident::Column::Id.is_in(ids.to_vec()))
            .filter(system_incident::Column::ResolvedAt.is_null())
            .exec(self.conn)
            .await?;

        Ok(result.rows_affected)
    }

    /// Merge keys into an incident's metadata bag.
    pub async fn merge_metadata(
        &self,
        incident: &system_incident::Model,
        patch: serde_json::Value,
    ) -> Result<system_incident::Model, DbErr> {
        let mut metadata = if incident.metadata.is_object() {
            incident.metadata.clone()
        } else {
            serde_json::json!({})
        };
        if let (Some(bag), Some(extra)) = (metadata.as_object_mut(), patch.as_object()) {
            for (k, v) in extra {
                bag.insert(k.clone(), v.clone());
            }
        }

        let update = system_incident::ActiveModel {
            id: Set(incident.id),
            metadata: Set(metadata),
            ..Default::default()
        };
        update.update(self.conn).await
    }

    /// Aggregate counts for the admin dashboard.
    pub async fn stats(&self) -> Result<IncidentStats, DbErr> {
        let total_resolved = system_incident::Entity::find()
            .filter(system_incident::Column::ResolvedAt.is_not_null())
            .count(self.conn)
            .await?;

        let unresolved_data: Vec<(String, String)> = system_incident::Entity::find()
            .select_only()
            .column(system_incident::Column::SourceType)
            .column(system_incident::Column::Severity)
            .filter(system_incident::Column::ResolvedAt.is_null())
            .into_tuple()
            .all(self.conn)
            .await?;

        let total_unresolved = unresolved_data.len() as u64;
        let mut unresolved_by_source: HashMap<String, u64> = HashMap::new();
        let mut unresolved_by_severity: HashMap<String, u64> = HashMap::new();

        for (source_type, severity) in unresolved_data {
            *unresolved_by_source.entry(source_type).or_insert(0) += 1;
            *unresolved_by_severity.entry(severity).or_insert(0) += 1;
        }

        Ok(IncidentStats {
            total_unresolved,
            total_resolved,
            unresolved_by_source,
            unresolved_by_severity,
        })
    }
}

/// Create an IncidentStore over a DatabaseConnection.
pub fn incident_store(db: &DatabaseConnection) -> IncidentStore<'_, DatabaseConnection> {
    IncidentStore::new(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::IncidentSeverity;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn open_incident(signature: &str) -> system_incident::Model {
        system_incident::Model {
            id: Uuid::new_v4(),
            source_type: "asset".into(),
            source_id: Some("a-1".into()),
            tenant_id: Some("t-1".into()),
            severity: "error".into(),
            title: "Asset stuck".into(),
            message: None,
            metadata: serde_json::json!({}),
            retryable: true,
            requires_support: false,
            auto_resolved: false,
            unique_signature: Some(signature.into()),
            open_signature: Some(signature.into()),
            detected_at: Utc::now(),
            resolved_at: None,
        }
    }

    #[tokio::test]
    async fn record_returns_existing_open_incident_for_same_signature() {
        let existing = open_incident("stuck:a-1");
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![existing.clone()]])
            .into_connection();

        let report = FailureReport::new(
            IncidentSource::Asset,
            "a-1",
            IncidentSeverity::Error,
            "Asset stuck",
        )
        .signature("stuck:a-1");

        let store = incident_store(&db);
        let recorded = store.record(&report).await.unwrap();

        // No insert happened; the open incident was returned as-is.
        assert_eq!(recorded.id, existing.id);
        assert_eq!(recorded.open_signature.as_deref(), Some("stuck:a-1"));
    }

    #[tokio::test]
    async fn triage_orders_by_severity_then_recency() {
        let mut warn = open_incident("w");
        warn.severity = "warning".into();
        warn.detected_at = Utc::now();

        let mut critical = open_incident("c");
        critical.severity = "critical".into();
        critical.detected_at = Utc::now() - chrono::Duration::hours(2);

        let mut newer_error = open_incident("e2");
        newer_error.severity = "error".into();
        newer_error.detected_at = Utc::now();

        let mut older_error = open_incident("e1");
        older_error.severity = "error".into();
        older_error.detected_at = Utc::now() - chrono::Duration::hours(1);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                warn.clone(),
                critical.clone(),
                newer_error.clone(),
                older_error.clone(),
            ]])
            .into_connection();

        let store = incident_store(&db);
        let triaged = store.triage(100).await.unwrap();

        let ids: Vec<Uuid> = triaged.iter().map(|m| m.id).collect();
        assert_eq!(
            ids,
            vec![critical.id, newer_error.id, older_error.id, warn.id]
        );
    }
}
