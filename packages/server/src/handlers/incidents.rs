use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, instrument};
use uuid::Uuid;

use common::{IncidentSeverity, IncidentSource};

use crate::auth::{Actor, Resource, require_manage};
use crate::error::{AppError, ErrorBody};
use crate::extractors::json::AppJson;
use crate::incidents::{ResolveResult, incident_store};
use crate::models::incidents::*;
use crate::models::shared::{Pagination, validate_bulk_ids};
use crate::models::tickets::TicketResponse;
use crate::state::AppState;

/// List incidents.
#[utoipa::path(
    get,
    path = "",
    tag = "Incidents",
    operation_id = "listIncidents",
    summary = "List incidents",
    description = "Returns a paginated list of recorded incidents, newest first.",
    params(ListIncidentParams),
    responses(
        (status = 200, description = "List of incidents", body = IncidentListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("bearer" = [])),
)]
#[instrument(skip(state, actor))]
pub async fn list_incidents(
    actor: Actor,
    State(state): State<AppState>,
    Query(params): Query<ListIncidentParams>,
) -> Result<Json<IncidentListResponse>, AppError> {
    require_manage(state.authorizer.as_ref(), &actor, Resource::Incidents)?;

    let source_type = params
        .source_type
        .map(|s| s.parse::<IncidentSource>())
        .transpose()
        .map_err(AppError::Validation)?;
    let severity = params
        .severity
        .map(|s| s.parse::<IncidentSeverity>())
        .transpose()
        .map_err(AppError::Validation)?;

    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).clamp(1, 100);

    let store = incident_store(&state.db);
    let (incidents, total) = store
        .list(source_type, severity, params.resolved, page, per_page)
        .await?;

    let data: Vec<IncidentResponse> = incidents.into_iter().map(Into::into).collect();
    let total_pages = total.div_ceil(per_page);

    Ok(Json(IncidentListResponse {
        data,
        pagination: Pagination {
            page,
            per_page,
            total,
            total_pages,
        },
    }))
}

/// Get incident statistics.
#[utoipa::path(
    get,
    path = "/stats",
    tag = "Incidents",
    operation_id = "getIncidentStats",
    summary = "Get incident statistics",
    responses(
        (status = 200, description = "Incident statistics", body = IncidentStatsResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("bearer" = [])),
)]
#[instrument(skip(state, actor))]
pub async fn get_incident_stats(
    actor: Actor,
    State(state): State<AppState>,
) -> Result<Json<IncidentStatsResponse>, AppError> {
    require_manage(state.authorizer.as_ref(), &actor, Resource::Incidents)?;

    let store = incident_store(&state.db);
    let stats = store.stats().await?;

    Ok(Json(stats.into()))
}

/// Open incidents in triage order.
#[utoipa::path(
    get,
    path = "/triage",
    tag = "Incidents",
    operation_id = "triageIncidents",
    summary = "Open incidents in triage order",
    description = "Unresolved incidents ordered by severity (critical > error > warning > info), ties broken by detection time, most recent first.",
    params(TriageParams),
    responses(
        (status = 200, description = "Incidents in triage order", body = [IncidentResponse]),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("bearer" = [])),
)]
#[instrument(skip(state, actor))]
pub async fn triage_incidents(
    actor: Actor,
    State(state): State<AppState>,
    Query(params): Query<TriageParams>,
) -> Result<Json<Vec<IncidentResponse>>, AppError> {
    require_manage(state.authorizer.as_ref(), &actor, Resource::Incidents)?;

    let limit = params.limit.unwrap_or(100).clamp(1, 500);

    let store = incident_store(&state.db);
    let incidents = store.triage(limit).await?;

    Ok(Json(incidents.into_iter().map(Into::into).collect()))
}

/// Get a single incident by ID.
#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Incidents",
    operation_id = "getIncident",
    summary = "Get incident details",
    params(("id" = Uuid, Path, description = "Incident ID")),
    responses(
        (status = 200, description = "Incident details", body = IncidentResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Incident not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("bearer" = [])),
)]
#[instrument(skip(state, actor), fields(id = %id))]
pub async fn get_incident(
    actor: Actor,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<IncidentResponse>, AppError> {
    require_manage(state.authorizer.as_ref(), &actor, Resource::Incidents)?;

    let store = incident_store(&state.db);
    let incident = store
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Incident {} not found", id)))?;

    Ok(Json(incident.into()))
}

/// Manually resolve an incident.
#[utoipa::path(
    post,
    path = "/{id}/resolve",
    tag = "Incidents",
    operation_id = "resolveIncident",
    summary = "Resolve an incident",
    description = "Marks an incident as resolved by a human. Resolving frees its dedup signature for future reports.",
    params(("id" = Uuid, Path, description = "Incident ID")),
    responses(
        (status = 204, description = "Incident resolved"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Incident not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("bearer" = [])),
)]
#[instrument(skip(state, actor), fields(id = %id))]
pub async fn resolve_incident(
    actor: Actor,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_manage(state.authorizer.as_ref(), &actor, Resource::Incidents)?;

    let result = state.engine.resolve(id, false).await?;

    match result {
        ResolveResult::Resolved => {
            info!(id = %id, actor = %actor.name, "Incident manually resolved");
            Ok(StatusCode::NO_CONTENT)
        }
        ResolveResult::AlreadyResolved => {
            info!(id = %id, "Incident already resolved");
            Ok(StatusCode::NO_CONTENT)
        }
        ResolveResult::NotFound => Err(AppError::NotFound(format!("Incident {} not found", id))),
    }
}

/// Attempt auto-repair for an incident.
#[utoipa::path(
    post,
    path = "/{id}/recover",
    tag = "Incidents",
    operation_id = "recoverIncident",
    summary = "Attempt auto-repair",
    description = "Runs the source-specific repair strategy (reconciliation for asset-sourced incidents). On success the incident is resolved with auto_resolved = true.",
    params(("id" = Uuid, Path, description = "Incident ID")),
    responses(
        (status = 200, description = "Recovery outcome", body = RecoveryResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Incident not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Incident already resolved (CONFLICT)", body = ErrorBody),
    ),
    security(("bearer" = [])),
)]
#[instrument(skip(state, actor), fields(id = %id))]
pub async fn recover_incident(
    actor: Actor,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RecoveryResponse>, AppError> {
    require_manage(state.authorizer.as_ref(), &actor, Resource::Incidents)?;

    let store = incident_store(&state.db);
    let incident = store
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Incident {} not found", id)))?;

    if incident.resolved_at.is_some() {
        return Err(AppError::Conflict("Incident already resolved".into()));
    }

    let outcome = state.engine.attempt_recovery(&incident).await?;

    Ok(Json(RecoveryResponse {
        resolved: outcome.resolved,
        changes: outcome.changes,
    }))
}

/// Escalate an incident to a support ticket.
#[utoipa::path(
    post,
    path = "/{id}/escalate",
    tag = "Incidents",
    operation_id = "escalateIncident",
    summary = "Escalate an incident",
    description = "Opens a support ticket for an unresolved incident. Idempotent: an incident already carrying a ticket returns that ticket.",
    params(("id" = Uuid, Path, description = "Incident ID")),
    responses(
        (status = 200, description = "The (possibly pre-existing) ticket", body = TicketResponse),
        (status = 400, description = "Incident source cannot be escalated (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Incident not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Incident already resolved (CONFLICT)", body = ErrorBody),
    ),
    security(("bearer" = [])),
)]
#[instrument(skip(state, actor), fields(id = %id))]
pub async fn escalate_incident(
    actor: Actor,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TicketResponse>, AppError> {
    require_manage(state.authorizer.as_ref(), &actor, Resource::Incidents)?;

    let store = incident_store(&state.db);
    let incident = store
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Incident {} not found", id)))?;

    if incident.resolved_at.is_some() {
        return Err(AppError::Conflict("Incident already resolved".into()));
    }

    let ticket = state
        .escalation
        .create_ticket(&incident, None)
        .await?
        .ok_or_else(|| {
            AppError::Validation(format!(
                "Incidents with source '{}' cannot be escalated",
                incident.source_type
            ))
        })?;

    info!(id = %id, ticket_id = %ticket.id, actor = %actor.name, "Incident escalated");

    Ok(Json(ticket.into()))
}

/// Bulk-resolve incidents.
#[utoipa::path(
    post,
    path = "/bulk-resolve",
    tag = "Incidents",
    operation_id = "bulkResolveIncidents",
    summary = "Bulk-resolve incidents",
    request_body = BulkResolveRequest,
    responses(
        (status = 200, description = "Incidents resolved", body = BulkResolveResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("bearer" = [])),
)]
#[instrument(skip(state, actor, payload))]
pub async fn bulk_resolve_incidents(
    actor: Actor,
    State(state): State<AppState>,
    AppJson(payload): AppJson<BulkResolveRequest>,
) -> Result<Json<BulkResolveResponse>, AppError> {
    require_manage(state.authorizer.as_ref(), &actor, Resource::Incidents)?;
    validate_bulk_ids(&payload.incident_ids, "incident", 500)?;

    let store = incident_store(&state.db);
    let rows_affected = store.resolve_many(&payload.incident_ids, false).await?;

    info!(
        resolved = rows_affected,
        actor = %actor.name,
        "Bulk resolved incidents"
    );

    Ok(Json(BulkResolveResponse {
        resolved: rows_affected as usize,
    }))
}
