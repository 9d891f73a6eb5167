use axum::{
    Json,
    extract::{Path, Query, State},
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect};
use tracing::instrument;
use uuid::Uuid;

use crate::auth::{Actor, Resource, require_manage};
use crate::entity::ticket;
use crate::error::{AppError, ErrorBody};
use crate::models::shared::Pagination;
use crate::models::tickets::{ListTicketParams, TicketListResponse, TicketResponse};
use crate::state::AppState;

/// List support tickets.
#[utoipa::path(
    get,
    path = "",
    tag = "Tickets",
    operation_id = "listTickets",
    summary = "List support tickets",
    params(ListTicketParams),
    responses(
        (status = 200, description = "List of tickets", body = TicketListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("bearer" = [])),
)]
#[instrument(skip(state, actor))]
pub async fn list_tickets(
    actor: Actor,
    State(state): State<AppState>,
    Query(params): Query<ListTicketParams>,
) -> Result<Json<TicketListResponse>, AppError> {
    require_manage(state.authorizer.as_ref(), &actor, Resource::Tickets)?;

    if let Some(ref status) = params.status
        && status != "open"
        && status != "closed"
    {
        return Err(AppError::Validation(
            "status must be 'open' or 'closed'".into(),
        ));
    }

    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).clamp(1, 100);

    let mut query = ticket::Entity::find();
    if let Some(status) = params.status {
        query = query.filter(ticket::Column::Status.eq(status));
    }

    let total = query.clone().count(&state.db).await?;

    let tickets = query
        .order_by_desc(ticket::Column::CreatedAt)
        .offset((page.saturating_sub(1)) * per_page)
        .limit(per_page)
        .all(&state.db)
        .await?;

    let data: Vec<TicketResponse> = tickets.into_iter().map(Into::into).collect();
    let total_pages = total.div_ceil(per_page);

    Ok(Json(TicketListResponse {
        data,
        pagination: Pagination {
            page,
            per_page,
            total,
            total_pages,
        },
    }))
}

/// Get a single ticket by ID.
#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Tickets",
    operation_id = "getTicket",
    summary = "Get ticket details",
    params(("id" = Uuid, Path, description = "Ticket ID")),
    responses(
        (status = 200, description = "Ticket details", body = TicketResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Ticket not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("bearer" = [])),
)]
#[instrument(skip(state, actor), fields(id = %id))]
pub async fn get_ticket(
    actor: Actor,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TicketResponse>, AppError> {
    require_manage(state.authorizer.as_ref(), &actor, Resource::Tickets)?;

    let model = ticket::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Ticket {} not found", id)))?;

    Ok(Json(model.into()))
}
