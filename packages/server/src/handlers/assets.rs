use axum::{
    Json,
    extract::{Path, State},
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::{Actor, Resource, require_manage};
use crate::entity::asset;
use crate::error::{AppError, ErrorBody};
use crate::models::assets::{AssetPipelineResponse, ReconcileResponse};
use crate::state::AppState;

/// Get an asset's pipeline state.
#[utoipa::path(
    get,
    path = "/{id}/pipeline",
    tag = "Assets",
    operation_id = "getAssetPipeline",
    summary = "Get asset pipeline state",
    description = "Per-stage statuses, analysis phase, visibility, and the raw flag bag for one asset.",
    params(("id" = Uuid, Path, description = "Asset ID")),
    responses(
        (status = 200, description = "Pipeline state", body = AssetPipelineResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Asset not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("bearer" = [])),
)]
#[instrument(skip(state, actor), fields(id = %id))]
pub async fn get_asset_pipeline(
    actor: Actor,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AssetPipelineResponse>, AppError> {
    require_manage(state.authorizer.as_ref(), &actor, Resource::Pipeline)?;

    let model = asset::Entity::find_by_id(id)
        .filter(asset::Column::DeletedAt.is_null())
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Asset {} not found", id)))?;

    Ok(Json(model.into()))
}

/// Manually reconcile an asset.
#[utoipa::path(
    post,
    path = "/{id}/reconcile",
    tag = "Assets",
    operation_id = "reconcileAsset",
    summary = "Reconcile asset state",
    description = "Runs the reconciliation rules over the asset's persisted state and applies any corrections. Idempotent: a second call with no intervening writes reports updated = false.",
    params(("id" = Uuid, Path, description = "Asset ID")),
    responses(
        (status = 200, description = "Reconciliation outcome", body = ReconcileResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Asset not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("bearer" = [])),
)]
#[instrument(skip(state, actor), fields(id = %id))]
pub async fn reconcile_asset(
    actor: Actor,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReconcileResponse>, AppError> {
    require_manage(state.authorizer.as_ref(), &actor, Resource::Pipeline)?;

    let exists = asset::Entity::find_by_id(id)
        .filter(asset::Column::DeletedAt.is_null())
        .one(&state.db)
        .await?
        .is_some();
    if !exists {
        return Err(AppError::NotFound(format!("Asset {} not found", id)));
    }

    let outcome = state.engine.reconciler().reconcile_asset(id).await?;

    if outcome.updated {
        info!(
            id = %id,
            actor = %actor.name,
            changes = outcome.changes.len(),
            "Manual reconciliation corrected asset state"
        );
    }

    Ok(Json(ReconcileResponse {
        updated: outcome.updated,
        changes: outcome.changes,
    }))
}
