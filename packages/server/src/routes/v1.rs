use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::handlers;
use crate::state::AppState;

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/incidents", incident_routes())
        .nest("/assets", asset_routes())
        .nest("/tickets", ticket_routes())
}

fn incident_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::incidents::list_incidents))
        .routes(routes!(handlers::incidents::get_incident_stats))
        .routes(routes!(handlers::incidents::triage_incidents))
        .routes(routes!(handlers::incidents::bulk_resolve_incidents))
        .routes(routes!(handlers::incidents::get_incident))
        .routes(routes!(handlers::incidents::resolve_incident))
        .routes(routes!(handlers::incidents::recover_incident))
        .routes(routes!(handlers::incidents::escalate_incident))
}

fn asset_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::assets::get_asset_pipeline))
        .routes(routes!(handlers::assets::reconcile_asset))
}

fn ticket_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::tickets::list_tickets))
        .routes(routes!(handlers::tickets::get_ticket))
}
