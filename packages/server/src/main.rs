use std::sync::Arc;

use anyhow::Context;
use mq::{MqConfig, init_mq};
use tower_http::cors::CorsLayer;
use tracing::{Level, info, warn};

use server::auth::RoleAuthorizer;
use server::config::AppConfig;
use server::consumers::{
    ConsumerCtx, consume_classification_requests, consume_failure_events, consume_stage_results,
    consume_upload_finalized,
};
use server::database;
use server::incidents::run_stuck_asset_detector;
use server::locks::AssetLocks;
use server::pipeline::Pipeline;
use server::reliability::{
    ClassifierAgent, EscalationService, HttpClassifierAgent, ReliabilityEngine,
};
use server::services::{ActivitySink, CachedPlanService, PlanService, StaticPlanService};
use server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = AppConfig::load().context("Failed to load config")?;

    let db = database::init_db(&config.database.url)
        .await
        .context("Failed to initialize database")?;

    let locks = AssetLocks::new();
    let engine = ReliabilityEngine::new(db.clone(), locks.clone());
    let escalation = EscalationService::new(db.clone());

    if config.mq.enabled {
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
            "MQ connected"
        );

        let activity = ActivitySink::new(Some(mq.clone()), config.mq.activity_queue_name.clone());
        let plans: Arc<dyn PlanService> = Arc::new(CachedPlanService::new(
            StaticPlanService::new(
                config.plans.allow_ai_tagging,
                config.plans.tenant_overrides.clone(),
            ),
            config.plans.cache_size,
        ));
        let pipeline = Pipeline::new(
            db.clone(),
            mq.clone(),
            locks.clone(),
            plans,
            activity,
            config.mq.clone(),
        );

        let ctx = Arc::new(ConsumerCtx {
            db: db.clone(),
            mq: mq.clone(),
            pipeline,
            escalation: escalation.clone(),
            queues: config.mq.clone(),
            classifier: config.classifier.clone(),
        });

        tokio::spawn(consume_upload_finalized(ctx.clone()));
        tokio::spawn(consume_stage_results(ctx.clone()));
        tokio::spawn(consume_failure_events(ctx.clone()));

        if config.classifier.enabled {
            let agent: Arc<dyn ClassifierAgent> = Arc::new(
                HttpClassifierAgent::new(&config.classifier)
                    .context("Failed to build classifier agent")?,
            );
            tokio::spawn(consume_classification_requests(ctx.clone(), agent));
        } else {
            info!("Classifier disabled; failures escalate on thresholds alone");
        }
    } else {
        warn!("MQ disabled; pipeline consumers not started");
    }

    tokio::spawn(run_stuck_asset_detector(
        db.clone(),
        locks.clone(),
        config.stuck.clone(),
    ));

    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = AppState {
        db,
        config,
        authorizer: Arc::new(RoleAuthorizer),
        engine,
        escalation,
    };

    let app = server::build_router(state).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server running at http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
