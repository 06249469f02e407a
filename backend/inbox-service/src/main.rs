use actix_middleware::{CorrelationIdMiddleware, JwtValidator};
use actix_web::{web, App, HttpServer};
use inbox_service::{
    config::{self, StoreBackend},
    db, error, logging, metrics, routes,
    services::TracingNotifier,
    state::AppState,
    store::PgStore,
};
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

#[actix_web::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);
    tracing::info!(config = ?cfg, "starting inbox-service");
    metrics::init();

    let state = match cfg.store_backend {
        StoreBackend::Postgres => {
            let database_url = cfg
                .database_url
                .as_deref()
                .ok_or_else(|| error::AppError::Config("DATABASE_URL missing".into()))?;
            let pool = db::init_pool(database_url)
                .await
                .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;
            db::run_migrations(&pool)
                .await
                .map_err(|e| error::AppError::StartServer(format!("migrations: {e}")))?;

            let store = Arc::new(PgStore::new(pool));
            AppState::new(cfg.clone(), store.clone(), store, Arc::new(TracingNotifier))
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; data is lost on restart");
            AppState::in_memory(cfg.clone())
        }
    };

    let validator = Arc::new(JwtValidator::hs256(cfg.jwt_secret.as_bytes()));
    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "inbox-service listening");

    HttpServer::new(move || {
        let validator = validator.clone();
        App::new()
            .wrap(CorrelationIdMiddleware)
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(|cfg| routes::configure_app(cfg, validator))
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind {bind_addr}: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(format!("run: {e}")))
}
