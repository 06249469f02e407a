pub mod conversations;
pub mod messages;

use crate::error::AppError;
use crate::metrics;
use actix_middleware::{JwtAuthMiddleware, JwtValidator};
use actix_web::{web, HttpResponse};
use std::sync::Arc;

/// Register the authenticated API handlers
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(conversations::list_conversations)
        .service(conversations::create_conversation)
        .service(conversations::get_conversation)
        .service(conversations::archive_conversation)
        .service(messages::send_message)
        .service(messages::unread_count)
        .service(messages::unread_by_conversation)
        .service(messages::mark_read);
}

/// Full route table: open health/metrics plus the JWT-guarded `/api/v1` scope
pub fn configure_app(cfg: &mut web::ServiceConfig, validator: Arc<JwtValidator>) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(256 * 1024)
            .error_handler(|err, _req| AppError::Validation(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::Validation(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| AppError::Validation(err.to_string()).into()),
    )
    .route("/health", web::get().to(health))
    .route("/metrics", web::get().to(metrics::metrics_handler))
    .service(
        web::scope("/api/v1")
            .wrap(JwtAuthMiddleware::new(validator))
            .configure(configure),
    );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}
