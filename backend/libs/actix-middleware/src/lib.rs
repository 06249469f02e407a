//! # Actix Middleware Library
//!
//! Middleware shared by the Actix services
//!
//! ## Modules
//! - `jwt_auth`: bearer token authentication, exposes [`UserId`] to handlers
//! - `correlation_id`: request correlation ids for log lookup

pub mod correlation_id;
pub mod jwt_auth;

pub use correlation_id::{CorrelationId, CorrelationIdMiddleware};
pub use jwt_auth::{AuthError, Claims, JwtAuthMiddleware, JwtValidator, UserId};
