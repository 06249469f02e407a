//! Conversation and unread-counter engine behind the marketplace inbox.
//!
//! The engine (models, stores, services) is storage independent; `routes`
//! is a thin actix-web boundary over it.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

pub use error::{AppError, AppResult};
pub use state::AppState;
