//! Prometheus gauges for the database connection pool

use once_cell::sync::Lazy;
use prometheus::{IntGaugeVec, Opts};
use sqlx::PgPool;

static DB_POOL_CONNECTIONS: Lazy<IntGaugeVec> = Lazy::new(|| {
    let gauge = IntGaugeVec::new(
        Opts::new(
            "db_pool_connections",
            "Database pool connection count by state",
        ),
        &["service", "state"],
    )
    .expect("failed to create db_pool_connections");
    // AlreadyReg when a second pool is created in the same process
    let _ = prometheus::default_registry().register(Box::new(gauge.clone()));
    gauge
});

/// Update connection pool gauges (called periodically)
pub(crate) fn update_pool_metrics(pool: &PgPool, service: &str) {
    let size = pool.size() as i64;
    let idle = pool.num_idle() as i64;

    DB_POOL_CONNECTIONS
        .with_label_values(&[service, "idle"])
        .set(idle);
    DB_POOL_CONNECTIONS
        .with_label_values(&[service, "active"])
        .set(size - idle);
    DB_POOL_CONNECTIONS
        .with_label_values(&[service, "max"])
        .set(pool.options().get_max_connections() as i64);
}
