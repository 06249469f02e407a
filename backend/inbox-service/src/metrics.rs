use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, TextEncoder};

static MESSAGES_CREATED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "inbox_service_messages_created_total",
        "Messages inserted (idempotent replays excluded)",
    )
    .expect("failed to create inbox_service_messages_created_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register inbox_service_messages_created_total");
    counter
});

static READ_TRANSITIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "inbox_service_read_transitions_total",
            "Messages flipped from unread to read",
        ),
        &["kind"],
    )
    .expect("failed to create inbox_service_read_transitions_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register inbox_service_read_transitions_total");
    counter
});

static UNREAD_DRIFT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "inbox_service_unread_drift_detected_total",
        "Cached unread counters found out of step with the message store",
    )
    .expect("failed to create inbox_service_unread_drift_detected_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register inbox_service_unread_drift_detected_total");
    counter
});

#[derive(Debug, Clone, Copy)]
pub enum ReadKind {
    Single,
    Bulk,
}

impl ReadKind {
    fn label(self) -> &'static str {
        match self {
            ReadKind::Single => "single",
            ReadKind::Bulk => "bulk",
        }
    }
}

/// Register every collector so `/metrics` lists them before first use
pub fn init() {
    Lazy::force(&MESSAGES_CREATED_TOTAL);
    Lazy::force(&READ_TRANSITIONS_TOTAL);
    Lazy::force(&UNREAD_DRIFT_TOTAL);
}

pub fn record_message_created() {
    MESSAGES_CREATED_TOTAL.inc();
}

pub fn record_read_transitions(kind: ReadKind, count: u64) {
    if count > 0 {
        READ_TRANSITIONS_TOTAL
            .with_label_values(&[kind.label()])
            .inc_by(count);
    }
}

pub fn record_unread_drift() {
    UNREAD_DRIFT_TOTAL.inc();
}

pub async fn metrics_handler() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }
    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
