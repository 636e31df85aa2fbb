use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "picshare_cache_hit_total",
            Unit::Count,
            "Cache reads answered from the cache, by value kind."
        );
        describe_counter!(
            "picshare_cache_miss_total",
            Unit::Count,
            "Cache reads that found no entry, by value kind."
        );
        describe_counter!(
            "picshare_cache_unavailable_total",
            Unit::Count,
            "Cache calls that failed in transport, by operation."
        );
        describe_counter!(
            "picshare_cache_corrupt_total",
            Unit::Count,
            "Cached values that failed to decode and were treated as misses."
        );
        describe_counter!(
            "picshare_cache_fill_superseded_total",
            Unit::Count,
            "Post fills dropped because the post was invalidated while loading."
        );
        describe_counter!(
            "picshare_invalidation_total",
            Unit::Count,
            "Post invalidations by outcome (removed, absent, failed)."
        );
        describe_counter!(
            "picshare_invalidation_retry_total",
            Unit::Count,
            "Invalidation attempts retried after a transport failure."
        );
        describe_counter!(
            "picshare_like_publish_total",
            Unit::Count,
            "Like events handed to the broker, by outcome."
        );
        describe_histogram!(
            "picshare_like_publish_ms",
            Unit::Milliseconds,
            "Time until the broker accepted or rejected a like event."
        );
        describe_counter!(
            "picshare_consumer_processed_total",
            Unit::Count,
            "Like events stored as notifications."
        );
        describe_counter!(
            "picshare_consumer_malformed_total",
            Unit::Count,
            "Deliveries dropped because the payload did not decode."
        );
        describe_counter!(
            "picshare_consumer_duplicate_total",
            Unit::Count,
            "Deliveries skipped by the duplicate-suppression policy."
        );
        describe_counter!(
            "picshare_consumer_persist_failed_total",
            Unit::Count,
            "Deliveries handed back to the broker after a failed insert."
        );
    });
}
