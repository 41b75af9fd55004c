use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::metric_names;
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            metric_names::HIT,
            Unit::Count,
            "Reads served from a fresh cache entry."
        );
        describe_counter!(
            metric_names::STALE_HIT,
            Unit::Count,
            "Reads served from a stale entry while a refresh runs."
        );
        describe_counter!(
            metric_names::MISS,
            Unit::Count,
            "Reads that started a new fetch."
        );
        describe_counter!(
            metric_names::JOIN,
            Unit::Count,
            "Reads that joined a fetch already in flight."
        );
        describe_counter!(
            metric_names::EVICT,
            Unit::Count,
            "Entries evicted due to capacity."
        );
        describe_counter!(
            metric_names::FETCH_ERROR,
            Unit::Count,
            "Fetches that completed with an error."
        );
        describe_counter!(
            metric_names::INVALIDATE,
            Unit::Count,
            "Keys removed by invalidation."
        );
        describe_counter!(
            metric_names::RESET,
            Unit::Count,
            "Full cache resets."
        );
        describe_counter!(
            metric_names::SESSION_TRANSITION,
            Unit::Count,
            "Published session state changes."
        );
        describe_histogram!(
            metric_names::FETCH_MS,
            Unit::Milliseconds,
            "Loader latency in milliseconds."
        );
    });
}
