//! Tracing subscriber and Sentry setup shared by the binaries.

use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{EngineConfig, LogFormat};

const DEFAULT_FILTER: &str = "printline_engine=info,printline_cli=info";

/// Guard that flushes Sentry on drop. Keep it alive for the whole process.
pub struct TelemetryGuard {
    _sentry: Option<sentry::ClientInitGuard>,
}

/// Initialize Sentry (if configured) and the global tracing subscriber.
///
/// Must be called once, before any work is done.
#[must_use]
pub fn init(config: &EngineConfig) -> TelemetryGuard {
    let sentry = init_sentry(config);
    init_subscriber(config.log_format);
    if sentry.is_some() {
        tracing::info!("Sentry initialized");
    }
    TelemetryGuard { _sentry: sentry }
}

/// Initialize only the tracing subscriber, for commands that run before
/// the full configuration can be loaded.
pub fn init_logging_only() {
    init_subscriber(LogFormat::Text);
}

fn init_sentry(config: &EngineConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    Some(sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            traces_sample_rate: config.sentry_traces_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    )))
}

fn init_subscriber(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into());

    let is_json = format == LogFormat::Json;
    let json_layer = is_json.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!is_json).then(tracing_subscriber::fmt::layer);

    // try_init: a second call (tests, repeated CLI setup) must not panic
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .try_init();
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}
