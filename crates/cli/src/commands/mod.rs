//! CLI command implementations.

pub mod migrate;
pub mod process;
pub mod sync;

use printline_engine::config::{ConfigError, EngineConfig};
use printline_engine::telemetry::{self, TelemetryGuard};

/// Load configuration and start logging.
///
/// Logging is started even when loading fails so the error is reported.
pub fn init() -> Result<(EngineConfig, TelemetryGuard), ConfigError> {
    match EngineConfig::from_env() {
        Ok(config) => {
            let guard = telemetry::init(&config);
            Ok((config, guard))
        }
        Err(e) => {
            telemetry::init_logging_only();
            Err(e)
        }
    }
}
