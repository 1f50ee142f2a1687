/*!
 * Logging and tracing initialization
 *
 * The library only emits `tracing` events; host applications that want the
 * default subscriber call [`init_logging`] once at start-up.
 */

use std::fs::File;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;
use crate::error::{Result, StatusError};

const CRATE_TARGET: &str = "smb_bridge";
const NAME_SERVICE_TARGET: &str = "smb_bridge::resolver::netbios";

/// Effective level after applying the verbose shorthand
pub fn effective_level(config: &LoggingConfig) -> Level {
    if config.verbose {
        Level::DEBUG
    } else {
        config.log_level.to_tracing_level()
    }
}

/// Filter directives used when `RUST_LOG` is unset
pub fn default_directives(config: &LoggingConfig) -> String {
    let level = effective_level(config).to_string().to_ascii_lowercase();
    let mut directives = format!("{}={}", CRATE_TARGET, level);
    if config.trace_name_service {
        directives.push_str(&format!(",{}=trace", NAME_SERVICE_TARGET));
    }
    directives
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(config)))
        .map_err(|e| StatusError::construction(format!("Failed to create log filter: {}", e)))
}

/// Install the global subscriber: compact lines on stdout, or JSON records
/// with span timings when `log_file` is set
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(build_filter(config)?);

    let installed = match &config.log_file {
        Some(log_path) => {
            let file = File::create(log_path).map_err(|e| {
                StatusError::construction(format!("Failed to create log file: {}", e))
            })?;
            let json = fmt::layer()
                .with_writer(file)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE)
                .with_ansi(false)
                .json();
            registry.with(json).try_init()
        }
        None => registry
            .with(fmt::layer().with_target(true).compact())
            .try_init(),
    };

    installed.map_err(|e| StatusError::construction(format!("Failed to install subscriber: {}", e)))
}

/// Test-writer subscriber shared by every unit test in the crate
#[cfg(test)]
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{}=debug", CRATE_TARGET)));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_test_writer().with_target(false).compact())
            .try_init()
            .ok();
    });
}
