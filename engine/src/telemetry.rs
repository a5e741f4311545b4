//! Logging setup
//!
//! One `tracing-subscriber` registry per process. The filter comes from
//! `RUST_LOG` when set, otherwise from the configured level. Output goes to
//! stderr so it never interleaves with the conversation printed on stdout.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log line layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human-oriented
    Pretty,
    /// One JSON object per event, with the current span
    Json,
}

impl LogFormat {
    /// Pretty for debug builds, JSON for release builds
    pub fn for_build() -> Self {
        if cfg!(debug_assertions) {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        }
    }
}

/// Filter directives for `log_level`, applied to dependencies and this crate
fn default_directives(log_level: &str) -> String {
    format!("{level},copilot_engine={level}", level = log_level)
}

/// Install the global subscriber
///
/// Priority: `RUST_LOG` > `log_level`. Only the first call in a process has
/// an effect.
pub fn init_telemetry_with_level(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(log_level)));

    let (pretty, json) = match LogFormat::for_build() {
        LogFormat::Pretty => (
            Some(
                fmt::layer()
                    .pretty()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            ),
        ),
    };

    if tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .try_init()
        .is_err()
    {
        tracing::debug!("Telemetry already initialized");
    }
}

/// Install the global subscriber at "warn" before any config is available
pub fn init_telemetry() {
    init_telemetry_with_level("warn");
}
