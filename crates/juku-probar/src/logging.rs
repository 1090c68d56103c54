//! Subscriber setup for suites built on this crate.
//!
//! Filtering follows `JUKU_PROBAR_LOG` (an `EnvFilter` directive string),
//! falling back to `juku_probar=info`. Every initializer is idempotent: the
//! first one to run in a process wins.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directives
pub const LOG_ENV: &str = "JUKU_PROBAR_LOG";

/// Directives used when [`LOG_ENV`] is unset or invalid
pub const DEFAULT_DIRECTIVES: &str = "juku_probar=info";

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event, for CI log collectors
    Json,
    /// Human-readable lines captured by the test harness
    Test,
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install a global subscriber; returns false when one was already set
pub fn init(format: LogFormat) -> bool {
    let builder = tracing_subscriber::fmt().with_env_filter(filter());
    match format {
        LogFormat::Pretty => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
        LogFormat::Test => builder.with_test_writer().try_init().is_ok(),
    }
}

/// Install the human-readable subscriber
pub fn init_tracing() -> bool {
    init(LogFormat::Pretty)
}
