//! Logging setup for the Stoat layout crates.
//!
//! Logs go to stdout through a `tracing-subscriber` fmt layer. The engine is a
//! library, so writing files and choosing directories is left to the host.
//!
//! ## Environment Variables
//!
//! 1. **`STOAT_LOG`** (highest priority) - Stoat-specific logging control
//! 2. **`RUST_LOG`** - Standard tracing environment variable
//! 3. **Default** - `warn` globally, `info` for stoat crates

use std::env;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// Crates that `STOAT_LOG=<level>` applies to.
const STOAT_CRATES: &[&str] = &["stoat_layout", "stoat_log"];

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Level used for stoat crates when neither `STOAT_LOG` nor `RUST_LOG` is
    /// set. Defaults to `info`.
    pub default_level: Option<String>,
    /// Emit ANSI colors.
    pub ansi: bool,
}

/// Initialize logging.
///
/// Respects the environment variable priority described in the module docs:
/// [`STOAT_LOG`] > [`RUST_LOG`] > [`LogConfig::default_level`].
///
/// Fails if a global subscriber is already installed.
pub fn init(config: LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = create_filter(config.default_level.as_deref());
    let stdout_layer = fmt::layer().with_ansi(config.ansi).with_filter(filter);
    Registry::default().with(stdout_layer).try_init()?;
    Ok(())
}

/// Initialize logging for tests.
///
/// Identical to [`init`] but captured by the test harness, with a name that
/// makes it clear this is safe for test usage. Will not crash if called
/// multiple times or if logging is already initialized by another test.
#[allow(clippy::let_unit_value)]
pub fn test() {
    let _ = test_init();
}

fn test_init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = create_filter(None);
    fmt().with_env_filter(filter).with_test_writer().try_init()?;
    Ok(())
}

/// Create the appropriate [`EnvFilter`] based on environment variables.
///
/// Implements the priority system: [`STOAT_LOG`] > [`RUST_LOG`] > defaults.
fn create_filter(default_level: Option<&str>) -> EnvFilter {
    if let Ok(stoat_log) = env::var("STOAT_LOG") {
        return expand_stoat_log(&stoat_log);
    }

    if let Ok(rust_log) = env::var("RUST_LOG") {
        return EnvFilter::new(rust_log);
    }

    expand_stoat_log(default_level.unwrap_or("info"))
}

/// Expand [`STOAT_LOG`] values into full tracing filter strings.
///
/// - `STOAT_LOG=debug` becomes `warn,stoat_layout=debug,stoat_log=debug`
/// - `STOAT_LOG=stoat_layout::size_manager=trace` is used as-is (advanced syntax)
fn expand_stoat_log(stoat_log: &str) -> EnvFilter {
    EnvFilter::new(filter_directives(stoat_log))
}

fn filter_directives(stoat_log: &str) -> String {
    // Module-specific syntax is passed through untouched.
    if stoat_log.contains('=') || stoat_log.contains(':') || stoat_log.contains(',') {
        return stoat_log.to_string();
    }

    let mut directives = String::from("warn");
    for krate in STOAT_CRATES {
        directives.push_str(&format!(",{krate}={stoat_log}"));
    }
    directives
}
