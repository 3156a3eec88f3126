//! Tracing subscriber initialization for cellar binaries.
//!
//! Libraries only emit `tracing` events; binaries call one of these once at
//! startup. Output goes to stderr so stdout stays free for command results.
//!
//! ```no_run
//! use cellar_core::telemetry;
//!
//! fn main() {
//!     telemetry::init_dev_subscriber_with_env_filter("info");
//!     tracing::info!("Application started");
//! }
//! ```

use tracing::Subscriber;
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Directive used by [`init_dev_subscriber`].
const DEV_DIRECTIVE: &str = "debug";

/// The cellar stderr subscriber: compact, uncolored lines with target and
/// source location.
fn stderr_subscriber(filter: EnvFilter) -> impl Subscriber + Send + Sync + 'static {
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .compact()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish()
}

fn install(filter: EnvFilter) {
    tracing::subscriber::set_global_default(stderr_subscriber(filter))
        .expect("Failed to set tracing subscriber");
}

/// Initialize the stderr subscriber at DEBUG level, ignoring `RUST_LOG`.
///
/// # Panics
/// Panics if a global subscriber has already been set.
pub fn init_dev_subscriber() {
    install(EnvFilter::new(DEV_DIRECTIVE));
}

/// Initialize the stderr subscriber filtered by `RUST_LOG`.
///
/// Falls back to `default_directive` when `RUST_LOG` is unset or invalid,
/// e.g. `"info"` or `"cellar_db=debug,warn"`.
///
/// # Panics
/// Panics if a global subscriber has already been set.
pub fn init_dev_subscriber_with_env_filter(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    install(filter);
}
