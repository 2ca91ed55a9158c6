//! Log stream setup.
//!
//! Library code logs through both `log` and `tracing`; this installs a
//! single `tracing-subscriber` formatter and forwards `log` records into it.
//! Filtering follows `RUST_LOG` and defaults to `info`.

use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Installs the global subscriber.
///
/// Returns `false` when one was already installed; in that case nothing is
/// changed.
pub fn init() -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return false;
    }

    // Another logger may own the `log` facade already (e.g. in tests).
    let _ = LogTracer::init();
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        let first = init();
        let second = init();
        assert!(!second);
        let _ = first;
        log::info!("logging initialized");
    }
}
