/*!
 * Logging initialization
 */

use tracing_subscriber::EnvFilter;

/// Initialize structured logging.
///
/// `RUST_LOG` takes precedence; otherwise the level is `debug` when verbose
/// is requested and `info` by default.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
