use tracing_subscriber::EnvFilter;

use crate::cli::Verbosity;

/// Installs the global `tracing` subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence over the verbosity flags.
pub(crate) fn init(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn default_directive(verbosity: Verbosity) -> &'static str {
    if verbosity.debug {
        "debug"
    } else if verbosity.quiet {
        "warn"
    } else {
        "info"
    }
}
