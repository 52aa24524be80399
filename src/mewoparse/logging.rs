//! Diagnostic logging setup.
//!
//! Logs go to stderr so stdout carries only command output and dry-run
//! lines. `RUST_LOG` wins when set; otherwise `--debug` selects the `debug`
//! level and the default is `warn`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when `RUST_LOG` is not set.
pub fn default_directive(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "warn"
    }
}

/// Installs the global subscriber. Calling it twice is harmless.
pub fn init(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug)));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init();
}
