//! Logging initialization for the CLI.
//!
//! Configures the `tracing` subscriber with level filtering via the
//! `DICEDB_LOG` environment variable. Falls back to `info` when the variable
//! is unset or invalid.
//!
//! ```bash
//! DICEDB_LOG=debug dicedb-cli
//! DICEDB_LOG=dicedb_client=debug,warn dicedb-cli
//! ```

use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding filter directives.
pub const LOG_ENV: &str = "DICEDB_LOG";

/// Initialize the tracing subscriber, writing to stderr.
///
/// Does nothing if a global subscriber is already installed.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
