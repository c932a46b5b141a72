//! Tracing setup shared by the server and the scorer binary.
//!
//! The level is read from `ATTENDANCE_LOG` (e.g. `ATTENDANCE_LOG=debug` or
//! `ATTENDANCE_LOG=smart_attendance=debug,actix_web=info`), defaulting to `info`.

use anyhow::{anyhow, Result};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "ATTENDANCE_LOG";

/// Server logging: human-readable lines on stderr.
pub fn init() -> Result<()> {
    init_with_writer(std::io::stderr)
}

/// Scorer logging goes to stdout so that stderr only carries failure output
/// for the invoking server to report.
pub fn init_stdout() -> Result<()> {
    init_with_writer(std::io::stdout)
}

fn init_with_writer<W>(writer: W) -> Result<()>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to initialize logging: {e}"))
}
