use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Initialize console logging on stderr.
///
/// `RUST_LOG` wins when set; otherwise `level` applies to this crate only so
/// that HTTP client internals stay quiet.
pub fn init_logger(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(format!("scan_console_rs={level}"))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to initialize logger: {e}"))
}
