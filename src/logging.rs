//! Logging setup using `tracing` + `tracing-subscriber`
//!
//! The filter comes from the `--log-level` flag, else the `EXEC_ACTION_LOG`
//! environment variable, else `info`. Logs go to stderr so the stdout of
//! spawned commands stays clean.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the default log filter
pub const LOG_ENV: &str = "EXEC_ACTION_LOG";

/// Build the filter from an explicit level or the environment
pub fn build_filter(level: Option<&str>) -> Result<EnvFilter> {
    match level {
        Some(level) => EnvFilter::try_new(level)
            .map_err(|e| anyhow!("invalid log level `{}': {}", level, e)),
        None => Ok(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))),
    }
}

/// Initialise the global subscriber. Call once at startup.
pub fn init_logging(level: Option<&str>) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(build_filter(level)?)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to initialise logging: {}", e))
}
