//! Log subscriber setup.
//!
//! Logs go to stderr so stdout stays free for the stdout output.

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Build the filter: `RUST_LOG` when set, otherwise `default_level`.
pub fn env_filter(default_level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_level)
            .with_context(|| format!("invalid log level {default_level:?}")),
    }
}

/// Install the global subscriber.
pub fn init_logging(default_level: &str, format: LogFormat) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level)?)
        .with_writer(std::io::stderr)
        .with_target(true);

    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| anyhow!("failed to install log subscriber: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_directive_strings() {
        assert!(env_filter("debug").is_ok());
        assert!(env_filter("nettopo_engine=trace,info").is_ok());
    }

    #[test]
    fn second_install_fails_cleanly() {
        let _ = init_logging("info", LogFormat::Json);
        assert!(init_logging("info", LogFormat::Text).is_err());
    }
}
