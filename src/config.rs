//! Layered settings: built-in defaults, an optional TOML file, then
//! `NETTOPO_*` environment variables. Command-line overrides are applied on
//! top by the binary.
//!
//! ```toml
//! node_timeout_secs = 300
//! sweep_interval_secs = 60
//! local_identity = "192.168.1.10"
//! port_identity = false
//! subscriber_buffer = 256
//! log_level = "info"
//! log_format = "json"
//! ```

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use nettopo_engine::EngineConfig;
use serde::{Deserialize, Deserializer};

/// Log output style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Resolved settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    #[serde(rename = "node_timeout_secs", deserialize_with = "secs")]
    pub node_timeout: Duration,
    #[serde(rename = "sweep_interval_secs", deserialize_with = "secs")]
    pub sweep_interval: Duration,
    /// Detected from the default route when unset.
    #[serde(default)]
    pub local_identity: Option<String>,
    pub port_identity: bool,
    pub subscriber_buffer: usize,
    pub log_level: String,
    pub log_format: LogFormat,
}

fn secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_secs)
}

/// Values given on the command line. `None` keeps the layered value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub node_timeout: Option<Duration>,
    pub sweep_interval: Option<Duration>,
    pub local_identity: Option<String>,
    pub port_identity: bool,
    pub log_format: Option<LogFormat>,
}

impl Settings {
    /// Load defaults, then `file` if given, then the environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("node_timeout_secs", 300)?
            .set_default("sweep_interval_secs", 60)?
            .set_default("port_identity", false)?
            .set_default("subscriber_buffer", 256)?
            .set_default("log_level", "info")?
            .set_default("log_format", "text")?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path));
        }

        let settings: Settings = builder
            .add_source(Environment::with_prefix("NETTOPO").try_parsing(true))
            .build()
            .context("failed to load configuration")?
            .try_deserialize()
            .context("invalid configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    /// Apply command-line values on top of the layered ones.
    pub fn apply(&mut self, overrides: Overrides) -> Result<()> {
        if let Some(timeout) = overrides.node_timeout {
            self.node_timeout = timeout;
        }
        if let Some(interval) = overrides.sweep_interval {
            self.sweep_interval = interval;
        }
        if let Some(local) = overrides.local_identity {
            self.local_identity = Some(local);
        }
        if overrides.port_identity {
            self.port_identity = true;
        }
        if let Some(format) = overrides.log_format {
            self.log_format = format;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.sweep_interval.is_zero() {
            bail!("sweep interval must be greater than zero");
        }
        if self.subscriber_buffer == 0 {
            bail!("subscriber_buffer must be at least 1");
        }
        Ok(())
    }

    /// Configured local identity, or the detected primary address.
    pub fn resolve_local_identity(&self) -> String {
        match &self.local_identity {
            Some(local) if !local.trim().is_empty() => local.trim().to_string(),
            _ => detect_local_ip().to_string(),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            node_timeout: self.node_timeout,
            sweep_interval: self.sweep_interval,
            local_identity: self.resolve_local_identity(),
            port_identity: self.port_identity,
            subscriber_buffer: self.subscriber_buffer,
        }
    }
}

/// Address of the interface that routes to the internet.
///
/// Connecting a UDP socket sends nothing; it only selects a route. Falls
/// back to loopback when there is no route.
pub fn detect_local_ip() -> IpAddr {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .ok()
        .filter(|ip| !ip.is_unspecified())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_file() {
        let settings = Settings::load(None).unwrap();

        assert_eq!(settings.node_timeout, Duration::from_secs(300));
        assert_eq!(settings.sweep_interval, Duration::from_secs(60));
        assert!(!settings.port_identity);
        assert_eq!(settings.subscriber_buffer, 256);
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.log_format, LogFormat::Text);
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "node_timeout_secs = 90\nlocal_identity = \"10.9.8.7\"\nlog_format = \"json\""
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();

        assert_eq!(settings.node_timeout, Duration::from_secs(90));
        assert_eq!(settings.sweep_interval, Duration::from_secs(60));
        assert_eq!(settings.local_identity.as_deref(), Some("10.9.8.7"));
        assert_eq!(settings.log_format, LogFormat::Json);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(Settings::load(Some(missing.as_path())).is_err());
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "sweep_interval_secs = 0").unwrap();

        assert!(Settings::load(Some(file.path())).is_err());
    }

    #[test]
    fn overrides_win() {
        let mut settings = Settings::load(None).unwrap();
        settings
            .apply(Overrides {
                node_timeout: Some(Duration::from_millis(1500)),
                local_identity: Some("192.168.1.10".to_string()),
                port_identity: true,
                ..Overrides::default()
            })
            .unwrap();

        let config = settings.engine_config();
        assert_eq!(config.node_timeout, Duration::from_millis(1500));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.local_identity, "192.168.1.10");
        assert!(config.port_identity);
    }

    #[test]
    fn detected_identity_is_an_address() {
        let settings = Settings::load(None).unwrap();
        let local = settings.resolve_local_identity();
        assert!(local.parse::<IpAddr>().is_ok());
    }
}
