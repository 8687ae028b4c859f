//! Configuration loading.
//!
//! Settings come from the environment (see the table below) and can be
//! overridden per run by command-line flags in `main.rs`.
//!
//! | Variable | Meaning |
//! |---|---|
//! | `PORT` | Listening port (default depends on the front-end) |
//! | `SPOTTER_IDLE_TIMEOUT_SECS` | Close silent socket connections after N seconds |
//! | `SPOTTER_MAX_CONNECTIONS` | Serve at most N socket connections at once |
//! | `SPOTTER_MAX_FRAME_BYTES` | Reject socket frames longer than N bytes |
//! | `SPOTTER_DETECTOR_CMD` | Detector command line; unset means no detector |
//! | `SPOTTER_DETECTOR_TIMEOUT_SECS` | Per-image detector time budget (0 = none) |

use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::constants::DEFAULT_DETECTOR_TIMEOUT;
use crate::detector::{CommandDetector, Detector, NullDetector};
use crate::socket::ServerOptions;

/// Runtime configuration for either front-end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Listening port. `None` uses the front-end's default.
    pub port: Option<u16>,
    /// Idle timeout for socket connections.
    pub idle_timeout: Option<Duration>,
    /// Maximum concurrent socket connections.
    pub max_connections: Option<usize>,
    /// Maximum socket frame length in bytes.
    pub max_frame_len: Option<usize>,
    /// Detector command line (program and arguments, shell quoting allowed).
    pub detector_command: Option<String>,
    /// Time budget for one detector invocation. `None` waits indefinitely.
    pub detector_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: None,
            idle_timeout: None,
            max_connections: None,
            max_frame_len: None,
            detector_command: None,
            detector_timeout: Some(DEFAULT_DETECTOR_TIMEOUT),
        }
    }
}

impl Config {
    /// Loads configuration from defaults with environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = parse_var(&lookup, "PORT")? {
            self.port = Some(port);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "SPOTTER_IDLE_TIMEOUT_SECS")? {
            self.idle_timeout = positive_secs(secs);
        }
        if let Some(max) = parse_var::<usize>(&lookup, "SPOTTER_MAX_CONNECTIONS")? {
            self.max_connections = (max > 0).then_some(max);
        }
        if let Some(max) = parse_var::<usize>(&lookup, "SPOTTER_MAX_FRAME_BYTES")? {
            self.max_frame_len = (max > 0).then_some(max);
        }
        if let Some(command) = lookup("SPOTTER_DETECTOR_CMD") {
            self.detector_command = Some(command).filter(|c| !c.trim().is_empty());
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "SPOTTER_DETECTOR_TIMEOUT_SECS")? {
            self.detector_timeout = positive_secs(secs);
        }
        Ok(())
    }

    /// Address to bind: all interfaces, configured port or `default_port`.
    pub fn bind_addr(&self, default_port: u16) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port.unwrap_or(default_port)))
    }

    /// Resource limits for the socket server.
    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            idle_timeout: self.idle_timeout,
            max_connections: self.max_connections,
            max_frame_len: self.max_frame_len,
        }
    }

    /// Construct the configured detector.
    ///
    /// # Errors
    ///
    /// Returns an error if the detector command line cannot be parsed.
    pub fn build_detector(&self) -> Result<Arc<dyn Detector>> {
        match &self.detector_command {
            Some(command) => {
                let detector = CommandDetector::from_command_line(command)?
                    .with_timeout(self.detector_timeout);
                log::info!("[Detector] Using external detector: {}", detector.program());
                Ok(Arc::new(detector))
            }
            None => {
                log::warn!("[Detector] No detector configured; every request will report 'none'");
                Ok(Arc::new(NullDetector))
            }
        }
    }
}

/// Convert a seconds setting to a timeout; zero disables it.
pub fn positive_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {key}: {raw:?}"))
        })
        .transpose()
}
