use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Connection parameters handed to the serial worker.
///
/// Built once at startup from [`UserConfig`] and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Device identifier, e.g. `/dev/ttyUSB0` or `COM3`
    pub device: String,

    /// Line speed in baud
    pub baud_rate: u32,

    /// Upper bound on a single device read wait
    pub poll_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(device: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            device: device.into(),
            baud_rate,
            poll_timeout: Duration::from_millis(default_read_poll_timeout_ms()),
        }
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }
}

/// Where the serial worker runs relative to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Isolation {
    /// Separate OS process talking over stdin/stdout pipes
    #[default]
    Process,
    /// Dedicated OS thread inside the UI process
    Thread,
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Isolation::Process => f.write_str("process"),
            Isolation::Thread => f.write_str("thread"),
        }
    }
}

impl FromStr for Isolation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "process" => Ok(Isolation::Process),
            "thread" => Ok(Isolation::Thread),
            other => Err(ConfigError::UnknownIsolation(other.to_string())),
        }
    }
}

/// Validation errors for user supplied settings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No serial device configured")]
    MissingDevice,

    #[error("Baud rate must be greater than zero")]
    InvalidBaudRate,

    #[error("Read poll timeout must be greater than zero")]
    InvalidPollTimeout,

    #[error("Worker idle interval must be greater than zero")]
    InvalidIdleInterval,

    #[error("Join timeout must be greater than zero")]
    InvalidJoinTimeout,

    #[error("Unknown isolation mode '{0}' (expected 'process' or 'thread')")]
    UnknownIsolation(String),
}

/// User configuration from atterm.yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub connection: ConnectionSettings,

    #[serde(default)]
    pub session: SessionSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default = "default_device")]
    pub device: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_read_poll_timeout_ms")]
    pub read_poll_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            device: default_device(),
            baud_rate: default_baud_rate(),
            read_poll_timeout_ms: default_read_poll_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Bridge wait on the inbound channel before re-checking the stop signal
    #[serde(default = "default_bridge_poll_ms")]
    pub bridge_poll_ms: u64,

    /// Pause between worker loop iterations
    #[serde(default = "default_worker_idle_ms")]
    pub worker_idle_ms: u64,

    /// How long shutdown waits for the worker before giving up on it
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,

    #[serde(default = "default_scrollback_limit")]
    pub scrollback_limit: usize,

    #[serde(default)]
    pub isolation: Isolation,

    #[serde(default)]
    pub debug_mode: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            bridge_poll_ms: default_bridge_poll_ms(),
            worker_idle_ms: default_worker_idle_ms(),
            join_timeout_ms: default_join_timeout_ms(),
            scrollback_limit: default_scrollback_limit(),
            isolation: Isolation::default(),
            debug_mode: false,
        }
    }
}

impl SessionSettings {
    pub fn bridge_poll(&self) -> Duration {
        Duration::from_millis(self.bridge_poll_ms.max(1))
    }

    pub fn worker_idle(&self) -> Duration {
        Duration::from_millis(self.worker_idle_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

fn default_device() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_read_poll_timeout_ms() -> u64 {
    100
}

fn default_bridge_poll_ms() -> u64 {
    100
}

fn default_worker_idle_ms() -> u64 {
    10
}

fn default_join_timeout_ms() -> u64 {
    1000
}

fn default_scrollback_limit() -> usize {
    5000
}

impl UserConfig {
    /// Apply command line overrides on top of the loaded file.
    pub fn with_overrides(
        mut self,
        device: Option<String>,
        baud_rate: Option<u32>,
        isolation: Option<Isolation>,
    ) -> Self {
        if let Some(device) = device {
            self.connection.device = device;
        }
        if let Some(baud_rate) = baud_rate {
            self.connection.baud_rate = baud_rate;
        }
        if let Some(isolation) = isolation {
            self.session.isolation = isolation;
        }
        self
    }

    /// Validate the settings and freeze the connection section for the session.
    ///
    /// A zero idle interval would let the worker loop spin without yielding,
    /// and a zero join timeout would kill every worker at shutdown.
    pub fn connection_config(&self) -> Result<ConnectionConfig, ConfigError> {
        let settings = &self.connection;
        if settings.device.trim().is_empty() {
            return Err(ConfigError::MissingDevice);
        }
        if settings.baud_rate == 0 {
            return Err(ConfigError::InvalidBaudRate);
        }
        if settings.read_poll_timeout_ms == 0 {
            return Err(ConfigError::InvalidPollTimeout);
        }
        if self.session.worker_idle_ms == 0 {
            return Err(ConfigError::InvalidIdleInterval);
        }
        if self.session.join_timeout_ms == 0 {
            return Err(ConfigError::InvalidJoinTimeout);
        }

        Ok(ConnectionConfig {
            device: settings.device.trim().to_string(),
            baud_rate: settings.baud_rate,
            poll_timeout: Duration::from_millis(settings.read_poll_timeout_ms),
        })
    }
}
