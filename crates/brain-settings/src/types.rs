//! Settings types. JSON keys are camelCase; every section has defaults so a
//! settings file only needs the values it changes.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrainSettings {
    pub server: ServerSettings,
    pub session: SessionSettings,
    pub logging: LoggingSettings,
}

impl BrainSettings {
    /// Reject values the hub cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.session.robot_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "session.robotTimeoutMs must be greater than zero".into(),
            ));
        }
        if self.session.send_queue == 0 {
            return Err(SettingsError::InvalidValue(
                "session.sendQueue must be greater than zero".into(),
            ));
        }
        if self.session.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "session.heartbeatIntervalSecs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Network binding.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Port serving `/ws/robot`, `/ws/client` and `/health`.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Per-connection behaviour.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Longest silence tolerated on the robot connection, in milliseconds.
    pub robot_timeout_ms: u64,
    /// Outbound queue depth per connection. Frames beyond it are dropped for
    /// that recipient only.
    pub send_queue: usize,
    /// Interval between server pings to frontends.
    pub heartbeat_interval_secs: u64,
}

impl SessionSettings {
    pub fn robot_timeout(&self) -> Duration {
        Duration::from_millis(self.robot_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            robot_timeout_ms: 2_000,
            send_queue: 256,
            heartbeat_interval_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Logging settings. `RUST_LOG` takes precedence when set.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
    /// Per-module level overrides, e.g. `{"brain_server::router": "debug"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            modules: BTreeMap::new(),
        }
    }
}
