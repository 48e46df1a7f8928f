//! Settings file management

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub json_logs: bool,

    /// Local command server
    #[serde(default)]
    pub server: ServerSettings,

    /// Host paths
    #[serde(default)]
    pub paths: PathSettings,

    /// Directory holding one `<version>/envoy` binary per version
    #[serde(default = "default_envoy_binary_dir")]
    pub envoy_binary_dir: PathBuf,

    /// Prefix privileged commands with `sudo -n`
    #[serde(default)]
    pub use_sudo: bool,

    /// Timeout for a single host command in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Timeout for a whole deploy or undeploy in seconds
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    /// Delay between starting a unit and verifying it is active
    #[serde(default = "default_verify_delay")]
    pub verify_delay_millis: u64,

    /// Unit restarted after a log forwarding config is added
    #[serde(default = "default_logging_collector")]
    pub logging_collector_unit: String,
}

fn default_envoy_binary_dir() -> PathBuf {
    PathBuf::from("/var/lib/elchi/envoys")
}

fn default_command_timeout() -> u64 {
    30
}

fn default_operation_timeout() -> u64 {
    120
}

fn default_verify_delay() -> u64 {
    2000
}

fn default_logging_collector() -> String {
    "rsyslog".to_string()
}

impl Settings {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn verify_delay(&self) -> Duration {
        Duration::from_millis(self.verify_delay_millis)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            server: ServerSettings::default(),
            paths: PathSettings::default(),
            envoy_binary_dir: default_envoy_binary_dir(),
            use_sudo: false,
            command_timeout_secs: default_command_timeout(),
            operation_timeout_secs: default_operation_timeout(),
            verify_delay_millis: default_verify_delay(),
            logging_collector_unit: default_logging_collector(),
        }
    }
}

/// Command server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8081
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// Where instance files are written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Agent state (interface descriptors)
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_bootstrap_dir")]
    pub bootstrap_dir: PathBuf,

    #[serde(default = "default_unit_dir")]
    pub unit_dir: PathBuf,

    /// rsyslog drop-in directory
    #[serde(default = "default_logging_dir")]
    pub logging_dir: PathBuf,

    /// Per-instance proxy log files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/elchi")
}

fn default_bootstrap_dir() -> PathBuf {
    PathBuf::from("/etc/elchi/bootstraps")
}

fn default_unit_dir() -> PathBuf {
    PathBuf::from("/etc/systemd/system")
}

fn default_logging_dir() -> PathBuf {
    PathBuf::from("/etc/rsyslog.d")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/elchi")
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            bootstrap_dir: default_bootstrap_dir(),
            unit_dir: default_unit_dir(),
            logging_dir: default_logging_dir(),
            log_dir: default_log_dir(),
        }
    }
}
