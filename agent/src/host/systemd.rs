//! systemd unit control

use std::sync::Arc;

use crate::errors::AgentError;
use crate::host::command::CommandRunner;

/// Thin wrapper issuing `systemctl` calls through a [`CommandRunner`]
#[derive(Clone)]
pub struct Systemd {
    runner: Arc<dyn CommandRunner>,
    logging_collector: String,
}

impl Systemd {
    pub fn new(runner: Arc<dyn CommandRunner>, logging_collector: impl Into<String>) -> Self {
        Self {
            runner,
            logging_collector: logging_collector.into(),
        }
    }

    async fn show(&self, unit: &str, property: &str) -> Result<String, AgentError> {
        let output = self
            .runner
            .run_privileged(&["systemctl", "show", "-p", property, "--value", unit])
            .await?;
        Ok(output.stdout.trim().to_string())
    }

    /// `LoadState` of the unit, e.g. `loaded` or `not-found`
    pub async fn load_state(&self, unit: &str) -> Result<String, AgentError> {
        self.show(unit, "LoadState").await
    }

    /// `ActiveState` of the unit, e.g. `active`, `failed` or `activating`
    pub async fn active_state(&self, unit: &str) -> Result<String, AgentError> {
        self.show(unit, "ActiveState").await
    }

    pub async fn is_loaded(&self, unit: &str) -> Result<bool, AgentError> {
        Ok(self.load_state(unit).await? == "loaded")
    }

    pub async fn daemon_reload(&self) -> Result<(), AgentError> {
        self.runner
            .run_privileged(&["systemctl", "daemon-reload"])
            .await
            .map(|_| ())
    }

    async fn control(&self, verb: &str, unit: &str) -> Result<(), AgentError> {
        self.runner
            .run_privileged(&["systemctl", verb, unit])
            .await
            .map(|_| ())
    }

    pub async fn enable(&self, unit: &str) -> Result<(), AgentError> {
        self.control("enable", unit).await
    }

    pub async fn disable(&self, unit: &str) -> Result<(), AgentError> {
        self.control("disable", unit).await
    }

    pub async fn start(&self, unit: &str) -> Result<(), AgentError> {
        self.control("start", unit).await
    }

    pub async fn stop(&self, unit: &str) -> Result<(), AgentError> {
        self.control("stop", unit).await
    }

    pub async fn restart(&self, unit: &str) -> Result<(), AgentError> {
        self.control("restart", unit).await
    }

    /// Restart the log collector so it picks up new forwarding rules
    pub async fn restart_logging_collector(&self) -> Result<(), AgentError> {
        self.control("restart", &self.logging_collector).await
    }
}
