//! Deployment transaction state and results

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single step of a deploy, update, rollback or undeploy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    RegisterPort,
    WriteBootstrap,
    SetupInterface,
    WriteUnit,
    WriteLoggingConfig,
    RestartLoggingCollector,
    DaemonReload,
    EnableService,
    StartService,
    VerifyService,
    RestartService,
    StopService,
    DisableService,
    DeleteFile,
    DeleteInterface,
    Deadline,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::RegisterPort => "register port",
            Step::WriteBootstrap => "write bootstrap",
            Step::SetupInterface => "setup interface",
            Step::WriteUnit => "write unit",
            Step::WriteLoggingConfig => "write logging config",
            Step::RestartLoggingCollector => "restart logging collector",
            Step::DaemonReload => "daemon-reload",
            Step::EnableService => "enable service",
            Step::StartService => "start service",
            Step::VerifyService => "verify service",
            Step::RestartService => "restart service",
            Step::StopService => "stop service",
            Step::DisableService => "disable service",
            Step::DeleteFile => "delete file",
            Step::DeleteInterface => "delete interface",
            Step::Deadline => "deadline",
        };
        f.write_str(s)
    }
}

/// A non-fatal failure recorded by a best-effort operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    pub step: Step,
    pub cause: String,
}

impl StepError {
    pub fn new(step: Step, cause: impl fmt::Display) -> Self {
        Self {
            step,
            cause: cause.to_string(),
        }
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.cause)
    }
}

/// Progress of a fresh deployment.
///
/// Every field is set only once its resource is confirmed to exist, so the
/// record always describes exactly what rollback has to undo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployState {
    pub created_files: Vec<PathBuf>,
    pub service_enabled: bool,
    pub service_started: bool,
    pub service_name: String,
    pub dummy_iface_name: String,
    pub dummy_iface_created: bool,
    pub systemd_reloaded: bool,
}

impl DeployState {
    pub fn new(service_name: impl Into<String>, iface_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            dummy_iface_name: iface_name.into(),
            ..Default::default()
        }
    }

    pub fn record_file(&mut self, path: PathBuf) {
        if !self.created_files.contains(&path) {
            self.created_files.push(path);
        }
    }

    /// Whether systemd has seen anything that rollback changes
    pub fn touched_systemd(&self) -> bool {
        self.systemd_reloaded || self.service_enabled || self.service_started
    }
}

/// Drift between a request and the live state of its instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeploymentCheckResult {
    pub exists: bool,
    pub needs_update: bool,
    pub bootstrap_changed: bool,
    pub interface_changed: bool,
    pub service_changed: bool,
    pub service_needs_restart: bool,
}

impl DeploymentCheckResult {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn existing(bootstrap_changed: bool, interface_changed: bool, service_changed: bool) -> Self {
        Self {
            exists: true,
            needs_update: bootstrap_changed || interface_changed || service_changed,
            bootstrap_changed,
            interface_changed,
            service_changed,
            service_needs_restart: bootstrap_changed || service_changed,
        }
    }
}

/// What a deploy call did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployAction {
    Created,
    Updated,
    Unchanged,
}

/// Outcome of a successful deploy call
#[derive(Debug, Clone, Serialize)]
pub struct DeployResult {
    pub success: bool,
    pub action: DeployAction,
    pub service_name: String,
    pub iface_name: String,
    /// Bootstrap, interface descriptor and unit file paths touched by the call
    pub resources: Vec<PathBuf>,
    pub logging_config: Option<PathBuf>,
    /// Best-effort steps that failed without failing the deploy
    pub warnings: Vec<StepError>,
    pub bootstrap_sha256: String,
    pub completed_at: DateTime<Utc>,
}

/// Outcome of an undeploy call. Never an error: failed steps are collected.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UndeployResult {
    pub success: bool,
    pub service_name: String,
    pub deleted_files: Vec<PathBuf>,
    pub errors: Vec<StepError>,
}

/// Outcome of a rollback
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    pub deleted_files: Vec<PathBuf>,
    pub errors: Vec<StepError>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
