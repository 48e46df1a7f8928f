//! Error types for the Elchi agent

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::deploy::state::Step;

/// Infrastructure error raised by the host collaborators
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to spawn `{command}`: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A deployment request violated a prerequisite. Raised before any side effect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid service name {0:?}: only letters, digits, '-' and '_' are allowed")]
    InvalidName(String),

    #[error("invalid port {0}")]
    InvalidPort(u32),

    #[error("version must not be empty")]
    EmptyVersion,

    #[error("invalid downstream address {0:?}")]
    InvalidAddress(String),

    #[error("address {address} does not match ip mode {mode}")]
    AddressFamilyMismatch { address: String, mode: String },

    #[error("invalid bootstrap: {0}")]
    InvalidBootstrap(String),

    #[error("port {port} is already in use by {owner}")]
    PortInUse { port: u16, owner: String },

    #[error("network interface {0} already exists")]
    InterfaceExists(String),

    #[error("service {0} is already loaded and active")]
    ServiceActive(String),
}

/// Coarse classification of a [`DeployError`], assigned where the error is raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployErrorKind {
    Validation,
    PortConflict,
    ResourceCreation,
    Verification,
    PartialUpdate,
    Timeout,
    Internal,
}

/// Terminal failure of a deploy call
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{step} failed: {source}")]
    ResourceCreation {
        step: Step,
        #[source]
        source: AgentError,
    },

    #[error("service {service} did not become active (state: {state})")]
    Verification { service: String, state: String },

    #[error("update step {step} failed: {source}")]
    PartialUpdate {
        step: Step,
        #[source]
        source: AgentError,
    },

    #[error("deployment timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("internal error: {0}")]
    Internal(String),
}

impl DeployError {
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::Validation(ValidationError::PortInUse { .. }) => {
                DeployErrorKind::PortConflict
            }
            DeployError::Validation(_) => DeployErrorKind::Validation,
            DeployError::ResourceCreation { .. } => DeployErrorKind::ResourceCreation,
            DeployError::Verification { .. } => DeployErrorKind::Verification,
            DeployError::PartialUpdate { .. } => DeployErrorKind::PartialUpdate,
            DeployError::Timeout { .. } => DeployErrorKind::Timeout,
            DeployError::Internal(_) => DeployErrorKind::Internal,
        }
    }

    pub(crate) fn creation(step: Step) -> impl FnOnce(AgentError) -> DeployError {
        move |source| DeployError::ResourceCreation { step, source }
    }

    pub(crate) fn update(step: Step) -> impl FnOnce(AgentError) -> DeployError {
        move |source| DeployError::PartialUpdate { step, source }
    }
}
