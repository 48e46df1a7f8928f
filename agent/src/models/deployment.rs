//! Deployment commands received by the agent

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::deploy::bootstrap;
use crate::deploy::request::{DeploymentRequest, IpMode, UndeployRequest};
use crate::errors::ValidationError;

/// Request to deploy or update a proxy instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployCommand {
    /// Instance name
    pub name: String,

    /// Envoy version to run
    pub version: String,

    /// Listener port, unique per host
    pub port: u32,

    /// Address assigned to the instance's dummy interface, in CIDR form
    pub downstream_address: String,

    /// Base64 encoded bootstrap document
    pub bootstrap: String,

    #[serde(default)]
    pub interface_id: Option<String>,

    #[serde(default)]
    pub ip_mode: IpMode,
}

impl TryFrom<DeployCommand> for DeploymentRequest {
    type Error = ValidationError;

    fn try_from(command: DeployCommand) -> Result<Self, Self::Error> {
        let port = parse_port(command.port)?;

        if command.version.trim().is_empty() {
            return Err(ValidationError::EmptyVersion);
        }

        let downstream_address: IpNet = command
            .downstream_address
            .parse()
            .map_err(|_| ValidationError::InvalidAddress(command.downstream_address.clone()))?;
        if !command.ip_mode.matches(&downstream_address) {
            return Err(ValidationError::AddressFamilyMismatch {
                address: command.downstream_address,
                mode: command.ip_mode.to_string(),
            });
        }

        let bootstrap = STANDARD
            .decode(command.bootstrap.trim())
            .map_err(|e| ValidationError::InvalidBootstrap(format!("not base64: {}", e)))?;
        bootstrap::try_canonicalize(&bootstrap)?;

        Ok(DeploymentRequest {
            name: command.name,
            version: command.version.trim().to_string(),
            port,
            downstream_address,
            bootstrap,
            interface_id: command.interface_id.filter(|id| !id.is_empty()),
            ip_mode: command.ip_mode,
        })
    }
}

/// Request to remove a proxy instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndeployCommand {
    pub name: String,
    pub port: u32,
}

impl TryFrom<UndeployCommand> for UndeployRequest {
    type Error = ValidationError;

    fn try_from(command: UndeployCommand) -> Result<Self, Self::Error> {
        Ok(UndeployRequest {
            name: command.name,
            port: parse_port(command.port)?,
        })
    }
}

fn parse_port(port: u32) -> Result<u16, ValidationError> {
    match u16::try_from(port) {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(ValidationError::InvalidPort(port)),
    }
}
