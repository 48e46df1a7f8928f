//! Deployment requests

use std::fmt;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// Prefix of every dummy interface created by the agent
pub const IFACE_PREFIX: &str = "elchi-if-";

/// Address family of the instance's dedicated address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IpMode {
    #[default]
    Ipv4,
    Ipv6,
}

impl IpMode {
    pub fn matches(&self, address: &IpNet) -> bool {
        matches!(
            (self, address),
            (IpMode::Ipv4, IpNet::V4(_)) | (IpMode::Ipv6, IpNet::V6(_))
        )
    }
}

impl fmt::Display for IpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpMode::Ipv4 => f.write_str("ipv4"),
            IpMode::Ipv6 => f.write_str("ipv6"),
        }
    }
}

/// Request to stand up or update one proxy instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    pub name: String,
    pub version: String,
    pub port: u16,
    pub downstream_address: IpNet,
    pub bootstrap: Vec<u8>,
    pub interface_id: Option<String>,
    pub ip_mode: IpMode,
}

impl DeploymentRequest {
    /// Stable identifier of the instance, also the systemd unit name without suffix
    pub fn service_name(&self) -> String {
        service_name(&self.name, self.port)
    }

    /// Name of the instance's dummy interface
    pub fn iface_name(&self) -> String {
        iface_name(self.port)
    }

    /// Full unit name including the `.service` suffix
    pub fn unit_name(&self) -> String {
        unit_name(&self.name, self.port)
    }
}

/// Request to tear down one proxy instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndeployRequest {
    pub name: String,
    pub port: u16,
}

impl UndeployRequest {
    pub fn service_name(&self) -> String {
        service_name(&self.name, self.port)
    }

    pub fn iface_name(&self) -> String {
        iface_name(self.port)
    }

    pub fn unit_name(&self) -> String {
        unit_name(&self.name, self.port)
    }
}

impl From<&DeploymentRequest> for UndeployRequest {
    fn from(request: &DeploymentRequest) -> Self {
        Self {
            name: request.name.clone(),
            port: request.port,
        }
    }
}

pub fn service_name(name: &str, port: u16) -> String {
    format!("{}-{}", name, port)
}

pub fn unit_name(name: &str, port: u16) -> String {
    format!("{}.service", service_name(name, port))
}

pub fn iface_name(port: u16) -> String {
    format!("{}{}", IFACE_PREFIX, port)
}

/// Letters, digits, hyphen and underscore only
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
