//! Dummy network interfaces via iproute2

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::AgentError;
use crate::filesys::dir::Dir;
use crate::host::command::CommandRunner;

/// Result of an interface upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceSetup {
    pub descriptor_path: PathBuf,
    pub iface_name: String,
}

/// Persisted description of an instance's interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    pub service_name: String,
    pub iface_name: String,
    pub address: IpNet,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_id: Option<String>,
}

/// Kernel interface management for one instance
#[async_trait]
pub trait NetworkInterfaces: Send + Sync {
    fn descriptor_path(&self, iface_name: &str) -> PathBuf;

    /// Create the interface if missing and converge its address set to
    /// exactly `{address}`, then persist its descriptor
    async fn setup_interface(
        &self,
        descriptor: &InterfaceDescriptor,
    ) -> Result<InterfaceSetup, AgentError>;

    async fn delete_interface(&self, iface_name: &str) -> Result<(), AgentError>;

    async fn interface_exists(&self, iface_name: &str) -> bool;

    /// Non link-local addresses currently assigned to the interface
    async fn interface_addresses(&self, iface_name: &str) -> Result<Vec<IpNet>, AgentError>;
}

/// `NetworkInterfaces` driving the `ip` command
pub struct IpRouteInterfaces {
    runner: Arc<dyn CommandRunner>,
    descriptor_dir: Dir,
}

impl IpRouteInterfaces {
    pub fn new(runner: Arc<dyn CommandRunner>, descriptor_dir: Dir) -> Self {
        Self {
            runner,
            descriptor_dir,
        }
    }
}

#[async_trait]
impl NetworkInterfaces for IpRouteInterfaces {
    fn descriptor_path(&self, iface_name: &str) -> PathBuf {
        self.descriptor_dir
            .path()
            .join(format!("{}.json", iface_name))
    }

    async fn setup_interface(
        &self,
        descriptor: &InterfaceDescriptor,
    ) -> Result<InterfaceSetup, AgentError> {
        let iface = descriptor.iface_name.as_str();
        let expected = descriptor.address;

        if !self.interface_exists(iface).await {
            info!("Creating dummy interface {}", iface);
            self.runner
                .run_privileged(&["ip", "link", "add", iface, "type", "dummy"])
                .await?;
        }

        let current = self.interface_addresses(iface).await?;
        for stale in current.iter().filter(|a| **a != expected) {
            debug!("Removing stale address {} from {}", stale, iface);
            let stale = stale.to_string();
            self.runner
                .run_privileged(&["ip", "addr", "del", &stale, "dev", iface])
                .await?;
        }
        if !current.contains(&expected) {
            let address = expected.to_string();
            self.runner
                .run_privileged(&["ip", "addr", "replace", &address, "dev", iface])
                .await?;
        }
        self.runner
            .run_privileged(&["ip", "link", "set", iface, "up"])
            .await?;

        let file = self.descriptor_dir.file(&format!("{}.json", iface));
        file.write_json(descriptor).await?;

        Ok(InterfaceSetup {
            descriptor_path: file.path().to_path_buf(),
            iface_name: iface.to_string(),
        })
    }

    async fn delete_interface(&self, iface_name: &str) -> Result<(), AgentError> {
        info!("Deleting interface {}", iface_name);
        self.runner
            .run_privileged(&["ip", "link", "del", iface_name])
            .await
            .map(|_| ())
    }

    async fn interface_exists(&self, iface_name: &str) -> bool {
        self.runner
            .run_privileged(&["ip", "link", "show", "dev", iface_name])
            .await
            .is_ok()
    }

    async fn interface_addresses(&self, iface_name: &str) -> Result<Vec<IpNet>, AgentError> {
        let output = self
            .runner
            .run_privileged(&["ip", "-j", "addr", "show", "dev", iface_name])
            .await?;
        parse_addresses(&output.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct IpLink {
    #[serde(default)]
    addr_info: Vec<IpAddrInfo>,
}

#[derive(Debug, Deserialize)]
struct IpAddrInfo {
    local: Option<std::net::IpAddr>,
    prefixlen: Option<u8>,
    #[serde(default)]
    scope: String,
}

/// Parse `ip -j addr show` output
pub fn parse_addresses(json: &str) -> Result<Vec<IpNet>, AgentError> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let links: Vec<IpLink> = serde_json::from_str(json)?;
    let mut addresses = Vec::new();
    for info in links.into_iter().flat_map(|l| l.addr_info) {
        if info.scope == "link" {
            continue;
        }
        if let (Some(local), Some(prefix)) = (info.local, info.prefixlen) {
            let net = IpNet::new(local, prefix)
                .map_err(|e| AgentError::Internal(format!("bad prefix from ip: {}", e)))?;
            addresses.push(net);
        }
    }
    Ok(addresses)
}
