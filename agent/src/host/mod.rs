//! Host collaborators used by the deployer

pub mod command;
pub mod files;
pub mod network;
pub mod systemd;

use std::sync::Arc;

use crate::host::files::ServiceFiles;
use crate::host::network::NetworkInterfaces;
use crate::host::systemd::Systemd;

/// Everything the deployer touches on the host
#[derive(Clone)]
pub struct Host {
    pub files: Arc<dyn ServiceFiles>,
    pub network: Arc<dyn NetworkInterfaces>,
    pub systemd: Systemd,
}

impl Host {
    pub fn new(
        files: Arc<dyn ServiceFiles>,
        network: Arc<dyn NetworkInterfaces>,
        systemd: Systemd,
    ) -> Self {
        Self {
            files,
            network,
            systemd,
        }
    }
}
