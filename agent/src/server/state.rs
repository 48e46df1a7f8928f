//! Server state

use crate::deploy::Deployer;

/// Server state shared across handlers
pub struct ServerState {
    pub deployer: Deployer,
}

impl ServerState {
    pub fn new(deployer: Deployer) -> Self {
        Self { deployer }
    }
}
