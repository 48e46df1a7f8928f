//! Active deployment registry

use std::collections::BTreeMap;
use std::sync::RwLock;

/// In-memory map of claimed ports to the service occupying them.
///
/// One instance lives for the whole agent process and is shared by
/// reference. Reads do not need the deployer's global lock.
#[derive(Debug, Default)]
pub struct ActiveDeployments {
    entries: RwLock<BTreeMap<u16, String>>,
}

impl ActiveDeployments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Service currently holding the port, if any
    pub fn owner(&self, port: u16) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&port).cloned()
    }

    pub fn contains(&self, port: u16) -> bool {
        self.owner(port).is_some()
    }

    /// Claim a port. Fails with the current owner if the port is held by
    /// another service. Re-claiming by the same service is a no-op.
    pub fn try_register(&self, port: u16, service: &str) -> Result<(), String> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        match entries.get(&port) {
            Some(owner) if owner != service => Err(owner.clone()),
            Some(_) => Ok(()),
            None => {
                entries.insert(port, service.to_string());
                Ok(())
            }
        }
    }

    /// Release a port. Returns the previous owner.
    pub fn remove(&self, port: u16) -> Option<String> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(&port)
    }

    pub fn snapshot(&self) -> BTreeMap<u16, String> {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
