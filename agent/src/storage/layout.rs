//! Storage layout configuration

use std::path::PathBuf;

use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::host::files::ServicePaths;
use crate::storage::settings::Settings;

/// Storage layout for the agent
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for agent configuration
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Directories for instance files, as configured
    pub fn service_paths(&self, settings: &Settings) -> ServicePaths {
        ServicePaths {
            bootstrap_dir: Dir::new(&settings.paths.bootstrap_dir),
            unit_dir: Dir::new(&settings.paths.unit_dir),
            logging_dir: Dir::new(&settings.paths.logging_dir),
            log_dir: settings.paths.log_dir.clone(),
            envoy_binary_dir: settings.envoy_binary_dir.clone(),
        }
    }

    /// Interface descriptor directory
    pub fn interface_dir(settings: &Settings) -> Dir {
        Dir::new(&settings.paths.state_dir).subdir("interfaces")
    }

    /// Create the directories the agent writes into
    pub async fn setup(&self, settings: &Settings) -> Result<(), crate::errors::AgentError> {
        let paths = self.service_paths(settings);
        paths.bootstrap_dir.create().await?;
        Self::interface_dir(settings).create().await?;
        Dir::new(&paths.log_dir).create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("/etc/elchi")
    }
}
