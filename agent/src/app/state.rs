//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::deploy::registry::ActiveDeployments;
use crate::deploy::Deployer;
use crate::errors::AgentError;
use crate::host::command::{CommandRunner, TokioCommandRunner};
use crate::host::files::FsServiceFiles;
use crate::host::network::IpRouteInterfaces;
use crate::host::systemd::Systemd;
use crate::host::Host;
use crate::storage::layout::StorageLayout;

/// Main application state
pub struct AppState {
    /// Deployment engine, owner of the active deployment registry
    pub deployer: Deployer,
}

impl AppState {
    /// Initialize application state
    pub async fn init(options: &AppOptions) -> Result<Self, AgentError> {
        info!("Initializing application state...");
        let settings = &options.settings;

        options.layout.setup(settings).await?;

        let runner: Arc<dyn CommandRunner> = Arc::new(TokioCommandRunner::new(
            settings.command_timeout(),
            settings.use_sudo,
        ));
        let files = Arc::new(FsServiceFiles::new(options.layout.service_paths(settings)));
        let network = Arc::new(IpRouteInterfaces::new(
            runner.clone(),
            StorageLayout::interface_dir(settings),
        ));
        let systemd = Systemd::new(runner, settings.logging_collector_unit.clone());

        let deployer = Deployer::new(
            Host::new(files, network, systemd),
            Arc::new(ActiveDeployments::new()),
            options.deployer.clone(),
        );

        Ok(Self { deployer })
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), AgentError> {
        info!(
            "Shutting down application state with {} active deployment(s)",
            self.deployer.registry().len()
        );
        Ok(())
    }
}
