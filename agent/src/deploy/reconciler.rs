//! Deployment reconciliation
//!
//! Every deploy and undeploy runs under one process-wide lock. A request is
//! routed to a no-op, the update path or the fresh path depending on what the
//! checker finds on the host. The fresh path is transactional: anything it
//! created is rolled back when a later step fails.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{error, info, info_span, warn, Instrument};

use crate::deploy::bootstrap;
use crate::deploy::checker::check;
use crate::deploy::registry::ActiveDeployments;
use crate::deploy::request::{is_valid_name, DeploymentRequest, UndeployRequest};
use crate::deploy::rollback::rollback;
use crate::deploy::state::{
    DeployAction, DeployResult, DeployState, DeploymentCheckResult, Step, StepError,
    UndeployResult,
};
use crate::deploy::undeploy::undeploy;
use crate::deploy::validator::validate;
use crate::errors::{DeployError, ValidationError};
use crate::host::network::InterfaceDescriptor;
use crate::host::Host;
use crate::utils::sha256_hash;

/// Deployer settings
#[derive(Debug, Clone)]
pub struct DeployerSettings {
    /// Upper bound for the host calls of one deploy or undeploy
    pub operation_timeout: Duration,

    /// Wait between starting a unit and checking that it stayed up
    pub verify_delay: Duration,
}

impl Default for DeployerSettings {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(120),
            verify_delay: Duration::from_secs(2),
        }
    }
}

/// Entry point for deploy and undeploy requests
#[derive(Clone)]
pub struct Deployer {
    host: Host,
    registry: Arc<ActiveDeployments>,
    lock: Arc<Mutex<()>>,
    settings: DeployerSettings,
}

impl Deployer {
    pub fn new(host: Host, registry: Arc<ActiveDeployments>, settings: DeployerSettings) -> Self {
        Self {
            host,
            registry,
            lock: Arc::new(Mutex::new(())),
            settings,
        }
    }

    pub fn registry(&self) -> &ActiveDeployments {
        &self.registry
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Create or converge the instance described by `request`.
    ///
    /// The work runs on its own task: dropping the returned future does not
    /// interrupt a deployment or its rollback.
    pub async fn deploy(&self, request: DeploymentRequest) -> Result<DeployResult, DeployError> {
        if !is_valid_name(&request.name) {
            return Err(ValidationError::InvalidName(request.name).into());
        }

        let this = self.clone();
        let span = info_span!("deploy", service = %request.service_name(), port = request.port);
        tokio::spawn(async move { this.deploy_exclusive(request).await }.instrument(span))
            .await
            .map_err(|e| DeployError::Internal(format!("deploy task failed: {}", e)))?
    }

    /// Tear down the instance. Step failures are collected in the result.
    pub async fn undeploy(&self, request: UndeployRequest) -> Result<UndeployResult, DeployError> {
        if !is_valid_name(&request.name) {
            return Err(ValidationError::InvalidName(request.name).into());
        }

        let this = self.clone();
        let span = info_span!("undeploy", service = %request.service_name(), port = request.port);
        tokio::spawn(async move { this.undeploy_exclusive(request).await }.instrument(span))
            .await
            .map_err(|e| DeployError::Internal(format!("undeploy task failed: {}", e)))
    }

    async fn deploy_exclusive(&self, request: DeploymentRequest) -> Result<DeployResult, DeployError> {
        let _guard = self.lock.lock().await;
        let timeout = self.settings.operation_timeout;

        let status = tokio::time::timeout(timeout, check(&self.host, &request))
            .await
            .map_err(|_| DeployError::Timeout { timeout })?;

        if !status.exists {
            return self.deploy_fresh(&request).await;
        }

        let service = request.service_name();
        self.registry
            .try_register(request.port, &service)
            .map_err(|owner| ValidationError::PortInUse {
                port: request.port,
                owner,
            })?;

        if !status.needs_update {
            info!("{} is up to date", service);
            return Ok(self.result(&request, DeployAction::Unchanged, Vec::new(), None, Vec::new()));
        }

        info!(
            "Updating {} (bootstrap: {}, interface: {}, unit: {})",
            service, status.bootstrap_changed, status.interface_changed, status.service_changed
        );
        let changed = tokio::time::timeout(timeout, apply_updates(&self.host, &request, &status))
            .await
            .map_err(|_| DeployError::Timeout { timeout })?
            .inspect_err(|e| error!("Update of {} failed: {}", service, e))?;

        Ok(self.result(&request, DeployAction::Updated, changed, None, Vec::new()))
    }

    async fn deploy_fresh(&self, request: &DeploymentRequest) -> Result<DeployResult, DeployError> {
        validate(&self.host, &self.registry, request).await?;

        let service = request.service_name();
        self.registry
            .try_register(request.port, &service)
            .map_err(|owner| ValidationError::PortInUse {
                port: request.port,
                owner,
            })?;
        info!("Deploying new instance {}", service);

        let mut state = DeployState::new(&service, request.iface_name());
        let mut created = CreatedResources::default();
        let timeout = self.settings.operation_timeout;

        let attempt = tokio::time::timeout(
            timeout,
            self.create_resources(request, &mut state, &mut created),
        )
        .await;
        let outcome = match attempt {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("Deployment of {} timed out", service);
                self.recover_interrupted(request, &mut state).await;
                Err(DeployError::Timeout { timeout })
            }
        };

        match outcome {
            Ok(()) => {
                info!("Deployed {}", service);
                Ok(self.result(
                    request,
                    DeployAction::Created,
                    created.resources,
                    created.logging_config,
                    created.warnings,
                ))
            }
            Err(e) => {
                error!("Deployment of {} failed: {}", service, e);
                rollback(&self.host, &state).await;
                self.registry.remove(request.port);
                Err(e)
            }
        }
    }

    async fn create_resources(
        &self,
        request: &DeploymentRequest,
        state: &mut DeployState,
        created: &mut CreatedResources,
    ) -> Result<(), DeployError> {
        let host = &self.host;
        let service = request.service_name();
        let unit = request.unit_name();
        let iface = request.iface_name();

        let bootstrap = host
            .files
            .write_bootstrap_file(&service, &request.bootstrap)
            .await
            .map_err(DeployError::creation(Step::WriteBootstrap))?;
        state.record_file(bootstrap.clone());

        let descriptor = interface_descriptor(request);
        match host.network.setup_interface(&descriptor).await {
            Ok(setup) => {
                state.record_file(setup.descriptor_path.clone());
                state.dummy_iface_name = setup.iface_name;
                state.dummy_iface_created = true;
                created.resources.push(bootstrap);
                created.resources.push(setup.descriptor_path);
            }
            Err(e) => {
                self.recover_interface(&iface, state).await;
                return Err(DeployError::creation(Step::SetupInterface)(e));
            }
        }

        let unit_path = host
            .files
            .write_service_unit_file(&request.name, &service, &request.version, request.port)
            .await
            .map_err(DeployError::creation(Step::WriteUnit))?;
        state.record_file(unit_path.clone());
        created.resources.push(unit_path);

        let logging = host
            .files
            .write_logging_config(&service)
            .await
            .map_err(DeployError::creation(Step::WriteLoggingConfig))?;
        state.record_file(logging.clone());
        created.logging_config = Some(logging);

        if let Err(e) = host.systemd.restart_logging_collector().await {
            warn!("Failed to restart logging collector: {}", e);
            created
                .warnings
                .push(StepError::new(Step::RestartLoggingCollector, e));
        }

        host.systemd
            .daemon_reload()
            .await
            .map_err(DeployError::creation(Step::DaemonReload))?;
        state.systemd_reloaded = true;

        host.systemd
            .enable(&unit)
            .await
            .map_err(DeployError::creation(Step::EnableService))?;
        state.service_enabled = true;

        host.systemd
            .start(&unit)
            .await
            .map_err(DeployError::creation(Step::StartService))?;
        state.service_started = true;

        if !self.settings.verify_delay.is_zero() {
            tokio::time::sleep(self.settings.verify_delay).await;
        }
        let active = host
            .systemd
            .active_state(&unit)
            .await
            .map_err(DeployError::creation(Step::VerifyService))?;
        if active != "active" {
            return Err(DeployError::Verification {
                service,
                state: active,
            });
        }

        Ok(())
    }

    /// The kernel may hold a partially applied interface after a failed or
    /// interrupted setup.
    async fn recover_interface(&self, iface: &str, state: &mut DeployState) {
        if self.host.network.interface_exists(iface).await {
            state.dummy_iface_created = true;
        }
        let descriptor = self.host.network.descriptor_path(iface);
        if let Ok(Some(_)) = self.host.files.read_file(&descriptor).await {
            state.record_file(descriptor);
        }
    }

    /// A step cut off by the deadline may already have taken effect. Record
    /// everything of the instance that exists so rollback removes it.
    async fn recover_interrupted(&self, request: &DeploymentRequest, state: &mut DeployState) {
        let host = &self.host;
        let service = request.service_name();
        let unit = request.unit_name();

        for path in [
            host.files.bootstrap_path(&service),
            host.files.unit_path(&service),
            host.files.logging_config_path(&service),
        ] {
            if let Ok(Some(_)) = host.files.read_file(&path).await {
                state.record_file(path);
            }
        }
        self.recover_interface(&request.iface_name(), state).await;

        if let Ok(true) = host.systemd.is_loaded(&unit).await {
            state.systemd_reloaded = true;
            state.service_enabled = true;
            match host.systemd.active_state(&unit).await {
                Ok(active) if active == "inactive" => {}
                _ => state.service_started = true,
            }
        }
    }

    async fn undeploy_exclusive(&self, request: UndeployRequest) -> UndeployResult {
        let _guard = self.lock.lock().await;
        let timeout = self.settings.operation_timeout;

        let mut result = match tokio::time::timeout(timeout, undeploy(&self.host, &request)).await
        {
            Ok(result) => result,
            Err(_) => {
                warn!("Undeploy of {} timed out", request.service_name());
                UndeployResult {
                    service_name: request.service_name(),
                    errors: vec![StepError::new(
                        Step::Deadline,
                        format!("timed out after {:?}", timeout),
                    )],
                    ..Default::default()
                }
            }
        };

        self.registry.remove(request.port);
        result.success = result.errors.is_empty();
        result
    }

    fn result(
        &self,
        request: &DeploymentRequest,
        action: DeployAction,
        resources: Vec<PathBuf>,
        logging_config: Option<PathBuf>,
        warnings: Vec<StepError>,
    ) -> DeployResult {
        DeployResult {
            success: true,
            action,
            service_name: request.service_name(),
            iface_name: request.iface_name(),
            resources,
            logging_config,
            warnings,
            bootstrap_sha256: sha256_hash(&bootstrap::canonicalize(&request.bootstrap)),
            completed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
struct CreatedResources {
    resources: Vec<PathBuf>,
    logging_config: Option<PathBuf>,
    warnings: Vec<StepError>,
}

fn interface_descriptor(request: &DeploymentRequest) -> InterfaceDescriptor {
    InterfaceDescriptor {
        service_name: request.service_name(),
        iface_name: request.iface_name(),
        address: request.downstream_address,
        port: request.port,
        interface_id: request.interface_id.clone(),
    }
}

/// Converge an existing instance, touching only what `status` flags as changed.
///
/// Each step is an idempotent upsert, so nothing is rolled back: the first
/// failure is returned and the same request can simply be sent again.
/// Returns the paths that were rewritten.
pub async fn apply_updates(
    host: &Host,
    request: &DeploymentRequest,
    status: &DeploymentCheckResult,
) -> Result<Vec<PathBuf>, DeployError> {
    let service = request.service_name();
    let mut changed = Vec::new();

    if status.bootstrap_changed {
        let path = host
            .files
            .write_bootstrap_file(&service, &request.bootstrap)
            .await
            .map_err(DeployError::update(Step::WriteBootstrap))?;
        changed.push(path);
    }

    if status.interface_changed {
        let setup = host
            .network
            .setup_interface(&interface_descriptor(request))
            .await
            .map_err(DeployError::update(Step::SetupInterface))?;
        changed.push(setup.descriptor_path);
    }

    if status.service_changed {
        let path = host
            .files
            .write_service_unit_file(&request.name, &service, &request.version, request.port)
            .await
            .map_err(DeployError::update(Step::WriteUnit))?;
        changed.push(path);
        host.systemd
            .daemon_reload()
            .await
            .map_err(DeployError::update(Step::DaemonReload))?;
    }

    if status.service_needs_restart {
        host.systemd
            .restart(&request.unit_name())
            .await
            .map_err(DeployError::update(Step::RestartService))?;
    }

    Ok(changed)
}
