//! Tear-down of an instance

use tracing::{info, warn};

use crate::deploy::request::UndeployRequest;
use crate::deploy::state::{Step, StepError, UndeployResult};
use crate::host::Host;

/// Remove every resource of an instance. Each step is attempted regardless of
/// earlier failures, so repeating the call on partially cleaned state is safe.
/// The registry is not touched here; the deployer releases the port.
pub async fn undeploy(host: &Host, request: &UndeployRequest) -> UndeployResult {
    let service = request.service_name();
    let unit = request.unit_name();
    let iface = request.iface_name();

    let mut result = UndeployResult {
        service_name: service.clone(),
        ..Default::default()
    };
    let mut systemd_changed = false;

    match host.systemd.is_loaded(&unit).await {
        Ok(true) => {
            systemd_changed = true;
            if let Err(e) = host.systemd.stop(&unit).await {
                record(&mut result, Step::StopService, e);
            }
            if let Err(e) = host.systemd.disable(&unit).await {
                record(&mut result, Step::DisableService, e);
            }
        }
        Ok(false) => {}
        Err(e) => record(&mut result, Step::StopService, e),
    }

    if host.network.interface_exists(&iface).await {
        if let Err(e) = host.network.delete_interface(&iface).await {
            record(&mut result, Step::DeleteInterface, e);
        }
    }

    let descriptor = host.network.descriptor_path(&iface);
    let deletion = host
        .files
        .delete_service_files(&request.name, request.port, &descriptor)
        .await;
    let unit_path = host.files.unit_path(&service);
    if deletion.deleted_files.contains(&unit_path) {
        systemd_changed = true;
    }
    result.deleted_files = deletion.deleted_files;
    result.errors.extend(deletion.errors);

    if systemd_changed {
        if let Err(e) = host.systemd.daemon_reload().await {
            record(&mut result, Step::DaemonReload, e);
        }
    }

    result.success = result.errors.is_empty();
    info!(
        "Undeployed {}: {} file(s) removed, {} error(s)",
        service,
        result.deleted_files.len(),
        result.errors.len()
    );
    result
}

fn record(result: &mut UndeployResult, step: Step, cause: impl std::fmt::Display) {
    warn!("Undeploy step {} failed: {}", step, cause);
    result.errors.push(StepError::new(step, cause));
}
