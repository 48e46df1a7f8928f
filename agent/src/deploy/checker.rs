//! Detection of an existing deployment and its drift

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::deploy::bootstrap;
use crate::deploy::request::DeploymentRequest;
use crate::deploy::state::DeploymentCheckResult;
use crate::host::Host;

/// Compare a request against what is live on the host.
///
/// Comparisons are byte-for-byte against canonical or freshly rendered
/// content, so a second call with no external change reports no drift.
pub async fn check(host: &Host, request: &DeploymentRequest) -> DeploymentCheckResult {
    let unit = request.unit_name();
    let exists = match host.systemd.is_loaded(&unit).await {
        Ok(loaded) => loaded,
        Err(e) => {
            warn!("Unable to query load state of {}: {}", unit, e);
            false
        }
    };
    if !exists {
        return DeploymentCheckResult::absent();
    }

    let service = request.service_name();
    let bootstrap_changed = bootstrap_changed(host, &service, &request.bootstrap).await;
    let interface_changed = interface_changed(host, request).await;
    let service_changed = service_changed(host, request).await;

    let result =
        DeploymentCheckResult::existing(bootstrap_changed, interface_changed, service_changed);
    debug!("Check for {}: {:?}", service, result);
    result
}

async fn bootstrap_changed(host: &Host, service: &str, requested: &[u8]) -> bool {
    let path = host.files.bootstrap_path(service);
    match host.files.read_file(&path).await {
        Ok(Some(on_disk)) => on_disk != bootstrap::canonicalize(requested),
        Ok(None) => true,
        Err(e) => {
            warn!("Unable to read {}: {}", path.display(), e);
            true
        }
    }
}

async fn interface_changed(host: &Host, request: &DeploymentRequest) -> bool {
    let iface = request.iface_name();

    let descriptor = host.network.descriptor_path(&iface);
    match host.files.read_file(&descriptor).await {
        Ok(Some(_)) => {}
        Ok(None) => return true,
        Err(e) => {
            warn!("Unable to read {}: {}", descriptor.display(), e);
            return true;
        }
    }

    if !host.network.interface_exists(&iface).await {
        return true;
    }

    match host.network.interface_addresses(&iface).await {
        Ok(addresses) => {
            let live: BTreeSet<_> = addresses.into_iter().collect();
            live != BTreeSet::from([request.downstream_address])
        }
        Err(e) => {
            warn!("Unable to list addresses of {}: {}", iface, e);
            true
        }
    }
}

async fn service_changed(host: &Host, request: &DeploymentRequest) -> bool {
    let service = request.service_name();
    let path = host.files.unit_path(&service);
    let rendered =
        host.files
            .render_service_unit(&request.name, &service, &request.version, request.port);
    match host.files.read_file(&path).await {
        Ok(Some(on_disk)) => on_disk != rendered.into_bytes(),
        Ok(None) => true,
        Err(e) => {
            warn!("Unable to read {}: {}", path.display(), e);
            true
        }
    }
}
