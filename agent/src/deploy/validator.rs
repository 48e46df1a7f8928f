//! Prerequisite checks for a fresh deployment

use tracing::warn;

use crate::deploy::registry::ActiveDeployments;
use crate::deploy::request::{is_valid_name, DeploymentRequest};
use crate::errors::ValidationError;
use crate::host::Host;

/// Reject a fresh deployment that is malformed or would collide with
/// something already on the host. Performs no side effects; the first
/// violation wins.
pub async fn validate(
    host: &Host,
    registry: &ActiveDeployments,
    request: &DeploymentRequest,
) -> Result<(), ValidationError> {
    if !is_valid_name(&request.name) {
        return Err(ValidationError::InvalidName(request.name.clone()));
    }

    if let Some(owner) = registry.owner(request.port) {
        return Err(ValidationError::PortInUse {
            port: request.port,
            owner,
        });
    }

    let iface = request.iface_name();
    if host.network.interface_exists(&iface).await {
        return Err(ValidationError::InterfaceExists(iface));
    }

    let unit = request.unit_name();
    match (
        host.systemd.load_state(&unit).await,
        host.systemd.active_state(&unit).await,
    ) {
        (Ok(load), Ok(active)) if load == "loaded" && active == "active" => {
            return Err(ValidationError::ServiceActive(unit));
        }
        (Err(e), _) | (_, Err(e)) => {
            warn!("Unable to query state of {}: {}", unit, e);
        }
        _ => {}
    }

    Ok(())
}
