//! Undo of a partially built fresh deployment

use tracing::{info, warn};

use crate::deploy::state::{DeployState, RollbackReport, Step, StepError};
use crate::host::Host;

/// Undo everything recorded in `state`, newest first.
///
/// Never fails: every step logs and records its error, then continues.
pub async fn rollback(host: &Host, state: &DeployState) -> RollbackReport {
    let mut report = RollbackReport::default();
    let unit = format!("{}.service", state.service_name);
    info!("Rolling back {}", state.service_name);

    if state.service_started || state.service_enabled {
        match host.systemd.is_loaded(&unit).await {
            Ok(true) => {
                if state.service_started {
                    if let Err(e) = host.systemd.stop(&unit).await {
                        record(&mut report, Step::StopService, e);
                    }
                }
                if state.service_enabled {
                    if let Err(e) = host.systemd.disable(&unit).await {
                        record(&mut report, Step::DisableService, e);
                    }
                }
            }
            Ok(false) => info!("{} is not loaded, skipping stop/disable", unit),
            Err(e) => record(&mut report, Step::StopService, e),
        }
    }

    // Later files reference earlier ones by path.
    for path in state.created_files.iter().rev() {
        match host.files.delete_file(path).await {
            Ok(true) => report.deleted_files.push(path.clone()),
            Ok(false) => {}
            Err(e) => record(
                &mut report,
                Step::DeleteFile,
                format!("{}: {}", path.display(), e),
            ),
        }
    }

    if state.dummy_iface_created {
        if let Err(e) = host.network.delete_interface(&state.dummy_iface_name).await {
            record(&mut report, Step::DeleteInterface, e);
        }
    }

    if state.touched_systemd() {
        if let Err(e) = host.systemd.daemon_reload().await {
            record(&mut report, Step::DaemonReload, e);
        }
    }

    if report.is_clean() {
        info!("Rollback of {} complete", state.service_name);
    } else {
        warn!(
            "Rollback of {} finished with {} error(s)",
            state.service_name,
            report.errors.len()
        );
    }
    report
}

fn record(report: &mut RollbackReport, step: Step, cause: impl std::fmt::Display) {
    warn!("Rollback step {} failed: {}", step, cause);
    report.errors.push(StepError::new(step, cause));
}
