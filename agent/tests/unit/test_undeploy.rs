//! Undeploy tests

use tokio_test::{assert_err, assert_ok};

use elchi_agent::deploy::request::UndeployRequest;
use elchi_agent::deploy::state::Step;
use elchi_agent::errors::DeployErrorKind;

use crate::support::{edge, TestHost, B1};

const UNIT: &str = "edge-9901.service";
const IFACE: &str = "elchi-if-9901";

fn undeploy_edge() -> UndeployRequest {
    UndeployRequest {
        name: "edge".to_string(),
        port: 9901,
    }
}

async fn deployed() -> TestHost {
    let h = TestHost::new();
    assert_ok!(h.deployer.deploy(edge(B1)).await);
    h
}

#[tokio::test]
async fn test_undeploy_removes_everything() {
    let h = deployed().await;

    let result = assert_ok!(h.deployer.undeploy(undeploy_edge()).await);

    assert!(result.success);
    assert!(result.errors.is_empty());
    assert_eq!(result.service_name, "edge-9901");
    assert_eq!(result.deleted_files.len(), 4);
    assert!(h.existing_instance_files("edge", 9901).is_empty());
    assert!(h.network.addresses(IFACE).is_none());
    assert!(!h.runner.is_active(UNIT));
    assert!(!h.runner.is_enabled(UNIT));
    assert!(!h.runner.is_loaded(UNIT));
    assert!(h.deployer.registry().is_empty());
}

#[tokio::test]
async fn test_undeploy_is_repeatable() {
    let h = deployed().await;
    assert_ok!(h.deployer.undeploy(undeploy_edge()).await);
    let calls = h.runner.control_calls().len();

    let again = assert_ok!(h.deployer.undeploy(undeploy_edge()).await);
    assert!(again.success);
    assert!(again.deleted_files.is_empty());
    assert_eq!(h.runner.control_calls().len(), calls);
}

#[tokio::test]
async fn test_undeploy_of_unknown_instance() {
    let h = TestHost::new();
    let result = assert_ok!(h.deployer.undeploy(undeploy_edge()).await);
    assert!(result.success);
    assert!(result.deleted_files.is_empty());
    assert!(h.runner.control_calls().is_empty());
}

#[tokio::test]
async fn test_failed_steps_are_collected() {
    let h = deployed().await;
    h.runner.fail("stop");
    h.network.fail_delete(true);

    let result = assert_ok!(h.deployer.undeploy(undeploy_edge()).await);

    assert!(!result.success);
    let steps: Vec<Step> = result.errors.iter().map(|e| e.step).collect();
    assert_eq!(steps, vec![Step::StopService, Step::DeleteInterface]);

    // Later steps still ran.
    assert!(!h.runner.is_enabled(UNIT));
    assert_eq!(result.deleted_files.len(), 4);
    assert!(h.existing_instance_files("edge", 9901).is_empty());
    assert!(h.deployer.registry().is_empty());
}

#[tokio::test]
async fn test_file_delete_failures_are_collected() {
    let h = deployed().await;
    h.files.fail("delete");

    let result = assert_ok!(h.deployer.undeploy(undeploy_edge()).await);
    assert!(!result.success);
    assert_eq!(result.errors.len(), 4);
    assert!(result.errors.iter().all(|e| e.step == Step::DeleteFile));
    assert!(h.network.addresses(IFACE).is_none());
}

#[tokio::test]
async fn test_invalid_name_is_rejected() {
    let h = TestHost::new();
    let err = assert_err!(
        h.deployer
            .undeploy(UndeployRequest {
                name: "../etc".to_string(),
                port: 9901,
            })
            .await
    );
    assert_eq!(err.kind(), DeployErrorKind::Validation);
    assert!(h.runner.calls().is_empty());
}
