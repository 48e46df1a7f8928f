//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{info, info_span, Instrument};

use crate::deploy::request::{DeploymentRequest, UndeployRequest};
use crate::errors::{DeployError, DeployErrorKind};
use crate::models::deployment::{DeployCommand, UndeployCommand};
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "elchi-agent".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// Error body returned for failed commands
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub kind: DeployErrorKind,
    pub error: String,
}

impl IntoResponse for DeployError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = match kind {
            DeployErrorKind::Validation => StatusCode::BAD_REQUEST,
            DeployErrorKind::PortConflict => StatusCode::CONFLICT,
            DeployErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            DeployErrorKind::ResourceCreation
            | DeployErrorKind::Verification
            | DeployErrorKind::PartialUpdate
            | DeployErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            success: false,
            kind,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Deployed instance
#[derive(Debug, Serialize)]
pub struct DeploymentInfo {
    pub port: u16,
    pub service_name: String,
}

/// Deployments response
#[derive(Debug, Serialize)]
pub struct DeploymentsResponse {
    pub deployments: Vec<DeploymentInfo>,
    pub total: usize,
}

/// List the ports claimed on this host
pub async fn list_deployments_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let deployments: Vec<DeploymentInfo> = state
        .deployer
        .registry()
        .snapshot()
        .into_iter()
        .map(|(port, service_name)| DeploymentInfo { port, service_name })
        .collect();
    let total = deployments.len();
    Json(DeploymentsResponse { deployments, total })
}

/// Deploy or update an instance
pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    Json(command): Json<DeployCommand>,
) -> Result<impl IntoResponse, DeployError> {
    let operation_id = uuid::Uuid::new_v4();
    let span = info_span!("command", %operation_id, op = "deploy");

    async move {
        info!("Deploy requested for {} on port {}", command.name, command.port);
        let request = DeploymentRequest::try_from(command)?;
        let result = state.deployer.deploy(request).await?;
        Ok::<_, DeployError>(Json(result))
    }
    .instrument(span)
    .await
}

/// Remove an instance
pub async fn undeploy_handler(
    State(state): State<Arc<ServerState>>,
    Json(command): Json<UndeployCommand>,
) -> Result<impl IntoResponse, DeployError> {
    let operation_id = uuid::Uuid::new_v4();
    let span = info_span!("command", %operation_id, op = "undeploy");

    async move {
        info!("Undeploy requested for {} on port {}", command.name, command.port);
        let request = UndeployRequest::try_from(command)?;
        let result = state.deployer.undeploy(request).await?;
        Ok::<_, DeployError>(Json(result))
    }
    .instrument(span)
    .await
}
