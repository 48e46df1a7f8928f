//! Deployment reconciliation engine

pub mod bootstrap;
pub mod checker;
pub mod reconciler;
pub mod registry;
pub mod request;
pub mod rollback;
pub mod state;
pub mod undeploy;
pub mod validator;

pub use reconciler::{apply_updates, Deployer, DeployerSettings};
