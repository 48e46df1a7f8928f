//! Elchi Agent Library
//!
//! Deployment reconciliation for Envoy proxy instances on a single host.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod host;
pub mod logs;
pub mod models;
pub mod server;
pub mod storage;
pub mod utils;
