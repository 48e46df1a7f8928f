//! Per-instance files: bootstrap, systemd unit and log forwarding config

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::deploy::bootstrap;
use crate::deploy::request::service_name;
use crate::deploy::state::{Step, StepError};
use crate::errors::AgentError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Files removed by [`ServiceFiles::delete_service_files`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDeletion {
    pub deleted_files: Vec<PathBuf>,
    pub errors: Vec<StepError>,
}

/// Writes, reads and removes the on-disk artifacts of an instance
#[async_trait]
pub trait ServiceFiles: Send + Sync {
    fn bootstrap_path(&self, service_name: &str) -> PathBuf;

    fn unit_path(&self, service_name: &str) -> PathBuf;

    fn logging_config_path(&self, service_name: &str) -> PathBuf;

    /// Unit file content as it would be written now
    fn render_service_unit(&self, name: &str, service_name: &str, version: &str, port: u16)
        -> String;

    /// Write the canonical form of the bootstrap document
    async fn write_bootstrap_file(
        &self,
        service_name: &str,
        content: &[u8],
    ) -> Result<PathBuf, AgentError>;

    async fn write_service_unit_file(
        &self,
        name: &str,
        service_name: &str,
        version: &str,
        port: u16,
    ) -> Result<PathBuf, AgentError>;

    async fn write_logging_config(&self, service_name: &str) -> Result<PathBuf, AgentError>;

    /// File content, `None` if absent
    async fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>, AgentError>;

    /// Remove a file. `Ok(false)` if it was already absent.
    async fn delete_file(&self, path: &Path) -> Result<bool, AgentError>;

    /// Remove every persisted file of an instance, each attempted independently.
    /// The interface descriptor lives wherever the network collaborator keeps it.
    async fn delete_service_files(&self, name: &str, port: u16, descriptor: &Path) -> FileDeletion {
        let service = service_name(name, port);
        let paths = [
            self.unit_path(&service),
            self.logging_config_path(&service),
            descriptor.to_path_buf(),
            self.bootstrap_path(&service),
        ];

        let mut deletion = FileDeletion::default();
        for path in paths {
            match self.delete_file(&path).await {
                Ok(true) => deletion.deleted_files.push(path),
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to delete {}: {}", path.display(), e);
                    deletion.errors.push(StepError::new(
                        Step::DeleteFile,
                        format!("{}: {}", path.display(), e),
                    ));
                }
            }
        }
        deletion
    }
}

/// Directories the file collaborator writes into
#[derive(Debug, Clone)]
pub struct ServicePaths {
    pub bootstrap_dir: Dir,
    pub unit_dir: Dir,
    pub logging_dir: Dir,
    pub log_dir: PathBuf,
    pub envoy_binary_dir: PathBuf,
}

/// `ServiceFiles` on the local filesystem
#[derive(Debug, Clone)]
pub struct FsServiceFiles {
    paths: ServicePaths,
}

impl FsServiceFiles {
    pub fn new(paths: ServicePaths) -> Self {
        Self { paths }
    }

    fn envoy_binary(&self, version: &str) -> PathBuf {
        self.paths.envoy_binary_dir.join(version).join("envoy")
    }
}

#[async_trait]
impl ServiceFiles for FsServiceFiles {
    fn bootstrap_path(&self, service_name: &str) -> PathBuf {
        self.paths
            .bootstrap_dir
            .path()
            .join(format!("{}.yaml", service_name))
    }

    fn unit_path(&self, service_name: &str) -> PathBuf {
        self.paths
            .unit_dir
            .path()
            .join(format!("{}.service", service_name))
    }

    fn logging_config_path(&self, service_name: &str) -> PathBuf {
        self.paths
            .logging_dir
            .path()
            .join(format!("{}.conf", service_name))
    }

    fn render_service_unit(
        &self,
        name: &str,
        service_name: &str,
        version: &str,
        port: u16,
    ) -> String {
        format!(
            "[Unit]\n\
             Description=Elchi proxy {name} (envoy {version}, port {port})\n\
             After=network-online.target\n\
             Wants=network-online.target\n\
             \n\
             [Service]\n\
             Type=simple\n\
             ExecStart={binary} -c {bootstrap} --base-id {port} --service-node {service}\n\
             Restart=on-failure\n\
             RestartSec=5\n\
             LimitNOFILE=1048576\n\
             SyslogIdentifier={service}\n\
             StandardOutput=journal\n\
             StandardError=journal\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target\n",
            name = name,
            version = version,
            port = port,
            binary = self.envoy_binary(version).display(),
            bootstrap = self.bootstrap_path(service_name).display(),
            service = service_name,
        )
    }

    async fn write_bootstrap_file(
        &self,
        service_name: &str,
        content: &[u8],
    ) -> Result<PathBuf, AgentError> {
        let file = File::new(self.bootstrap_path(service_name));
        file.write_atomic(&bootstrap::canonicalize(content)).await?;
        debug!("Wrote bootstrap {}", file.path().display());
        Ok(file.path().to_path_buf())
    }

    async fn write_service_unit_file(
        &self,
        name: &str,
        service_name: &str,
        version: &str,
        port: u16,
    ) -> Result<PathBuf, AgentError> {
        let file = File::new(self.unit_path(service_name));
        let unit = self.render_service_unit(name, service_name, version, port);
        file.write_atomic(unit.as_bytes()).await?;
        debug!("Wrote unit {}", file.path().display());
        Ok(file.path().to_path_buf())
    }

    async fn write_logging_config(&self, service_name: &str) -> Result<PathBuf, AgentError> {
        let file = File::new(self.logging_config_path(service_name));
        let log_file = self.paths.log_dir.join(format!("{}.log", service_name));
        let config = format!(
            "if $programname == '{}' then {}\n& stop\n",
            service_name,
            log_file.display()
        );
        file.write_atomic(config.as_bytes()).await?;
        debug!("Wrote logging config {}", file.path().display());
        Ok(file.path().to_path_buf())
    }

    async fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>, AgentError> {
        File::new(path).read_optional().await
    }

    async fn delete_file(&self, path: &Path) -> Result<bool, AgentError> {
        File::new(path).delete().await
    }
}
