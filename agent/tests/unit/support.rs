//! Test doubles for the host collaborators

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ipnet::IpNet;
use tempfile::TempDir;

use elchi_agent::deploy::registry::ActiveDeployments;
use elchi_agent::deploy::request::{DeploymentRequest, IpMode};
use elchi_agent::deploy::{Deployer, DeployerSettings};
use elchi_agent::errors::AgentError;
use elchi_agent::filesys::dir::Dir;
use elchi_agent::host::command::{CommandOutput, CommandRunner};
use elchi_agent::host::files::{FsServiceFiles, ServiceFiles, ServicePaths};
use elchi_agent::host::network::{InterfaceDescriptor, InterfaceSetup, NetworkInterfaces};
use elchi_agent::host::systemd::Systemd;
use elchi_agent::host::Host;
use elchi_agent::models::deployment::DeployCommand;

pub const B1: &str = "node:\n  id: edge\nadmin:\n  address: {socket_address: {address: 127.0.0.1, port_value: 19901}}\n";
pub const B2: &str = "node:\n  id: edge\nadmin:\n  address: {socket_address: {address: 127.0.0.1, port_value: 29901}}\n";

const CONTROL_VERBS: &[&str] = &["daemon-reload", "enable", "disable", "start", "stop", "restart"];

// ================================ SYSTEMD ======================================= //

#[derive(Debug, Default)]
struct SystemdSim {
    loaded: HashSet<String>,
    enabled: HashSet<String>,
    active: HashSet<String>,
}

/// Simulated `systemctl`. Units become loaded when a daemon-reload finds their
/// file in the unit directory.
pub struct FakeRunner {
    unit_dir: PathBuf,
    sim: Mutex<SystemdSim>,
    calls: Mutex<Vec<Vec<String>>>,
    failures: Mutex<HashSet<String>>,
    hang_on: Mutex<Option<String>>,
    hang_after: Mutex<Option<String>>,
    crash_on_start: AtomicBool,
}

impl FakeRunner {
    pub fn new(unit_dir: PathBuf) -> Self {
        Self {
            unit_dir,
            sim: Mutex::new(SystemdSim::default()),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashSet::new()),
            hang_on: Mutex::new(None),
            hang_after: Mutex::new(None),
            crash_on_start: AtomicBool::new(false),
        }
    }

    /// Fail a verb (`start`) or a verb on one unit (`restart:rsyslog`)
    pub fn fail(&self, key: &str) {
        self.failures.lock().unwrap().insert(key.to_string());
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Block before the verb takes effect
    pub fn hang_on(&self, verb: &str) {
        *self.hang_on.lock().unwrap() = Some(verb.to_string());
    }

    /// Apply the verb, then never return
    pub fn hang_after(&self, verb: &str) {
        *self.hang_after.lock().unwrap() = Some(verb.to_string());
    }

    /// `start` succeeds but the unit never reaches `active`
    pub fn crash_on_start(&self, crash: bool) {
        self.crash_on_start.store(crash, Ordering::SeqCst);
    }

    pub fn force_unit(&self, unit: &str, loaded: bool, active: bool) {
        let mut sim = self.sim.lock().unwrap();
        if loaded {
            sim.loaded.insert(unit.to_string());
        }
        if active {
            sim.active.insert(unit.to_string());
        }
    }

    pub fn is_active(&self, unit: &str) -> bool {
        self.sim.lock().unwrap().active.contains(unit)
    }

    pub fn is_enabled(&self, unit: &str) -> bool {
        self.sim.lock().unwrap().enabled.contains(unit)
    }

    pub fn is_loaded(&self, unit: &str) -> bool {
        self.sim.lock().unwrap().loaded.contains(unit)
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that change unit state, as `verb` or `verb unit`
    pub fn control_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|argv| argv.len() >= 2 && CONTROL_VERBS.contains(&argv[1].as_str()))
            .map(|argv| argv[1..].join(" "))
            .collect()
    }

    fn should_fail(&self, verb: &str, unit: &str) -> bool {
        let failures = self.failures.lock().unwrap();
        failures.contains(verb) || failures.contains(&format!("{}:{}", verb, unit))
    }

    fn scan_units(&self) -> HashSet<String> {
        std::fs::read_dir(&self.unit_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| e.file_name().into_string().ok())
                    .filter(|name| name.ends_with(".service"))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run_privileged(&self, argv: &[&str]) -> Result<CommandOutput, AgentError> {
        let argv: Vec<String> = argv.iter().map(|s| s.to_string()).collect();
        self.calls.lock().unwrap().push(argv.clone());

        if argv.first().map(String::as_str) != Some("systemctl") || argv.len() < 2 {
            return Err(AgentError::Internal(format!("unexpected command {:?}", argv)));
        }
        let verb = argv[1].clone();
        let unit = if argv.len() > 2 {
            argv[argv.len() - 1].clone()
        } else {
            String::new()
        };

        let hang = self.hang_on.lock().unwrap().as_deref() == Some(verb.as_str());
        if hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        let output = self.apply(&argv, &verb, &unit)?;

        let hang = self.hang_after.lock().unwrap().as_deref() == Some(verb.as_str());
        if hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(output)
    }
}

impl FakeRunner {
    fn apply(&self, argv: &[String], verb: &str, unit: &str) -> Result<CommandOutput, AgentError> {
        let unit = unit.to_string();
        if self.should_fail(verb, &unit) {
            return Err(AgentError::CommandFailed {
                command: argv.join(" "),
                code: Some(1),
                stderr: "injected failure".to_string(),
            });
        }

        let crash = self.crash_on_start.load(Ordering::SeqCst);
        let scanned = if verb == "daemon-reload" {
            Some(self.scan_units())
        } else {
            None
        };

        let mut sim = self.sim.lock().unwrap();
        let not_found = || AgentError::CommandFailed {
            command: argv.join(" "),
            code: Some(5),
            stderr: format!("Unit {} not found.", unit),
        };
        match verb {
            "show" => {
                let value = match argv[3].as_str() {
                    "LoadState" if sim.loaded.contains(&unit) => "loaded",
                    "LoadState" => "not-found",
                    "ActiveState" if sim.active.contains(&unit) => "active",
                    "ActiveState" if crash && sim.enabled.contains(&unit) => "failed",
                    "ActiveState" => "inactive",
                    _ => "",
                };
                return Ok(CommandOutput::stdout(format!("{}\n", value)));
            }
            "daemon-reload" => {
                sim.loaded = scanned.unwrap_or_default();
            }
            "enable" => {
                if !sim.loaded.contains(&unit) {
                    return Err(not_found());
                }
                sim.enabled.insert(unit.clone());
            }
            "disable" => {
                sim.enabled.remove(&unit);
            }
            "start" | "restart" => {
                if sim.loaded.contains(&unit) && !crash {
                    sim.active.insert(unit.clone());
                } else if !sim.loaded.contains(&unit) && verb == "start" {
                    return Err(not_found());
                }
            }
            "stop" => {
                sim.active.remove(&unit);
            }
            _ => {}
        }
        Ok(CommandOutput::default())
    }
}

// ================================ NETWORK ======================================= //

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupFailure {
    /// Fail before touching the kernel
    BeforeCreate,
    /// Fail after the link exists but before the descriptor is written
    AfterCreate,
    /// Create the link, then never return
    HangAfterCreate,
}

/// In-memory kernel links; descriptors are written to disk
pub struct FakeNetwork {
    descriptor_dir: Dir,
    links: Mutex<BTreeMap<String, Vec<IpNet>>>,
    setup_calls: AtomicUsize,
    fail_setup: Mutex<Option<SetupFailure>>,
    fail_delete: AtomicBool,
}

impl FakeNetwork {
    pub fn new(descriptor_dir: Dir) -> Self {
        Self {
            descriptor_dir,
            links: Mutex::new(BTreeMap::new()),
            setup_calls: AtomicUsize::new(0),
            fail_setup: Mutex::new(None),
            fail_delete: AtomicBool::new(false),
        }
    }

    pub fn fail_setup(&self, failure: Option<SetupFailure>) {
        *self.fail_setup.lock().unwrap() = failure;
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn setup_calls(&self) -> usize {
        self.setup_calls.load(Ordering::SeqCst)
    }

    pub fn addresses(&self, iface: &str) -> Option<Vec<IpNet>> {
        self.links.lock().unwrap().get(iface).cloned()
    }

    pub fn add_link(&self, iface: &str, addresses: Vec<IpNet>) {
        self.links
            .lock()
            .unwrap()
            .insert(iface.to_string(), addresses);
    }
}

#[async_trait]
impl NetworkInterfaces for FakeNetwork {
    fn descriptor_path(&self, iface_name: &str) -> PathBuf {
        self.descriptor_dir
            .path()
            .join(format!("{}.json", iface_name))
    }

    async fn setup_interface(
        &self,
        descriptor: &InterfaceDescriptor,
    ) -> Result<InterfaceSetup, AgentError> {
        self.setup_calls.fetch_add(1, Ordering::SeqCst);
        let failure = *self.fail_setup.lock().unwrap();
        let injected = || AgentError::CommandFailed {
            command: "ip link add".to_string(),
            code: Some(2),
            stderr: "injected failure".to_string(),
        };

        if failure == Some(SetupFailure::BeforeCreate) {
            return Err(injected());
        }
        self.links
            .lock()
            .unwrap()
            .insert(descriptor.iface_name.clone(), vec![descriptor.address]);
        match failure {
            Some(SetupFailure::AfterCreate) => return Err(injected()),
            Some(SetupFailure::HangAfterCreate) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            _ => {}
        }

        let file = self
            .descriptor_dir
            .file(&format!("{}.json", descriptor.iface_name));
        file.write_json(descriptor).await?;
        Ok(InterfaceSetup {
            descriptor_path: file.path().to_path_buf(),
            iface_name: descriptor.iface_name.clone(),
        })
    }

    async fn delete_interface(&self, iface_name: &str) -> Result<(), AgentError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(AgentError::Internal("injected delete failure".to_string()));
        }
        match self.links.lock().unwrap().remove(iface_name) {
            Some(_) => Ok(()),
            None => Err(AgentError::CommandFailed {
                command: format!("ip link del {}", iface_name),
                code: Some(1),
                stderr: "Cannot find device".to_string(),
            }),
        }
    }

    async fn interface_exists(&self, iface_name: &str) -> bool {
        self.links.lock().unwrap().contains_key(iface_name)
    }

    async fn interface_addresses(&self, iface_name: &str) -> Result<Vec<IpNet>, AgentError> {
        self.addresses(iface_name)
            .ok_or_else(|| AgentError::Internal(format!("no such device {}", iface_name)))
    }
}

// ================================= FILES ======================================== //

/// Delegates to the real filesystem implementation, recording calls and
/// failing chosen operations
pub struct RecordingFiles {
    inner: FsServiceFiles,
    writes: Mutex<Vec<&'static str>>,
    deletes: Mutex<Vec<PathBuf>>,
    failures: Mutex<HashSet<&'static str>>,
}

impl RecordingFiles {
    pub fn new(inner: FsServiceFiles) -> Self {
        Self {
            inner,
            writes: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
            failures: Mutex::new(HashSet::new()),
        }
    }

    /// One of `write_bootstrap`, `write_unit`, `write_logging`, `delete`
    pub fn fail(&self, op: &'static str) {
        self.failures.lock().unwrap().insert(op);
    }

    pub fn writes(&self) -> Vec<&'static str> {
        self.writes.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.writes().iter().filter(|w| **w == op).count()
    }

    pub fn deletes(&self) -> Vec<PathBuf> {
        self.deletes.lock().unwrap().clone()
    }

    fn check(&self, op: &'static str) -> Result<(), AgentError> {
        if self.failures.lock().unwrap().contains(op) {
            return Err(AgentError::IoError(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("injected {} failure", op),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceFiles for RecordingFiles {
    fn bootstrap_path(&self, service_name: &str) -> PathBuf {
        self.inner.bootstrap_path(service_name)
    }

    fn unit_path(&self, service_name: &str) -> PathBuf {
        self.inner.unit_path(service_name)
    }

    fn logging_config_path(&self, service_name: &str) -> PathBuf {
        self.inner.logging_config_path(service_name)
    }

    fn render_service_unit(
        &self,
        name: &str,
        service_name: &str,
        version: &str,
        port: u16,
    ) -> String {
        self.inner
            .render_service_unit(name, service_name, version, port)
    }

    async fn write_bootstrap_file(
        &self,
        service_name: &str,
        content: &[u8],
    ) -> Result<PathBuf, AgentError> {
        self.writes.lock().unwrap().push("write_bootstrap");
        self.check("write_bootstrap")?;
        self.inner.write_bootstrap_file(service_name, content).await
    }

    async fn write_service_unit_file(
        &self,
        name: &str,
        service_name: &str,
        version: &str,
        port: u16,
    ) -> Result<PathBuf, AgentError> {
        self.writes.lock().unwrap().push("write_unit");
        self.check("write_unit")?;
        self.inner
            .write_service_unit_file(name, service_name, version, port)
            .await
    }

    async fn write_logging_config(&self, service_name: &str) -> Result<PathBuf, AgentError> {
        self.writes.lock().unwrap().push("write_logging");
        self.check("write_logging")?;
        self.inner.write_logging_config(service_name).await
    }

    async fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>, AgentError> {
        self.inner.read_file(path).await
    }

    async fn delete_file(&self, path: &Path) -> Result<bool, AgentError> {
        self.deletes.lock().unwrap().push(path.to_path_buf());
        self.check("delete")?;
        self.inner.delete_file(path).await
    }
}

// ================================ HARNESS ======================================= //

pub struct TestHost {
    pub dir: TempDir,
    pub runner: Arc<FakeRunner>,
    pub network: Arc<FakeNetwork>,
    pub files: Arc<RecordingFiles>,
    pub host: Host,
    pub deployer: Deployer,
}

impl TestHost {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(10))
    }

    pub fn with_timeout(operation_timeout: Duration) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let interface_dir = Dir::new(root.join("state").join("interfaces"));
        let files = Arc::new(RecordingFiles::new(FsServiceFiles::new(ServicePaths {
            bootstrap_dir: Dir::new(root.join("bootstraps")),
            unit_dir: Dir::new(root.join("units")),
            logging_dir: Dir::new(root.join("rsyslog.d")),
            log_dir: root.join("log"),
            envoy_binary_dir: root.join("envoys"),
        })));
        let runner = Arc::new(FakeRunner::new(root.join("units")));
        let network = Arc::new(FakeNetwork::new(interface_dir));

        let host = Host::new(
            files.clone(),
            network.clone(),
            Systemd::new(runner.clone(), "rsyslog"),
        );
        let deployer = Deployer::new(
            host.clone(),
            Arc::new(ActiveDeployments::new()),
            DeployerSettings {
                operation_timeout,
                verify_delay: Duration::ZERO,
            },
        );

        Self {
            dir,
            runner,
            network,
            files,
            host,
            deployer,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Every file the instance can own on disk, present or not
    pub fn instance_files(&self, name: &str, port: u16) -> Vec<PathBuf> {
        let service = format!("{}-{}", name, port);
        vec![
            self.files.bootstrap_path(&service),
            self.network.descriptor_path(&format!("elchi-if-{}", port)),
            self.files.unit_path(&service),
            self.files.logging_config_path(&service),
        ]
    }

    pub fn existing_instance_files(&self, name: &str, port: u16) -> Vec<PathBuf> {
        self.instance_files(name, port)
            .into_iter()
            .filter(|p| p.exists())
            .collect()
    }
}

pub fn request(name: &str, port: u16, address: &str, bootstrap: &str) -> DeploymentRequest {
    DeploymentRequest {
        name: name.to_string(),
        version: "1.31.0".to_string(),
        port,
        downstream_address: address.parse().unwrap(),
        bootstrap: bootstrap.as_bytes().to_vec(),
        interface_id: None,
        ip_mode: IpMode::Ipv4,
    }
}

pub fn edge(bootstrap: &str) -> DeploymentRequest {
    request("edge", 9901, "10.0.0.5/24", bootstrap)
}

pub fn command(name: &str, port: u32, bootstrap: &str) -> DeployCommand {
    DeployCommand {
        name: name.to_string(),
        version: "1.31.0".to_string(),
        port,
        downstream_address: "10.0.0.5/24".to_string(),
        bootstrap: STANDARD.encode(bootstrap),
        interface_id: None,
        ip_mode: IpMode::Ipv4,
    }
}
