//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;

use kdeploy_core::app::App;
use kdeploy_core::config::ControllerConfig;
use kdeploy_core::exec::{CancelSignal, Cmd, CmdRunResultBuffer, CmdRunner, RunError};
use kdeploy_core::kube::{CoreApi, ServiceAccountRef};
use kdeploy_core::orchestration::AppHost;

pub const CA_PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIBfake\n-----END CERTIFICATE-----\n";

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// Core API backed by maps; records every token request.
#[derive(Default)]
pub struct FakeCoreApi {
    service_accounts: BTreeMap<Key, ServiceAccountRef>,
    config_maps: BTreeMap<Key, BTreeMap<String, String>>,
    secrets: BTreeMap<Key, BTreeMap<String, Vec<u8>>>,
    token_requests: Mutex<Vec<(ServiceAccountRef, i64)>>,
}

impl FakeCoreApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service_account(mut self, namespace: &str, name: &str) -> Self {
        self.service_accounts.insert(
            key(namespace, name),
            ServiceAccountRef {
                name: name.to_string(),
                namespace: namespace.to_string(),
                uid: format!("uid-{}", name),
            },
        );
        self
    }

    pub fn with_config_map(mut self, namespace: &str, name: &str, data: &[(&str, &str)]) -> Self {
        self.config_maps.insert(
            key(namespace, name),
            data.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    pub fn with_secret(mut self, namespace: &str, name: &str, data: &[(&str, &str)]) -> Self {
        self.secrets.insert(
            key(namespace, name),
            data.iter()
                .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
                .collect(),
        );
        self
    }

    pub fn token_ttls(&self) -> Vec<i64> {
        self.token_requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, ttl)| *ttl)
            .collect()
    }
}

#[async_trait]
impl CoreApi for FakeCoreApi {
    async fn get_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<ServiceAccountRef> {
        self.service_accounts
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| anyhow!("serviceaccounts \"{}\" not found", name))
    }

    async fn create_token(
        &self,
        sa: &ServiceAccountRef,
        expiration_seconds: i64,
    ) -> anyhow::Result<String> {
        let mut requests = self.token_requests.lock().unwrap();
        requests.push((sa.clone(), expiration_seconds));
        Ok(format!("token-{}-{}", sa.name, requests.len()))
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<Option<BTreeMap<String, String>>> {
        Ok(self.config_maps.get(&key(namespace, name)).cloned())
    }

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<Option<BTreeMap<String, Vec<u8>>>> {
        Ok(self.secrets.get(&key(namespace, name)).cloned())
    }
}

/// What a [`FakeRunner`] does once invoked.
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    Fail(String),
    /// Write output, then block until canceled
    BlockUntilCanceled,
}

/// Records commands instead of spawning them.
pub struct FakeRunner {
    calls: Mutex<Vec<Cmd>>,
    stdout: String,
    stderr: String,
    behavior: Behavior,
}

impl FakeRunner {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            stdout: String::new(),
            stderr: String::new(),
            behavior,
        }
    }

    pub fn succeeding() -> Self {
        Self::new(Behavior::Succeed)
    }

    pub fn with_output(mut self, stdout: &str, stderr: &str) -> Self {
        self.stdout = stdout.to_string();
        self.stderr = stderr.to_string();
        self
    }

    pub fn calls(&self) -> Vec<Cmd> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CmdRunner for FakeRunner {
    async fn run_with_cancel(
        &self,
        cmd: &Cmd,
        output: Arc<CmdRunResultBuffer>,
        mut cancel: CancelSignal,
    ) -> Result<(), RunError> {
        self.calls.lock().unwrap().push(cmd.clone());
        output.write_stdout(self.stdout.as_bytes());
        output.write_stderr(self.stderr.as_bytes());

        match &self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(message) => Err(RunError::Wait(io::Error::other(message.clone()))),
            Behavior::BlockUntilCanceled => {
                cancel.cancelled().await;
                Err(RunError::Canceled)
            }
        }
    }
}

/// Host whose App can be mutated mid-run.
pub struct FakeHost {
    pub app: Mutex<App>,
    pub block_calls: AtomicUsize,
    pub unblock_calls: AtomicUsize,
    pub started_calls: AtomicUsize,
    pub fail_block: bool,
    pub fail_unblock: bool,
}

impl FakeHost {
    pub fn new(app: App) -> Self {
        Self {
            app: Mutex::new(app),
            block_calls: AtomicUsize::new(0),
            unblock_calls: AtomicUsize::new(0),
            started_calls: AtomicUsize::new(0),
            fail_block: false,
            fail_unblock: false,
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut App)) {
        f(&mut self.app.lock().unwrap());
    }

    pub fn blocks(&self) -> usize {
        self.block_calls.load(Ordering::SeqCst)
    }

    pub fn unblocks(&self) -> usize {
        self.unblock_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AppHost for FakeHost {
    async fn current_app(&self) -> anyhow::Result<App> {
        Ok(self.app.lock().unwrap().clone())
    }

    async fn block_deletion(&self) -> anyhow::Result<()> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_block {
            return Err(anyhow!("adding finalizer: conflict"));
        }
        Ok(())
    }

    async fn unblock_deletion(&self) -> anyhow::Result<()> {
        self.unblock_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_unblock {
            return Err(anyhow!("removing finalizer: conflict"));
        }
        Ok(())
    }

    fn started_applying(&self) {
        self.started_calls.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn app_from_yaml(yaml: &str) -> App {
    serde_yaml_ng::from_str(yaml).expect("test app should parse")
}

/// Config pointing CA and metadata paths into `dir`.
pub fn test_config(dir: &Path) -> ControllerConfig {
    let ca_path = dir.join("ca.crt");
    std::fs::write(&ca_path, CA_PEM).unwrap();
    let metadata_dir = dir.join("metadata");
    std::fs::create_dir_all(&metadata_dir).unwrap();

    ControllerConfig {
        ca_cert_path: ca_path,
        metadata_dir,
        kubernetes_service_host_port: Some("10.0.0.1:443".to_string()),
        ..ControllerConfig::default()
    }
}

pub fn metadata_file(config: &ControllerConfig, app_name: &str) -> PathBuf {
    config.metadata_dir.join(format!("metadata-{}", app_name))
}

pub fn args_of(cmd: &Cmd) -> Vec<&str> {
    cmd.args.iter().map(String::as_str).collect()
}

pub fn env_of<'a>(cmd: &'a Cmd, name: &str) -> Option<&'a str> {
    cmd.env
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}
