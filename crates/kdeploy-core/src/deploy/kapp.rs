//! Deploy engine backed by the `kapp` CLI.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::app::AppDeployKapp;
use crate::config::ControllerConfig;
use crate::error::{DeployError, DeployResult};
use crate::exec::{
    AllowedFlags, CancelSignal, ChangedFn, Cmd, CmdRunResult, CmdRunResultBuffer, CmdRunner,
    PROGRESS_INTERVAL, ProgressTracker, RunError, StartedApplyingFn,
};
use crate::kube::CoreApi;

use super::credentials::{Identity, ProcessedGenericOpts};

/// Env var through which kapp receives a delegated kubeconfig.
pub const KAPP_KUBECONFIG_ENV: &str = "KAPP_KUBECONFIG_YAML";

/// Env var resolving the API server placeholder in synthesized kubeconfigs.
pub const KAPP_SERVICE_HOST_PORT_ENV: &str = "KAPP_KUBERNETES_SERVICE_HOST_PORT";

/// Excludes PodMetrics, which change on every scrape, from inspect output.
pub const INSPECT_FILTER: &str = r#"{"not":{"resource":{"kinds":["PodMetrics"]}}}"#;

/// Key of the metadata document inside the App's ConfigMap.
pub const METADATA_SPEC_KEY: &str = "spec";

/// Settings shared by every [`Kapp`] a factory creates.
#[derive(Debug, Clone)]
pub struct KappSettings {
    pub binary: String,
    pub app_suffix: String,
    pub metadata_dir: PathBuf,
    pub service_host_port: Option<String>,
    pub allowed_flags: Arc<AllowedFlags>,
    pub progress_interval: Duration,
}

impl KappSettings {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            binary: config.kapp_binary.clone(),
            app_suffix: config.app_suffix.clone(),
            metadata_dir: config.metadata_dir.clone(),
            service_host_port: config.service_host_port(),
            allowed_flags: Arc::new(AllowedFlags::kapp()),
            progress_interval: PROGRESS_INTERVAL,
        }
    }
}

/// One App's kapp deploy method, bound to a resolved identity and a
/// cancellation signal.
pub struct Kapp {
    pub(super) settings: Arc<KappSettings>,
    pub(super) opts: AppDeployKapp,
    pub(super) generic: ProcessedGenericOpts,
    pub(super) global_deploy_raw_opts: Vec<String>,
    pub(super) cancel: CancelSignal,
    pub(super) runner: Arc<dyn CmdRunner>,
    pub(super) api: Arc<dyn CoreApi>,
    /// Namespace of the App itself, where kapp keeps its metadata ConfigMap
    pub(super) app_namespace: String,
}

impl Kapp {
    /// Run `kapp deploy` with `manifest` on stdin.
    pub async fn deploy(
        &self,
        manifest: &str,
        started_applying: StartedApplyingFn,
        changed: ChangedFn,
    ) -> CmdRunResult {
        let args = match self.deploy_args() {
            Ok(args) => args,
            Err(e) => return CmdRunResult::with_error(e),
        };
        let cmd = self.command(args, Some(manifest.to_string()));
        self.run_tracked(cmd, "Deploying", started_applying, changed)
            .await
    }

    /// Run `kapp delete`.
    pub async fn delete(&self, started_applying: StartedApplyingFn, changed: ChangedFn) -> CmdRunResult {
        let args = match self.delete_args() {
            Ok(args) => args,
            Err(e) => return CmdRunResult::with_error(e),
        };
        let cmd = self.command(args, None);
        self.run_tracked(cmd, "Deleting", started_applying, changed)
            .await
    }

    /// Run `kapp inspect`; output is returned only once the process ends.
    pub async fn inspect(&self) -> CmdRunResult {
        let args = match self.inspect_args() {
            Ok(args) => args,
            Err(e) => return CmdRunResult::with_error(e),
        };
        let cmd = self.command(args, None);

        let buffer = Arc::new(CmdRunResultBuffer::new());
        let outcome = self
            .runner
            .run_with_cancel(&cmd, Arc::clone(&buffer), self.cancel.clone())
            .await;
        self.finish(&buffer, outcome, "Inspecting")
    }

    /// Metadata document kapp recorded for this App.
    ///
    /// The local file written by a co-located kapp is preferred; otherwise
    /// the ConfigMap kapp maintains in the cluster is read.
    pub async fn internal_app_metadata(&self) -> DeployResult<String> {
        let path = self.metadata_path();
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => return Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(DeployError::Metadata(format!(
                    "reading {}: {}",
                    path.display(),
                    e
                )));
            }
        }

        let name = self.managed_name();
        tracing::debug!(
            path = %path.display(),
            config_map = %name,
            namespace = %self.app_namespace,
            "Metadata file missing, reading ConfigMap"
        );

        let data = self
            .api
            .get_config_map(&self.app_namespace, &name)
            .await
            .map_err(|e| DeployError::Metadata(format!("{:#}", e)))?
            .ok_or_else(|| {
                DeployError::Metadata(format!(
                    "configmap '{}' not found in namespace '{}'",
                    name, self.app_namespace
                ))
            })?;

        data.get(METADATA_SPEC_KEY).cloned().ok_or_else(|| {
            DeployError::Metadata(format!(
                "configmap '{}' has no '{}' key",
                name, METADATA_SPEC_KEY
            ))
        })
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.settings
            .metadata_dir
            .join(format!("metadata-{}", self.generic.name))
    }

    /// Name kapp tracks this App under.
    pub fn managed_name(&self) -> String {
        format!("{}{}", self.generic.name, self.settings.app_suffix)
    }

    /// Name used before the suffix convention; lets kapp migrate old state.
    pub fn old_managed_name(&self) -> String {
        format!("{}-ctrl", self.generic.name)
    }

    pub(crate) fn deploy_args(&self) -> DeployResult<Vec<String>> {
        let mut args = vec![
            "deploy".to_string(),
            "--appMetadataFile".to_string(),
            self.metadata_path().display().to_string(),
            "--prev-app".to_string(),
            self.old_managed_name(),
            "-f".to_string(),
            "-".to_string(),
        ];

        if let Some(ns) = self.opts.into_ns.as_deref().filter(|ns| !ns.is_empty()) {
            args.push("--into-ns".to_string());
            args.push(ns.to_string());
        }
        for mapping in &self.opts.map_ns {
            args.push("--map-ns".to_string());
            args.push(mapping.clone());
        }

        // Controller options go first so an App can override them.
        let allowed = &self.settings.allowed_flags.deploy;
        allowed.append_raw_opts(&mut args, &self.global_deploy_raw_opts)?;
        allowed.append_raw_opts(&mut args, &self.opts.raw_options)?;
        Ok(args)
    }

    pub(crate) fn delete_args(&self) -> DeployResult<Vec<String>> {
        let mut args = vec![
            "delete".to_string(),
            "--prev-app".to_string(),
            self.old_managed_name(),
        ];
        if let Some(delete) = &self.opts.delete {
            self.settings
                .allowed_flags
                .delete
                .append_raw_opts(&mut args, &delete.raw_options)?;
        }
        Ok(args)
    }

    pub(crate) fn inspect_args(&self) -> DeployResult<Vec<String>> {
        let mut args = vec![
            "inspect".to_string(),
            "--tty=true".to_string(),
            "--filter".to_string(),
            INSPECT_FILTER.to_string(),
        ];
        if let Some(inspect) = &self.opts.inspect {
            self.settings
                .allowed_flags
                .inspect
                .append_raw_opts(&mut args, &inspect.raw_options)?;
        }
        Ok(args)
    }

    fn command(&self, mut args: Vec<String>, stdin: Option<String>) -> Cmd {
        args.push("--app".to_string());
        args.push(self.managed_name());

        if !self.generic.namespace.is_empty() {
            args.push("--namespace".to_string());
            args.push(self.generic.namespace.clone());
        }

        let mut env = Vec::new();
        match &self.generic.identity {
            Identity::Kubeconfig(kubeconfig) => {
                env.push((
                    KAPP_KUBECONFIG_ENV.to_string(),
                    kubeconfig.as_yaml().to_string(),
                ));
                // Not read; the env var above takes precedence.
                args.push("--kubeconfig=/dev/null".to_string());
            }
            Identity::AmbientServiceAccount => {}
        }
        if let Some(host_port) = &self.settings.service_host_port {
            env.push((KAPP_SERVICE_HOST_PORT_ENV.to_string(), host_port.clone()));
        }

        args.push("--yes".to_string());

        Cmd {
            program: self.settings.binary.clone(),
            args,
            env,
            stdin,
        }
    }

    async fn run_tracked(
        &self,
        cmd: Cmd,
        op: &'static str,
        started_applying: StartedApplyingFn,
        changed: ChangedFn,
    ) -> CmdRunResult {
        tracing::info!(app = %self.managed_name(), op, "Running kapp");

        let buffer = Arc::new(CmdRunResultBuffer::new());
        let tracker = ProgressTracker::start(
            Arc::clone(&buffer),
            self.settings.progress_interval,
            started_applying,
            changed,
        );

        let outcome = self
            .runner
            .run_with_cancel(&cmd, Arc::clone(&buffer), self.cancel.clone())
            .await;
        tracker.stop();

        self.finish(&buffer, outcome, op)
    }

    fn finish(
        &self,
        buffer: &CmdRunResultBuffer,
        outcome: Result<(), RunError>,
        op: &'static str,
    ) -> CmdRunResult {
        let mut result = buffer.snapshot();
        if let Err(e) = outcome {
            tracing::warn!(app = %self.managed_name(), op, error = %e, "kapp failed");
            result.attach_error(DeployError::Exec {
                op,
                message: e.to_string(),
            });
        }
        result
    }
}
