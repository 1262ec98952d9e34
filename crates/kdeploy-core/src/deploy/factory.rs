//! Builds deploy engines bound to an App's identity.

use std::sync::Arc;
use std::time::Duration;

use crate::app::{AppCluster, AppDeployKapp};
use crate::config::ControllerConfig;
use crate::error::DeployResult;
use crate::exec::{AllowedFlags, CancelSignal, CmdRunner};
use crate::kube::CoreApi;

use super::credentials::{CredentialResolver, GenericOpts, ProcessedGenericOpts};
use super::kapp::{Kapp, KappSettings};

pub struct DeployFactory {
    settings: Arc<KappSettings>,
    global_deploy_raw_opts: Vec<String>,
    resolver: CredentialResolver,
    runner: Arc<dyn CmdRunner>,
    api: Arc<dyn CoreApi>,
}

impl DeployFactory {
    pub fn new(config: &ControllerConfig, api: Arc<dyn CoreApi>, runner: Arc<dyn CmdRunner>) -> Self {
        Self {
            settings: Arc::new(KappSettings::from_config(config)),
            global_deploy_raw_opts: config.deploy_raw_options(),
            resolver: CredentialResolver::new(Arc::clone(&api), config.ca_cert_path.clone()),
            runner,
            api,
        }
    }

    /// Replace the default kapp allow-lists.
    pub fn with_allowed_flags(mut self, allowed_flags: AllowedFlags) -> Self {
        Arc::make_mut(&mut self.settings).allowed_flags = Arc::new(allowed_flags);
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        Arc::make_mut(&mut self.settings).progress_interval = interval;
        self
    }

    pub fn settings(&self) -> &KappSettings {
        &self.settings
    }

    /// Engine running as the App's service account or destination cluster.
    pub async fn new_kapp(
        &self,
        opts: &AppDeployKapp,
        sa_name: &str,
        cluster: Option<&AppCluster>,
        generic: &GenericOpts,
        cancel: CancelSignal,
    ) -> DeployResult<Kapp> {
        let processed = self.resolver.resolve(sa_name, cluster, generic).await?;
        Ok(self.build(opts, processed, generic, cancel))
    }

    /// Engine running with the controller's own permissions, for resources
    /// the controller owns itself.
    pub fn new_kapp_privileged(
        &self,
        opts: &AppDeployKapp,
        generic: &GenericOpts,
        cancel: CancelSignal,
    ) -> Kapp {
        self.build(opts, ProcessedGenericOpts::ambient(generic), generic, cancel)
    }

    fn build(
        &self,
        opts: &AppDeployKapp,
        processed: ProcessedGenericOpts,
        generic: &GenericOpts,
        cancel: CancelSignal,
    ) -> Kapp {
        Kapp {
            settings: Arc::clone(&self.settings),
            opts: opts.clone(),
            generic: processed,
            global_deploy_raw_opts: self.global_deploy_raw_opts.clone(),
            cancel,
            runner: Arc::clone(&self.runner),
            api: Arc::clone(&self.api),
            app_namespace: generic.namespace.clone(),
        }
    }
}
