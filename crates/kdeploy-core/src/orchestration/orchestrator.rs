use std::sync::Arc;
use std::time::Duration;

use crate::app::{App, AppDeploy, AppDeployKapp, AppMeta};
use crate::deploy::{DeployFactory, GenericOpts, Kapp};
use crate::error::{DeployError, DeployResult};
use crate::exec::{ChangedFn, CmdRunResult, StartedApplyingFn};

use super::AppHost;
use super::cancel_watch::{CancelCondition, CancelWatch};

const ON_CANCELED_OR_DELETED: &[CancelCondition] =
    &[CancelCondition::Canceled, CancelCondition::Deleted];
const ON_CANCELED: &[CancelCondition] = &[CancelCondition::Canceled];

/// Runs an App's deploy method for one reconciliation pass.
pub struct AppOrchestrator {
    factory: DeployFactory,
    host: Arc<dyn AppHost>,
    cancel_poll_interval: Duration,
}

impl AppOrchestrator {
    pub fn new(factory: DeployFactory, host: Arc<dyn AppHost>) -> Self {
        Self {
            factory,
            host,
            cancel_poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_cancel_poll_interval(mut self, interval: Duration) -> Self {
        self.cancel_poll_interval = interval;
        self
    }

    /// Deploy `manifest` with the App's deploy method.
    pub async fn deploy(&self, app: &App, manifest: &str, changed: ChangedFn) -> CmdRunResult {
        if let Err(e) = self.host.block_deletion().await {
            return CmdRunResult::with_error(DeployError::BlockDeletion(format!("{:#}", e)));
        }

        if let Err(e) = require_single_method(app) {
            return CmdRunResult::with_error(e);
        }

        let mut result = CmdRunResult::default();
        for method in &app.spec.deploy {
            match method {
                AppDeploy::Kapp(opts) => {
                    let watch = self.watch(ON_CANCELED_OR_DELETED);
                    let kapp = match self.new_kapp(app, opts, &watch).await {
                        Ok(kapp) => kapp,
                        Err(e) => return CmdRunResult::with_error(e),
                    };
                    result = kapp
                        .deploy(manifest, self.started_applying(), Arc::clone(&changed))
                        .await;
                }
            }

            if result.error.is_some() {
                break;
            }
        }
        result
    }

    /// Delete everything the App's deploy method manages.
    ///
    /// With `noopDelete` the tool is not run; only the deletion guard is
    /// released.
    pub async fn delete(&self, app: &App, changed: ChangedFn) -> CmdRunResult {
        if let Err(e) = require_single_method(app) {
            return CmdRunResult::with_error(e);
        }

        let mut result = CmdRunResult::default();
        if app.spec.noop_delete {
            tracing::info!(app = %app.name(), "Skipping delete for noop-delete app");
        } else {
            for method in &app.spec.deploy {
                match method {
                    AppDeploy::Kapp(opts) => {
                        // An App being deleted must not cancel its own delete.
                        let watch = self.watch(ON_CANCELED);
                        let kapp = match self.new_kapp(app, opts, &watch).await {
                            Ok(kapp) => kapp,
                            Err(e) => return CmdRunResult::with_error(e),
                        };
                        result = kapp
                            .delete(self.started_applying(), Arc::clone(&changed))
                            .await;
                    }
                }

                if result.error.is_some() {
                    break;
                }
            }
        }

        if result.error.is_none() {
            if let Err(e) = self.host.unblock_deletion().await {
                return CmdRunResult::with_error(DeployError::UnblockDeletion(format!("{:#}", e)));
            }
        }
        result
    }

    /// Inspect the App's resources. Empty when inspection is not configured.
    pub async fn inspect(&self, app: &App) -> CmdRunResult {
        if let Err(e) = require_single_method(app) {
            return CmdRunResult::with_error(e);
        }

        let mut result = CmdRunResult::default();
        for method in &app.spec.deploy {
            match method {
                AppDeploy::Kapp(opts) => {
                    if opts.inspect.is_some() {
                        let watch = self.watch(ON_CANCELED_OR_DELETED);
                        let kapp = match self.new_kapp(app, opts, &watch).await {
                            Ok(kapp) => kapp,
                            Err(e) => return CmdRunResult::with_error(e),
                        };
                        result = kapp.inspect().await;
                    }
                }
            }

            if result.error.is_some() {
                break;
            }
        }
        result
    }

    /// Metadata the deploy method recorded for the App.
    pub async fn metadata(&self, app: &App) -> DeployResult<AppMeta> {
        let method = app
            .spec
            .deploy
            .first()
            .ok_or(DeployError::Unsupported("get metadata"))?;

        match method {
            AppDeploy::Kapp(opts) => {
                let watch = self.watch(ON_CANCELED_OR_DELETED);
                let generic = generic_opts(app);
                let kapp = self
                    .factory
                    .new_kapp(
                        opts,
                        &app.spec.service_account_name,
                        app.spec.cluster.as_ref(),
                        &generic,
                        watch.signal(),
                    )
                    .await?;

                let document = kapp.internal_app_metadata().await?;
                serde_yaml_ng::from_str(&document)
                    .map_err(|e| DeployError::Metadata(format!("parsing document: {}", e)))
            }
        }
    }

    async fn new_kapp(
        &self,
        app: &App,
        opts: &AppDeployKapp,
        watch: &CancelWatch,
    ) -> DeployResult<Kapp> {
        let generic = generic_opts(app);
        self.factory
            .new_kapp(
                opts,
                &app.spec.service_account_name,
                app.spec.cluster.as_ref(),
                &generic,
                watch.signal(),
            )
            .await
            .map_err(|e| DeployError::Preparing(Box::new(e)))
    }

    fn watch(&self, conditions: &'static [CancelCondition]) -> CancelWatch {
        CancelWatch::spawn(Arc::clone(&self.host), conditions, self.cancel_poll_interval)
    }

    fn started_applying(&self) -> StartedApplyingFn {
        let host = Arc::clone(&self.host);
        Arc::new(move || host.started_applying())
    }
}

fn require_single_method(app: &App) -> DeployResult<()> {
    if app.spec.deploy.len() != 1 {
        return Err(DeployError::DeployOptionCount);
    }
    Ok(())
}

fn generic_opts(app: &App) -> GenericOpts {
    GenericOpts {
        name: app.name().to_string(),
        namespace: app.namespace().to_string(),
    }
}
