//! kdeploy Core Library
//!
//! Deploy stage of an App-lifecycle controller: resolves the identity an
//! App deploys as, drives the `kapp` CLI under a flag allow-list and reports
//! live progress while it runs.

pub mod app;
pub mod config;
pub mod deploy;
pub mod error;
pub mod exec;
pub mod kube;
pub mod orchestration;

/// Re-exports of commonly used types
pub mod prelude {
    // App model
    pub use crate::app::{App, AppCluster, AppDeploy, AppDeployKapp, AppMeta, AppSpec};

    // Configuration
    pub use crate::config::{ClusterConfig, ClusterConfigSource, ConfigStore, ControllerConfig};

    // Deploy engine
    pub use crate::deploy::{DeployFactory, GenericOpts, Identity, Kapp, Kubeconfig};

    // Process execution
    pub use crate::exec::{
        AllowedFlags, CancelHandle, CancelSignal, ChangedFn, CmdRunResult, CmdRunner,
        ProcessRunner, StartedApplyingFn, cancel_channel,
    };

    // Cluster access
    pub use crate::kube::{CoreApi, KubeCoreApi};

    // Orchestration
    pub use crate::orchestration::{AppHost, AppOrchestrator, CancelCondition};

    // Errors
    pub use crate::error::{DeployError, DeployResult};
}
