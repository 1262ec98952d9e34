//! Resolving which identity the apply tool runs as.

use std::path::PathBuf;
use std::sync::Arc;

use crate::app::AppCluster;
use crate::error::{DeployError, DeployResult};
use crate::kube::CoreApi;

use super::kubeconfig::Kubeconfig;
use super::kubeconfig_secrets::KubeconfigSecrets;
use super::service_accounts::ServiceAccounts;

/// Identity inputs taken from the App.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenericOpts {
    pub name: String,
    pub namespace: String,
}

/// How the apply tool authenticates. Exactly one applies per invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    /// Delegated identity passed to the tool as an embedded kubeconfig
    Kubeconfig(Kubeconfig),
    /// Run with the controller's own in-cluster permissions
    AmbientServiceAccount,
}

/// Resolved identity for one invocation of the apply tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedGenericOpts {
    pub name: String,
    /// Empty when the kubeconfig already carries the preferred namespace
    pub namespace: String,
    pub identity: Identity,
}

impl ProcessedGenericOpts {
    /// Identity for controller-owned resources that run with ambient permissions.
    pub fn ambient(generic: &GenericOpts) -> Self {
        Self {
            name: generic.name.clone(),
            namespace: generic.namespace.clone(),
            identity: Identity::AmbientServiceAccount,
        }
    }
}

/// Turns an App's service account or cluster reference into an identity.
pub struct CredentialResolver {
    service_accounts: ServiceAccounts,
    kubeconfig_secrets: KubeconfigSecrets,
}

impl CredentialResolver {
    pub fn new(api: Arc<dyn CoreApi>, ca_cert_path: PathBuf) -> Self {
        Self {
            service_accounts: ServiceAccounts::new(Arc::clone(&api), ca_cert_path),
            kubeconfig_secrets: KubeconfigSecrets::new(api),
        }
    }

    /// A service account name takes precedence over a cluster reference.
    pub async fn resolve(
        &self,
        sa_name: &str,
        cluster: Option<&AppCluster>,
        generic: &GenericOpts,
    ) -> DeployResult<ProcessedGenericOpts> {
        if !sa_name.is_empty() {
            return self.service_accounts.find(generic, sa_name).await;
        }
        if let Some(cluster) = cluster {
            return self.kubeconfig_secrets.find(generic, cluster).await;
        }
        Err(DeployError::NoCredentialSelector)
    }
}
