//! Cross-cluster identity through a kubeconfig stored in a Secret.

use std::sync::Arc;

use crate::app::{AppCluster, AppClusterKubeconfigSecretRef};
use crate::error::{DeployError, DeployResult};
use crate::kube::CoreApi;

use super::credentials::{GenericOpts, Identity, ProcessedGenericOpts};
use super::kubeconfig::Kubeconfig;

/// Secret key read when the reference does not name one.
pub const DEFAULT_KUBECONFIG_SECRET_KEY: &str = "value";

pub struct KubeconfigSecrets {
    api: Arc<dyn CoreApi>,
}

impl KubeconfigSecrets {
    pub fn new(api: Arc<dyn CoreApi>) -> Self {
        Self { api }
    }

    pub async fn find(
        &self,
        generic: &GenericOpts,
        cluster: &AppCluster,
    ) -> DeployResult<ProcessedGenericOpts> {
        let secret_ref = cluster
            .kubeconfig_secret_ref
            .as_ref()
            .ok_or(DeployError::MissingKubeconfigSecretRef)?;

        let kubeconfig_yaml = self
            .fetch_kubeconfig_yaml(&generic.namespace, secret_ref)
            .await?;
        let kubeconfig = Kubeconfig::restricted(&kubeconfig_yaml)?;

        Ok(ProcessedGenericOpts {
            name: generic.name.clone(),
            namespace: cluster.namespace.clone().unwrap_or_default(),
            identity: Identity::Kubeconfig(kubeconfig),
        })
    }

    /// # Panics
    ///
    /// Panics if `ns_name` or the secret name is empty.
    async fn fetch_kubeconfig_yaml(
        &self,
        ns_name: &str,
        secret_ref: &AppClusterKubeconfigSecretRef,
    ) -> DeployResult<String> {
        assert!(
            !ns_name.is_empty(),
            "Internal inconsistency: Expected namespace name to not be empty"
        );
        assert!(
            !secret_ref.name.is_empty(),
            "Internal inconsistency: Expected secret name to not be empty"
        );

        let data = self
            .api
            .get_secret(ns_name, &secret_ref.name)
            .await
            .map_err(|e| DeployError::KubeconfigSecret(format!("{:#}", e)))?
            .ok_or_else(|| {
                DeployError::KubeconfigSecret(format!(
                    "secret '{}' not found in namespace '{}'",
                    secret_ref.name, ns_name
                ))
            })?;

        let key = secret_ref
            .key
            .as_deref()
            .filter(|k| !k.is_empty())
            .unwrap_or(DEFAULT_KUBECONFIG_SECRET_KEY);

        let value = data
            .get(key)
            .ok_or_else(|| DeployError::KubeconfigSecretKey {
                key: key.to_string(),
                secret: secret_ref.name.clone(),
            })?;

        String::from_utf8(value.clone()).map_err(|e| DeployError::Kubeconfig(e.to_string()))
    }
}
