//! Delegated identity through a service account in the App's namespace.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::error::{DeployError, DeployResult};
use crate::kube::CoreApi;

use super::credentials::{GenericOpts, Identity, ProcessedGenericOpts};
use super::kubeconfig::Kubeconfig;

/// Lifetime requested for every minted token.
pub const TOKEN_EXPIRATION_SECONDS: i64 = 2 * 60 * 60;

/// CA bundle mounted into every pod.
pub const DEFAULT_CA_CERT_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

pub struct ServiceAccounts {
    api: Arc<dyn CoreApi>,
    ca_cert_path: PathBuf,
    // Read once and kept for the lifetime of the resolver.
    ca_cert: OnceCell<Vec<u8>>,
}

impl ServiceAccounts {
    pub fn new(api: Arc<dyn CoreApi>, ca_cert_path: PathBuf) -> Self {
        Self {
            api,
            ca_cert_path,
            ca_cert: OnceCell::new(),
        }
    }

    pub fn ca_cert_path(&self) -> &Path {
        &self.ca_cert_path
    }

    pub async fn find(
        &self,
        generic: &GenericOpts,
        sa_name: &str,
    ) -> DeployResult<ProcessedGenericOpts> {
        let kubeconfig = self.fetch_service_account(&generic.namespace, sa_name).await?;

        Ok(ProcessedGenericOpts {
            name: generic.name.clone(),
            // Kubeconfig carries the preferred namespace of the service account
            namespace: String::new(),
            identity: Identity::Kubeconfig(kubeconfig),
        })
    }

    /// # Panics
    ///
    /// Panics if `ns_name` or `sa_name` is empty; callers check both first.
    async fn fetch_service_account(&self, ns_name: &str, sa_name: &str) -> DeployResult<Kubeconfig> {
        assert!(
            !ns_name.is_empty(),
            "Internal inconsistency: Expected namespace name to not be empty"
        );
        assert!(
            !sa_name.is_empty(),
            "Internal inconsistency: Expected service account name to not be empty"
        );

        let sa = self
            .api
            .get_service_account(ns_name, sa_name)
            .await
            .map_err(|e| DeployError::ServiceAccountLookup(format!("{:#}", e)))?;

        // Never cached: every resolution mints a fresh token.
        let token = self
            .api
            .create_token(&sa, TOKEN_EXPIRATION_SECONDS)
            .await
            .map_err(|e| DeployError::TokenRequest(format!("{:#}", e)))?;

        tracing::debug!(
            namespace = ns_name,
            service_account = sa_name,
            expiration_seconds = TOKEN_EXPIRATION_SECONDS,
            "Minted service account token"
        );

        let ca_cert = self.ca_cert().await?;
        Kubeconfig::for_service_account(&token, ns_name, ca_cert)
    }

    async fn ca_cert(&self) -> DeployResult<&[u8]> {
        let path = &self.ca_cert_path;
        let cert = self
            .ca_cert
            .get_or_try_init(|| async move {
                tokio::fs::read(path).await.map_err(|e| DeployError::CaCert {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })
            })
            .await?;
        Ok(cert.as_slice())
    }
}
