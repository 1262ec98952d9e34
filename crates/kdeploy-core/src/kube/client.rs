//! [`CoreApi`] over a `kube` client.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use k8s_openapi::api::authentication::v1::{TokenRequest, TokenRequestSpec};
use k8s_openapi::api::core::v1::{ConfigMap, Secret, ServiceAccount};
use kube::api::{Api, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use super::{CoreApi, ServiceAccountRef};

/// Default timeout for Kubernetes API requests.
const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Core API backed by a `kube` client.
#[derive(Clone)]
pub struct KubeCoreApi {
    client: Client,
}

impl std::fmt::Debug for KubeCoreApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCoreApi").finish_non_exhaustive()
    }
}

impl KubeCoreApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// The pod's service account when running in a cluster, else the local
    /// kubeconfig.
    pub async fn infer() -> anyhow::Result<Self> {
        let config = Config::infer()
            .await
            .context("Failed to infer Kubernetes configuration")?;
        Self::from_config(config)
    }

    /// Connect through an explicit kubeconfig file.
    pub async fn from_kubeconfig(path: &Path, context: Option<String>) -> anyhow::Result<Self> {
        let kubeconfig = Kubeconfig::read_from(path)
            .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
        let config = Config::from_custom_kubeconfig(
            kubeconfig,
            &KubeConfigOptions {
                context,
                ..Default::default()
            },
        )
        .await
        .with_context(|| format!("Failed to load kubeconfig {}", path.display()))?;
        Self::from_config(config)
    }

    fn from_config(mut config: Config) -> anyhow::Result<Self> {
        config.read_timeout = Some(DEFAULT_API_TIMEOUT);
        let client = Client::try_from(config).context("Failed to create Kubernetes client")?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl CoreApi for KubeCoreApi {
    async fn get_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<ServiceAccountRef> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        let sa = api
            .get(name)
            .await
            .with_context(|| format!("serviceaccount {}/{}", namespace, name))?;
        Ok(service_account_ref(&sa, namespace, name))
    }

    async fn create_token(
        &self,
        sa: &ServiceAccountRef,
        expiration_seconds: i64,
    ) -> anyhow::Result<String> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), &sa.namespace);
        let response = api
            .create_token_request(
                &sa.name,
                &PostParams::default(),
                &token_request(expiration_seconds),
            )
            .await
            .with_context(|| format!("token for serviceaccount {}/{}", sa.namespace, sa.name))?;

        response
            .status
            .map(|status| status.token)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "token request for serviceaccount {}/{} returned no token",
                    sa.namespace,
                    sa.name
                )
            })
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<Option<BTreeMap<String, String>>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let config_map = api
            .get_opt(name)
            .await
            .with_context(|| format!("configmap {}/{}", namespace, name))?;
        Ok(config_map.map(|cm| cm.data.unwrap_or_default()))
    }

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<Option<BTreeMap<String, Vec<u8>>>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api
            .get_opt(name)
            .await
            .with_context(|| format!("secret {}/{}", namespace, name))?;
        Ok(secret.map(secret_data))
    }
}

fn service_account_ref(sa: &ServiceAccount, namespace: &str, name: &str) -> ServiceAccountRef {
    ServiceAccountRef {
        name: sa.metadata.name.clone().unwrap_or_else(|| name.to_string()),
        namespace: sa
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| namespace.to_string()),
        uid: sa.metadata.uid.clone().unwrap_or_default(),
    }
}

fn token_request(expiration_seconds: i64) -> TokenRequest {
    TokenRequest {
        spec: TokenRequestSpec {
            expiration_seconds: Some(expiration_seconds),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn secret_data(secret: Secret) -> BTreeMap<String, Vec<u8>> {
    secret
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| (key, value.0))
        .collect()
}
