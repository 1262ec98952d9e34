//! Controller options published in the cluster.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;

use crate::kube::CoreApi;

/// Name of both the Secret and the ConfigMap holding controller options.
pub const CLUSTER_CONFIG_NAME: &str = "kapp-controller-config";

const DEPLOY_RAW_OPTIONS_KEY: &str = "kappDeployRawOptions";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterConfig {
    pub kapp_deploy_raw_options: Vec<String>,
}

impl ClusterConfig {
    fn from_data(data: &BTreeMap<String, String>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = data.get(DEPLOY_RAW_OPTIONS_KEY).filter(|v| !v.is_empty()) {
            // Allow-lists are enforced later, when the options are used.
            config.kapp_deploy_raw_options = serde_json::from_str(raw)
                .with_context(|| format!("Unmarshaling {} as JSON", DEPLOY_RAW_OPTIONS_KEY))?;
        }
        Ok(config)
    }
}

/// Reads [`ClusterConfig`], preferring the Secret over the ConfigMap.
pub struct ClusterConfigSource {
    api: Arc<dyn CoreApi>,
}

impl ClusterConfigSource {
    pub fn new(api: Arc<dyn CoreApi>) -> Self {
        Self { api }
    }

    /// `Ok(None)` when neither object exists.
    pub async fn fetch(&self, namespace: &str) -> anyhow::Result<Option<ClusterConfig>> {
        if let Some(secret) = self
            .api
            .get_secret(namespace, CLUSTER_CONFIG_NAME)
            .await
            .context("Getting controller config secret")?
        {
            let data = secret
                .into_iter()
                .map(|(k, v)| (k, String::from_utf8_lossy(&v).into_owned()))
                .collect();
            return ClusterConfig::from_data(&data).map(Some);
        }

        if let Some(data) = self
            .api
            .get_config_map(namespace, CLUSTER_CONFIG_NAME)
            .await
            .context("Getting controller config map")?
        {
            return ClusterConfig::from_data(&data).map(Some);
        }

        Ok(None)
    }
}
