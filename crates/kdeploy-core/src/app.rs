//! App resource model consumed by the deploy engine.
//!
//! Only the fields the deploy stage reads are modelled; fetch and template
//! sections of the resource are ignored on deserialization.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declarative App resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct App {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: AppSpec,
}

/// Subset of Kubernetes object metadata used for identity and lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSpec {
    /// Service account used to deploy into the App's own cluster
    #[serde(default)]
    pub service_account_name: String,

    /// Destination cluster for cross-cluster deploys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<AppCluster>,

    #[serde(default)]
    pub deploy: Vec<AppDeploy>,

    /// Requests cancellation of any in-flight operation
    #[serde(default)]
    pub canceled: bool,

    /// Skip the external tool on delete (bookkeeping-only cleanup)
    #[serde(default)]
    pub noop_delete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppCluster {
    /// Namespace to deploy into on the destination cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig_secret_ref: Option<AppClusterKubeconfigSecretRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppClusterKubeconfigSecretRef {
    pub name: String,
    /// Key inside the secret; defaults to `value`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// A deploy method. New methods are added as variants so every dispatch
/// site has to handle them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAppDeploy", into = "RawAppDeploy")]
pub enum AppDeploy {
    Kapp(AppDeployKapp),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDeployKapp {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub into_ns: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub map_ns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw_options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspect: Option<AppDeployKappInspect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<AppDeployKappDelete>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDeployKappInspect {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw_options: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDeployKappDelete {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw_options: Vec<String>,
}

/// Wire shape of a deploy entry: a map with exactly one populated method key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawAppDeploy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kapp: Option<AppDeployKapp>,
    #[serde(flatten)]
    other: BTreeMap<String, serde_json::Value>,
}

impl TryFrom<RawAppDeploy> for AppDeploy {
    type Error = String;

    fn try_from(raw: RawAppDeploy) -> Result<Self, Self::Error> {
        if let Some(name) = raw.other.keys().next() {
            return Err(format!("unsupported deploy method '{}'", name));
        }
        match raw.kapp {
            Some(kapp) => Ok(AppDeploy::Kapp(kapp)),
            None => Err("deploy entry must specify a deploy method".to_string()),
        }
    }
}

impl From<AppDeploy> for RawAppDeploy {
    fn from(deploy: AppDeploy) -> Self {
        match deploy {
            AppDeploy::Kapp(kapp) => RawAppDeploy {
                kapp: Some(kapp),
                other: BTreeMap::new(),
            },
        }
    }
}

impl App {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn is_canceled(&self) -> bool {
        self.spec.canceled
    }

    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

/// Metadata the apply tool records about an App it manages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppMeta {
    #[serde(default)]
    pub label_key: String,
    #[serde(default)]
    pub label_value: String,
    #[serde(default)]
    pub last_change: AppMetaLastChange,
    #[serde(default, rename = "usedGKs")]
    pub used_gks: Vec<GroupKind>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppMetaLastChange {
    #[serde(default)]
    pub namespaces: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupKind {
    #[serde(default, rename = "Group")]
    pub group: String,
    #[serde(default, rename = "Kind")]
    pub kind: String,
}
