//! Kubeconfig documents handed to the apply tool.
//!
//! Every kubeconfig passed to the tool goes through [`Kubeconfig::restricted`]
//! or is synthesized here. Only inline credentials survive: exec plugins, auth
//! providers and file references are dropped, so a tenant-provided
//! kubeconfig can neither run commands nor read files inside the controller.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::{DeployError, DeployResult};

/// API server placeholder; resolved by the apply tool from its environment.
pub const SERVICE_HOST_PLACEHOLDER: &str = "https://${KAPP_KUBERNETES_SERVICE_HOST_PORT}";

const CLUSTER_NAME: &str = "dst-cluster";
const USER_NAME: &str = "dst-user";
const CONTEXT_NAME: &str = "dst-ctx";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct KubeconfigDoc {
    #[serde(rename = "apiVersion", default = "default_api_version")]
    api_version: String,
    #[serde(default = "default_kind")]
    kind: String,
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    users: Vec<NamedUser>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(rename = "current-context", default)]
    current_context: String,
}

fn default_api_version() -> String {
    "v1".to_string()
}

fn default_kind() -> String {
    "Config".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct NamedCluster {
    name: String,
    #[serde(default)]
    cluster: ClusterEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ClusterEntry {
    #[serde(default)]
    server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    certificate_authority_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tls_server_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    insecure_skip_tls_verify: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    proxy_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: UserEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct UserEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_certificate_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_key_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    impersonate: Option<String>,
    #[serde(rename = "as-groups", default, skip_serializing_if = "Vec::is_empty")]
    impersonate_groups: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct NamedContext {
    name: String,
    #[serde(default)]
    context: ContextEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ContextEntry {
    #[serde(default)]
    cluster: String,
    #[serde(default)]
    user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
}

/// A restricted kubeconfig and its serialized form.
#[derive(Clone, PartialEq)]
pub struct Kubeconfig {
    doc: KubeconfigDoc,
    yaml: String,
}

impl Kubeconfig {
    /// Parse `input` and keep only inline, non-executable credentials.
    pub fn restricted(input: &str) -> DeployResult<Self> {
        let doc: KubeconfigDoc = serde_yaml_ng::from_str(input)
            .map_err(|e| DeployError::Kubeconfig(e.to_string()))?;
        Self::from_doc(doc)
    }

    /// Single-cluster, single-user kubeconfig for a service-account token.
    pub fn for_service_account(token: &str, namespace: &str, ca_cert: &[u8]) -> DeployResult<Self> {
        let doc = KubeconfigDoc {
            api_version: default_api_version(),
            kind: default_kind(),
            clusters: vec![NamedCluster {
                name: CLUSTER_NAME.to_string(),
                cluster: ClusterEntry {
                    server: SERVICE_HOST_PLACEHOLDER.to_string(),
                    certificate_authority_data: Some(STANDARD.encode(ca_cert)),
                    ..ClusterEntry::default()
                },
            }],
            users: vec![NamedUser {
                name: USER_NAME.to_string(),
                user: UserEntry {
                    token: Some(token.to_string()),
                    ..UserEntry::default()
                },
            }],
            contexts: vec![NamedContext {
                name: CONTEXT_NAME.to_string(),
                context: ContextEntry {
                    cluster: CLUSTER_NAME.to_string(),
                    user: USER_NAME.to_string(),
                    namespace: Some(namespace.to_string()),
                },
            }],
            current_context: CONTEXT_NAME.to_string(),
        };
        Self::from_doc(doc)
    }

    fn from_doc(doc: KubeconfigDoc) -> DeployResult<Self> {
        let yaml =
            serde_yaml_ng::to_string(&doc).map_err(|e| DeployError::Kubeconfig(e.to_string()))?;
        Ok(Self { doc, yaml })
    }

    pub fn as_yaml(&self) -> &str {
        &self.yaml
    }

    /// Bearer token of the current context's user.
    pub fn token(&self) -> Option<&str> {
        self.current_user()?.token.as_deref()
    }

    /// Namespace of the current context.
    pub fn namespace(&self) -> Option<&str> {
        self.current_context()?.namespace.as_deref()
    }

    /// Decoded CA bundle of the current context's cluster.
    pub fn ca_data(&self) -> Option<Vec<u8>> {
        let context = self.current_context()?;
        let cluster = self
            .doc
            .clusters
            .iter()
            .find(|c| c.name == context.cluster)?;
        let encoded = cluster.cluster.certificate_authority_data.as_deref()?;
        STANDARD.decode(encoded).ok()
    }

    pub fn server(&self) -> Option<&str> {
        let context = self.current_context()?;
        self.doc
            .clusters
            .iter()
            .find(|c| c.name == context.cluster)
            .map(|c| c.cluster.server.as_str())
    }

    fn current_context(&self) -> Option<&ContextEntry> {
        self.doc
            .contexts
            .iter()
            .find(|c| c.name == self.doc.current_context)
            .map(|c| &c.context)
    }

    fn current_user(&self) -> Option<&UserEntry> {
        let context = self.current_context()?;
        self.doc
            .users
            .iter()
            .find(|u| u.name == context.user)
            .map(|u| &u.user)
    }
}

impl fmt::Debug for Kubeconfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kubeconfig")
            .field("current_context", &self.doc.current_context)
            .field("server", &self.server())
            .field("namespace", &self.namespace())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CA_PEM: &[u8] = b"-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";

    #[test]
    fn service_account_kubeconfig_round_trips() {
        let built = Kubeconfig::for_service_account("tok.en.value", "app-ns", CA_PEM).unwrap();
        let parsed = Kubeconfig::restricted(built.as_yaml()).unwrap();

        assert_eq!(parsed.token(), Some("tok.en.value"));
        assert_eq!(parsed.namespace(), Some("app-ns"));
        assert_eq!(parsed.ca_data().as_deref(), Some(CA_PEM));
        assert_eq!(parsed.server(), Some(SERVICE_HOST_PLACEHOLDER));
    }

    #[test]
    fn service_account_kubeconfig_has_single_context() {
        let built = Kubeconfig::for_service_account("t", "ns", CA_PEM).unwrap();
        let yaml = built.as_yaml();

        assert!(yaml.contains("current-context: dst-ctx"));
        assert!(yaml.contains("name: dst-cluster"));
        assert!(yaml.contains("name: dst-user"));
        assert!(yaml.contains("certificate-authority-data:"));
    }

    #[test]
    fn restricted_drops_exec_and_file_references() {
        let input = r#"
apiVersion: v1
kind: Config
clusters:
- name: remote
  cluster:
    server: https://remote.example.com:6443
    certificate-authority: /etc/kubernetes/pki/ca.crt
    insecure-skip-tls-verify: true
users:
- name: admin
  user:
    tokenFile: /var/run/secrets/kubernetes.io/serviceaccount/token
    client-key: /etc/kubernetes/pki/admin.key
    exec:
      apiVersion: client.authentication.k8s.io/v1
      command: /bin/sh
      args: ["-c", "cat /etc/shadow"]
    auth-provider:
      name: gcp
    token: remote-token
contexts:
- name: remote-ctx
  context:
    cluster: remote
    user: admin
    namespace: prod
current-context: remote-ctx
"#;
        let kubeconfig = Kubeconfig::restricted(input).unwrap();
        let yaml = kubeconfig.as_yaml();

        assert!(!yaml.contains("exec"));
        assert!(!yaml.contains("/bin/sh"));
        assert!(!yaml.contains("auth-provider"));
        assert!(!yaml.contains("tokenFile"));
        assert!(!yaml.contains("client-key:"));
        assert!(!yaml.contains("certificate-authority:"));

        assert_eq!(kubeconfig.token(), Some("remote-token"));
        assert_eq!(kubeconfig.namespace(), Some("prod"));
        assert_eq!(kubeconfig.server(), Some("https://remote.example.com:6443"));
        assert!(yaml.contains("insecure-skip-tls-verify: true"));
    }

    #[test]
    fn restricted_rejects_garbage() {
        assert!(matches!(
            Kubeconfig::restricted("clusters: 12"),
            Err(DeployError::Kubeconfig(_))
        ));
    }

    #[test]
    fn debug_output_redacts_token() {
        let built = Kubeconfig::for_service_account("super-secret", "ns", CA_PEM).unwrap();
        let debug = format!("{:?}", built);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("dst-ctx"));
    }
}
