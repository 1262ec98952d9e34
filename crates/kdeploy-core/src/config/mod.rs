//! Controller configuration.
//!
//! Settings come from a TOML file (see [`ConfigStore`]) and may be overlaid
//! with options published in the cluster (see [`ClusterConfigSource`]).

mod cluster;
mod store;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::deploy::service_accounts::DEFAULT_CA_CERT_PATH;

pub use cluster::{CLUSTER_CONFIG_NAME, ClusterConfig, ClusterConfigSource};
pub use store::ConfigStore;

/// Keeps the number of change records kapp stores per App low; larger
/// numbers of ConfigMaps slow down other controllers on the cluster.
pub const DEFAULT_DEPLOY_RAW_OPTION: &str = "--app-changes-max-to-keep=5";

/// Root configuration structure for config.toml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Apply tool executable
    pub kapp_binary: String,

    /// Suffix appended to the App name to form the apply tool's app name
    pub app_suffix: String,

    /// Directory where the apply tool writes per-App metadata files
    pub metadata_dir: PathBuf,

    /// CA bundle embedded into service-account kubeconfigs
    pub ca_cert_path: PathBuf,

    /// Raw options applied to every deploy, before App raw options
    pub kapp_deploy_raw_options: Vec<String>,

    /// How often App state is checked for cancellation
    pub cancel_poll_interval_secs: u64,

    /// API server `host:port` exported to the apply tool
    pub kubernetes_service_host_port: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            kapp_binary: "kapp".to_string(),
            app_suffix: ".app".to_string(),
            metadata_dir: PathBuf::from("/etc/kappctrl-mem-tmp"),
            ca_cert_path: PathBuf::from(DEFAULT_CA_CERT_PATH),
            kapp_deploy_raw_options: Vec::new(),
            cancel_poll_interval_secs: 1,
            kubernetes_service_host_port: None,
        }
    }
}

impl ControllerConfig {
    /// Controller-wide deploy options, default first so configured values win.
    pub fn deploy_raw_options(&self) -> Vec<String> {
        std::iter::once(DEFAULT_DEPLOY_RAW_OPTION.to_string())
            .chain(self.kapp_deploy_raw_options.iter().cloned())
            .collect()
    }

    pub fn cancel_poll_interval(&self) -> Duration {
        Duration::from_secs(self.cancel_poll_interval_secs.max(1))
    }

    /// Configured value, else derived from the in-cluster service env vars.
    pub fn service_host_port(&self) -> Option<String> {
        if let Some(value) = &self.kubernetes_service_host_port {
            return Some(value.clone());
        }
        let host = std::env::var("KUBERNETES_SERVICE_HOST").ok()?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());
        Some(join_host_port(&host, &port))
    }

    /// Overlay settings published in the cluster.
    pub fn apply_cluster_config(&mut self, cluster: ClusterConfig) {
        if !cluster.kapp_deploy_raw_options.is_empty() {
            self.kapp_deploy_raw_options = cluster.kapp_deploy_raw_options;
        }
    }
}

/// Format `host:port`, bracketing IPv6 literals.
fn join_host_port(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_raw_option_comes_first() {
        let config = ControllerConfig {
            kapp_deploy_raw_options: vec!["--app-changes-max-to-keep=10".to_string()],
            ..ControllerConfig::default()
        };

        assert_eq!(
            config.deploy_raw_options(),
            vec![
                "--app-changes-max-to-keep=5".to_string(),
                "--app-changes-max-to-keep=10".to_string()
            ]
        );
    }

    #[test]
    fn configured_host_port_wins() {
        let config = ControllerConfig {
            kubernetes_service_host_port: Some("10.0.0.1:6443".to_string()),
            ..ControllerConfig::default()
        };
        assert_eq!(config.service_host_port().as_deref(), Some("10.0.0.1:6443"));
    }

    #[test]
    fn cluster_config_replaces_options_only_when_present() {
        let mut config = ControllerConfig {
            kapp_deploy_raw_options: vec!["--wait-timeout=5m".to_string()],
            ..ControllerConfig::default()
        };

        config.apply_cluster_config(ClusterConfig::default());
        assert_eq!(config.kapp_deploy_raw_options, vec!["--wait-timeout=5m"]);

        config.apply_cluster_config(ClusterConfig {
            kapp_deploy_raw_options: vec!["--diff-changes=true".to_string()],
        });
        assert_eq!(config.kapp_deploy_raw_options, vec!["--diff-changes=true"]);
    }

    #[test]
    fn cancel_poll_interval_is_at_least_one_second() {
        let config = ControllerConfig {
            cancel_poll_interval_secs: 0,
            ..ControllerConfig::default()
        };
        assert_eq!(config.cancel_poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn join_host_port_brackets_ipv6() {
        assert_eq!(join_host_port("10.96.0.1", "443"), "10.96.0.1:443");
        assert_eq!(join_host_port("fd00::1", "443"), "[fd00::1]:443");
    }
}
