//! Minimal Kubernetes core-API surface the deploy engine depends on.
//!
//! The engine only needs a handful of calls, so they sit behind the
//! [`CoreApi`] trait; [`KubeCoreApi`] talks to a real API server and tests
//! substitute an in-memory implementation.

mod client;

use std::collections::BTreeMap;

use async_trait::async_trait;

pub use client::KubeCoreApi;

/// Service account as returned by the API server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceAccountRef {
    pub name: String,
    pub namespace: String,
    pub uid: String,
}

#[async_trait]
pub trait CoreApi: Send + Sync {
    async fn get_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<ServiceAccountRef>;

    /// Mint a bearer token for `sa` valid for `expiration_seconds`.
    async fn create_token(
        &self,
        sa: &ServiceAccountRef,
        expiration_seconds: i64,
    ) -> anyhow::Result<String>;

    /// Returns `Ok(None)` when the ConfigMap does not exist.
    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<Option<BTreeMap<String, String>>>;

    /// Secret data, already decoded. `Ok(None)` when not found.
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<Option<BTreeMap<String, Vec<u8>>>>;
}
