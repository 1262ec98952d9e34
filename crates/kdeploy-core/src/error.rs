//! Error types for deploy operations.

use thiserror::Error;

/// Result type alias for deploy operations
pub type DeployResult<T> = Result<T, DeployError>;

/// Errors surfaced by the deploy engine and orchestrator.
///
/// Messages are rendered into App status as-is, so variants carry plain
/// strings and the enum stays `Clone`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeployError {
    /// App did not declare exactly one deploy method
    #[error("Expected exactly one deploy option")]
    DeployOptionCount,

    /// No deploy method is able to serve the requested operation
    #[error("Unsupported way to {0}")]
    Unsupported(&'static str),

    /// Raw option does not have the `--name[=value]` shape
    #[error("Expected flag '{0}' to start with '--'")]
    MalformedFlag(String),

    /// Raw option names a flag outside the allow-list for the operation
    #[error("Unexpected flag '{0}' specified (either forbidden or unknown)")]
    DisallowedFlag(String),

    /// Neither a service account nor a cluster reference was given
    #[error("Expected service account or cluster specified")]
    NoCredentialSelector,

    #[error("Expected kubeconfig secret reference to be specified")]
    MissingKubeconfigSecretRef,

    #[error("Getting service account: {0}")]
    ServiceAccountLookup(String),

    #[error("Get service account token: {0}")]
    TokenRequest(String),

    #[error("Read ca cert from {path}: {message}")]
    CaCert { path: String, message: String },

    #[error("Getting kubeconfig secret: {0}")]
    KubeconfigSecret(String),

    #[error("Expected to find key '{key}' in secret '{secret}'")]
    KubeconfigSecretKey { key: String, secret: String },

    #[error("Parsing kubeconfig: {0}")]
    Kubeconfig(String),

    /// Credential resolution or engine setup failed
    #[error("Preparing kapp: {0}")]
    Preparing(Box<DeployError>),

    #[error("Blocking for deploy: {0}")]
    BlockDeletion(String),

    #[error("Unblocking for deploy: {0}")]
    UnblockDeletion(String),

    /// External tool failed; `op` is the operation prefix (e.g. "Deploying")
    #[error("{op}: {message}")]
    Exec { op: &'static str, message: String },

    #[error("Reading app metadata: {0}")]
    Metadata(String),
}
