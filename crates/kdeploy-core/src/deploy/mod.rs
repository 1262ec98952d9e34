//! Deploy engine: identity resolution and the kapp invocation itself.

pub mod credentials;
pub mod factory;
pub mod kapp;
pub mod kubeconfig;
pub mod kubeconfig_secrets;
pub mod service_accounts;

pub use credentials::{CredentialResolver, GenericOpts, Identity, ProcessedGenericOpts};
pub use factory::DeployFactory;
pub use kapp::{Kapp, KappSettings};
pub use kubeconfig::Kubeconfig;
