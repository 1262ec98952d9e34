use async_trait::async_trait;

use crate::app::App;

/// The reconciler driving an orchestrator call.
///
/// The orchestrator only borrows the App for one pass; everything that
/// touches the App resource itself (finalizers, status) stays with the host.
#[async_trait]
pub trait AppHost: Send + Sync {
    /// Latest known state of the App, polled while an operation runs.
    async fn current_app(&self) -> anyhow::Result<App>;

    /// Prevent the App from being removed while resources are deployed.
    async fn block_deletion(&self) -> anyhow::Result<()>;

    /// Release the guard set by [`AppHost::block_deletion`].
    async fn unblock_deletion(&self) -> anyhow::Result<()>;

    /// Called on every progress tick once the tool has started applying.
    fn started_applying(&self);
}
