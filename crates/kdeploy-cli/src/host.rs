//! App host backed by a YAML file on disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use async_trait::async_trait;

use kdeploy_core::prelude::*;

/// Namespace assumed for an App file without `metadata.namespace`.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Serves the App from a file, re-reading it on every poll.
///
/// Ctrl-C marks the App as canceled. Deletion blocking is only logged;
/// finalizers belong to the controller.
pub struct FileAppHost {
    path: PathBuf,
    interrupted: Arc<AtomicBool>,
}

impl FileAppHost {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel_on_interrupt(&self) {
        let interrupted = Arc::clone(&self.interrupted);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling");
                interrupted.store(true, Ordering::SeqCst);
            }
        });
    }
}

#[async_trait]
impl AppHost for FileAppHost {
    async fn current_app(&self) -> anyhow::Result<App> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read app {}", self.path.display()))?;
        let mut app = parse_app(&content)
            .with_context(|| format!("Failed to parse app {}", self.path.display()))?;

        if self.interrupted.load(Ordering::SeqCst) {
            app.spec.canceled = true;
        }
        Ok(app)
    }

    async fn block_deletion(&self) -> anyhow::Result<()> {
        tracing::info!(app = %self.path.display(), "Deletion blocked");
        Ok(())
    }

    async fn unblock_deletion(&self) -> anyhow::Result<()> {
        tracing::info!(app = %self.path.display(), "Deletion unblocked");
        Ok(())
    }

    fn started_applying(&self) {
        tracing::debug!("kapp started applying changes");
    }
}

fn parse_app(content: &str) -> anyhow::Result<App> {
    let mut app: App = serde_yaml_ng::from_str(content)?;
    if app.metadata.name.is_empty() {
        anyhow::bail!("metadata.name is required");
    }
    if app.metadata.namespace.is_empty() {
        app.metadata.namespace = DEFAULT_NAMESPACE.to_string();
    }
    Ok(app)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn write_app(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("app.yaml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn missing_namespace_defaults() {
        let temp = TempDir::new().unwrap();
        let path = write_app(
            &temp,
            "metadata:\n  name: simple-app\nspec:\n  serviceAccountName: deployer\n  deploy:\n  - kapp: {}\n",
        );

        let app = FileAppHost::new(path).current_app().await.unwrap();

        assert_eq!(app.namespace(), DEFAULT_NAMESPACE);
        assert_eq!(app.name(), "simple-app");
    }

    #[tokio::test]
    async fn explicit_namespace_is_kept() {
        let temp = TempDir::new().unwrap();
        let path = write_app(&temp, "metadata:\n  name: simple-app\n  namespace: apps\n");

        let app = FileAppHost::new(path).current_app().await.unwrap();

        assert_eq!(app.namespace(), "apps");
    }

    #[tokio::test]
    async fn missing_name_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = write_app(&temp, "metadata:\n  namespace: apps\n");

        let err = FileAppHost::new(path).current_app().await.unwrap_err();

        assert!(format!("{:#}", err).contains("metadata.name is required"));
    }

    #[tokio::test]
    async fn interrupt_marks_app_canceled() {
        let temp = TempDir::new().unwrap();
        let path = write_app(&temp, "metadata:\n  name: simple-app\n");
        let host = FileAppHost::new(path);

        host.interrupted.store(true, Ordering::SeqCst);

        assert!(host.current_app().await.unwrap().is_canceled());
    }
}
