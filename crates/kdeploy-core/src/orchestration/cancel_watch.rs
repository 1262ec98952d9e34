use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::app::App;
use crate::exec::{CancelSignal, cancel_channel};

use super::AppHost;

/// A state of the App that aborts an in-flight operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCondition {
    /// `spec.canceled` is set
    Canceled,
    /// The App has a deletion timestamp
    Deleted,
}

impl CancelCondition {
    pub fn holds(self, app: &App) -> bool {
        match self {
            CancelCondition::Canceled => app.is_canceled(),
            CancelCondition::Deleted => app.is_being_deleted(),
        }
    }
}

/// Background poll of the host that raises a cancel signal.
///
/// Aborted on drop, which also drops the handle; the signal then simply
/// never fires.
pub(super) struct CancelWatch {
    signal: CancelSignal,
    task: JoinHandle<()>,
}

impl CancelWatch {
    pub(super) fn spawn(
        host: Arc<dyn AppHost>,
        conditions: &'static [CancelCondition],
        interval: Duration,
    ) -> Self {
        let (handle, signal) = cancel_channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match host.current_app().await {
                    Ok(app) => {
                        if let Some(condition) = conditions.iter().find(|c| c.holds(&app)) {
                            tracing::info!(
                                app = %app.name(),
                                condition = ?condition,
                                "Cancelling in-flight operation"
                            );
                            handle.cancel();
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %format!("{:#}", e), "Failed to read app state");
                    }
                }
            }
        });

        Self { signal, task }
    }

    pub(super) fn signal(&self) -> CancelSignal {
        self.signal.clone()
    }
}

impl Drop for CancelWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}
