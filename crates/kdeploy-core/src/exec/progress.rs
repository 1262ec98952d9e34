//! Live progress reporting for a running apply.
//!
//! A poller snapshots the shared buffer on a fixed tick and hands the
//! partial result to the caller's callbacks, so App status can show output
//! before the process exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};

use super::{CmdRunResult, CmdRunResultBuffer};

/// Printed by kapp once it has computed changes and starts applying them.
pub const APPLY_OUTPUT_MARKER: &str = " ---- applying ";

/// Interval between progress snapshots.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

pub type StartedApplyingFn = Arc<dyn Fn() + Send + Sync>;
pub type ChangedFn = Arc<dyn Fn(&CmdRunResult) + Send + Sync>;

/// Handle to a running progress poller.
///
/// Stopping (or dropping) the tracker prevents any further callback from
/// being scheduled. A callback that is already running is left to finish;
/// the poller is never joined.
#[derive(Debug)]
pub struct ProgressTracker {
    stop: Option<oneshot::Sender<()>>,
}

impl ProgressTracker {
    pub fn start(
        buffer: Arc<CmdRunResultBuffer>,
        interval: Duration,
        started_applying: StartedApplyingFn,
        changed: ChangedFn,
    ) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => return,
                    _ = ticker.tick() => {
                        let snapshot = buffer.snapshot();
                        changed(&snapshot);
                        if snapshot.stdout.contains(APPLY_OUTPUT_MARKER) {
                            started_applying();
                        }
                    }
                }
            }
        });

        Self {
            stop: Some(stop_tx),
        }
    }

    pub fn stop(mut self) {
        self.send_stop();
    }

    fn send_stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            // The poller may already be gone; nothing to do then.
            let _ = stop.send(());
        }
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.send_stop();
    }
}
