//! Structured result of one external-process invocation.

use crate::error::DeployError;

/// Captured output of the apply tool plus at most one error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdRunResult {
    pub stdout: String,
    pub stderr: String,
    pub error: Option<DeployError>,
}

impl CmdRunResult {
    pub fn with_error(error: DeployError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Attach `error` unless an earlier error is already recorded.
    pub fn attach_error(&mut self, error: DeployError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
