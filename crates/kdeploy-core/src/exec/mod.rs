//! Process execution layer: output buffering, progress, cancellation and
//! the flag allow-lists applied before anything is spawned.

mod buffer;
mod cancel;
pub mod flags;
pub mod progress;
mod result;
mod runner;

pub use buffer::CmdRunResultBuffer;
pub use cancel::{CancelHandle, CancelSignal, cancel_channel};
pub use flags::{AllowedFlagSet, AllowedFlags, Flag, Operation};
pub use progress::{
    APPLY_OUTPUT_MARKER, ChangedFn, PROGRESS_INTERVAL, ProgressTracker, StartedApplyingFn,
};
pub use result::CmdRunResult;
pub use runner::{Cmd, CmdRunner, ProcessRunner, RunError};
