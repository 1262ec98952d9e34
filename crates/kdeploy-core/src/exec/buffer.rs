//! Shared output buffer for a running process.

use std::sync::{Mutex, MutexGuard};

use super::CmdRunResult;

#[derive(Debug, Default)]
struct Output {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Accumulates stdout/stderr while a process runs.
///
/// Writers append whole chunks under the lock, so a snapshot never observes
/// a torn write.
#[derive(Debug, Default)]
pub struct CmdRunResultBuffer {
    output: Mutex<Output>,
}

impl CmdRunResultBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_stdout(&self, bytes: &[u8]) {
        self.lock().stdout.extend_from_slice(bytes);
    }

    pub fn write_stderr(&self, bytes: &[u8]) {
        self.lock().stderr.extend_from_slice(bytes);
    }

    /// Point-in-time copy of everything written so far.
    pub fn snapshot(&self) -> CmdRunResult {
        let output = self.lock();
        CmdRunResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            error: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Output> {
        // Writers never leave the buffer half-updated, so a poisoned lock is still usable.
        self.output.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn snapshot_reflects_writes_in_order() {
        let buffer = CmdRunResultBuffer::new();
        buffer.write_stdout(b"Target cluster 'https://1.2.3.4'\n");
        buffer.write_stderr(b"warning\n");
        buffer.write_stdout(b"Changes\n");

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.stdout, "Target cluster 'https://1.2.3.4'\nChanges\n");
        assert_eq!(snapshot.stderr, "warning\n");
        assert!(snapshot.error.is_none());
    }

    #[test]
    fn concurrent_writers_never_tear_chunks() {
        let buffer = Arc::new(CmdRunResultBuffer::new());
        let chunk = "x".repeat(64) + "\n";

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let buffer = Arc::clone(&buffer);
                let chunk = chunk.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        buffer.write_stdout(chunk.as_bytes());
                    }
                })
            })
            .collect();

        for _ in 0..50 {
            let snapshot = buffer.snapshot();
            assert_eq!(snapshot.stdout.len() % chunk.len(), 0);
        }
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(buffer.snapshot().stdout.len(), chunk.len() * 400);
    }
}
