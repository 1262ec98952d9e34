//! Spawning the apply tool under a cancellation signal.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use super::{CancelSignal, CmdRunResultBuffer};

/// A fully composed invocation of an external program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cmd {
    pub program: String,
    pub args: Vec<String>,
    /// Added on top of the inherited environment
    pub env: Vec<(String, String)>,
    /// Written to the process's stdin, which is then closed
    pub stdin: Option<String>,
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("starting '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("waiting for process: {0}")]
    Wait(#[from] io::Error),

    #[error("{0}")]
    Exit(ExitStatus),

    #[error("process was canceled")]
    Canceled,
}

/// Runs a command, streaming its output into `output`.
///
/// Implementations must return promptly once `cancel` is raised.
#[async_trait]
pub trait CmdRunner: Send + Sync {
    async fn run_with_cancel(
        &self,
        cmd: &Cmd,
        output: Arc<CmdRunResultBuffer>,
        cancel: CancelSignal,
    ) -> Result<(), RunError>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CmdRunner for ProcessRunner {
    async fn run_with_cancel(
        &self,
        cmd: &Cmd,
        output: Arc<CmdRunResultBuffer>,
        mut cancel: CancelSignal,
    ) -> Result<(), RunError> {
        if cancel.is_cancelled() {
            return Err(RunError::Canceled);
        }

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .envs(cmd.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if cmd.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(program = %cmd.program, args = ?cmd.args, "Starting process");

        let mut child = command.spawn().map_err(|source| RunError::Spawn {
            program: cmd.program.clone(),
            source,
        })?;

        if let (Some(mut stdin), Some(input)) = (child.stdin.take(), cmd.stdin.clone()) {
            tokio::spawn(async move {
                // A process that exits without reading its input is not an error here.
                let _ = stdin.write_all(input.as_bytes()).await;
            });
        }

        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            let output = Arc::clone(&output);
            pumps.push(pump(stdout, move |bytes| output.write_stdout(bytes)));
        }
        if let Some(stderr) = child.stderr.take() {
            let output = Arc::clone(&output);
            pumps.push(pump(stderr, move |bytes| output.write_stderr(bytes)));
        }

        let finished = tokio::select! {
            status = wait_and_drain(&mut child, pumps) => Some(status),
            _ = cancel.cancelled() => None,
        };

        match finished {
            Some(status) => {
                let status = status?;
                tracing::debug!(program = %cmd.program, %status, "Process exited");
                if status.success() {
                    Ok(())
                } else {
                    Err(RunError::Exit(status))
                }
            }
            None => {
                tracing::info!(program = %cmd.program, "Canceling process");
                if let Err(e) = child.start_kill() {
                    tracing::warn!(error = %e, "Failed to kill canceled process");
                }
                let _ = child.wait().await;
                Err(RunError::Canceled)
            }
        }
    }
}

fn pump<R, F>(mut reader: R, sink: F) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    F: Fn(&[u8]) + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink(&chunk[..n]),
            }
        }
    })
}

async fn wait_and_drain(child: &mut Child, pumps: Vec<JoinHandle<()>>) -> io::Result<ExitStatus> {
    let status = child.wait().await?;
    for pump in pumps {
        let _ = pump.await;
    }
    Ok(status)
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::exec::cancel_channel;

    fn sh(script: &str) -> Cmd {
        Cmd {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            ..Cmd::default()
        }
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let output = Arc::new(CmdRunResultBuffer::new());
        ProcessRunner
            .run_with_cancel(
                &sh("echo out; echo err >&2"),
                Arc::clone(&output),
                CancelSignal::never(),
            )
            .await
            .unwrap();

        let snapshot = output.snapshot();
        assert_eq!(snapshot.stdout, "out\n");
        assert_eq!(snapshot.stderr, "err\n");
    }

    #[tokio::test]
    async fn feeds_stdin_and_env() {
        let mut cmd = sh("cat; printf '%s' \"$KDEPLOY_TEST_VAR\"");
        cmd.stdin = Some("manifest: yes\n".to_string());
        cmd.env = vec![("KDEPLOY_TEST_VAR".to_string(), "from-env".to_string())];

        let output = Arc::new(CmdRunResultBuffer::new());
        ProcessRunner
            .run_with_cancel(&cmd, Arc::clone(&output), CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(output.snapshot().stdout, "manifest: yes\nfrom-env");
    }

    #[tokio::test]
    async fn non_zero_exit_keeps_output() {
        let output = Arc::new(CmdRunResultBuffer::new());
        let err = ProcessRunner
            .run_with_cancel(
                &sh("echo partial; exit 3"),
                Arc::clone(&output),
                CancelSignal::never(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::Exit(status) if status.code() == Some(3)));
        assert_eq!(output.snapshot().stdout, "partial\n");
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let cmd = Cmd {
            program: "/nonexistent/kapp".to_string(),
            ..Cmd::default()
        };
        let err = ProcessRunner
            .run_with_cancel(
                &cmd,
                Arc::new(CmdRunResultBuffer::new()),
                CancelSignal::never(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::Spawn { .. }));
    }

    #[tokio::test]
    async fn cancel_terminates_long_running_process() {
        let (handle, signal) = cancel_channel();
        let output = Arc::new(CmdRunResultBuffer::new());

        let started = Instant::now();
        let run = {
            let output = Arc::clone(&output);
            tokio::spawn(async move {
                ProcessRunner
                    .run_with_cancel(&sh("echo begin; exec sleep 30"), output, signal)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.cancel();

        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(err, RunError::Canceled));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(output.snapshot().stdout, "begin\n");
    }

    #[tokio::test]
    async fn already_canceled_signal_never_spawns() {
        let (handle, signal) = cancel_channel();
        handle.cancel();

        let err = ProcessRunner
            .run_with_cancel(
                &sh("echo should-not-run"),
                Arc::new(CmdRunResultBuffer::new()),
                signal,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::Canceled));
    }
}
