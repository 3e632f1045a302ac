//! Spawning and supervising one worker run.

use std::{
    ffi::OsString,
    io,
    path::PathBuf,
    process::{ExitStatus, Stdio},
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use command_group::AsyncCommandGroup;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::{Stream, StreamExt, wrappers::SplitStream};
use vibe_relay_core::{ChatContext, ExecutorError, Worker};

use crate::{ConsoleWriter, WorkerProfile, path::worker_path};

/// Exit code reported when the worker ended without a code or signal.
const UNKNOWN_EXIT_CODE: i32 = -1;

/// Exit code of `status`, or the negated signal number if it was killed.
fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    status.code().unwrap_or(UNKNOWN_EXIT_CODE)
}

/// Runs the agent CLI for one instruction batch at a time.
pub struct AgentRunner {
    profile: WorkerProfile,
    context: ChatContext,
    send_queue: Option<PathBuf>,
    console: ConsoleWriter,
    search_path: Option<OsString>,
    resume: AtomicBool,
}

impl AgentRunner {
    /// Create a runner writing worker output to stdout.
    #[must_use]
    pub fn new(profile: WorkerProfile, context: ChatContext) -> Self {
        Self {
            profile,
            context,
            send_queue: None,
            console: ConsoleWriter::stdout(),
            search_path: None,
            resume: AtomicBool::new(false),
        }
    }

    /// Point the worker at the fallback send-queue file.
    #[must_use]
    pub fn with_send_queue(mut self, path: impl Into<PathBuf>) -> Self {
        self.send_queue = Some(path.into());
        self
    }

    /// Resume the worker's previous session on the first run.
    #[must_use]
    pub fn with_resume(self, resume: bool) -> Self {
        self.resume.store(resume, Ordering::SeqCst);
        self
    }

    /// Redirect worker output.
    #[must_use]
    pub fn with_console(mut self, console: ConsoleWriter) -> Self {
        self.console = console;
        self
    }

    /// Search only `path` for the worker executable.
    #[must_use]
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    #[must_use]
    pub const fn context(&self) -> &ChatContext {
        &self.context
    }

    /// Spawn the worker and stream its output until it exits.
    ///
    /// # Errors
    /// Returns error if the command cannot be built or spawned.
    pub async fn run_instruction(&self, instruction: &str) -> Result<i32, ExecutorError> {
        let resume = self.resume.load(Ordering::SeqCst);
        let invocation = self
            .profile
            .invocation(&self.context, instruction, resume, self.send_queue.as_deref())
            .map_err(|e| ExecutorError::CommandBuild(e.to_string()))?;

        let search_path = self
            .search_path
            .clone()
            .unwrap_or_else(|| worker_path(&std::env::var_os("PATH").unwrap_or_default()));
        let (program, args) = invocation
            .parts
            .into_resolved(&search_path)
            .await
            .map_err(|e| ExecutorError::ExecutableNotFound(e.to_string()))?;

        tracing::info!(
            worker = %self.profile,
            program = %program.display(),
            workspace = %self.context.workspace.display(),
            resume,
            "Spawning worker"
        );

        let mut cmd = tokio::process::Command::new(&program);
        cmd.args(&args)
            .current_dir(&self.context.workspace)
            .env("PATH", &search_path)
            .envs(invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .group_spawn()
            .map_err(|e| ExecutorError::SpawnFailed(format!("{}: {e}", program.display())))?;

        let stdout = child
            .inner()
            .stdout
            .take()
            .ok_or_else(|| ExecutorError::SpawnFailed("stdout not captured".into()))?;
        let stderr = child
            .inner()
            .stderr
            .take()
            .ok_or_else(|| ExecutorError::SpawnFailed("stderr not captured".into()))?;

        let output = SplitStream::new(BufReader::new(stdout).split(b'\n'))
            .merge(SplitStream::new(BufReader::new(stderr).split(b'\n')));
        self.forward_output(output).await;

        let status = child.wait().await?;
        // Every run after the first continues the same worker session.
        self.resume.store(true, Ordering::SeqCst);

        let code = exit_code(status);
        tracing::info!(exit_code = code, "Worker finished");
        Ok(code)
    }

    /// Copy worker lines to the console until the pipes close or a read fails.
    /// Consumes `output` so both pipes are closed before the child is awaited.
    async fn forward_output<S>(&self, mut output: S)
    where
        S: Stream<Item = io::Result<Vec<u8>>> + Unpin,
    {
        while let Some(line) = output.next().await {
            match line {
                Ok(bytes) => {
                    if let Err(e) = self.console.write_line(&String::from_utf8_lossy(&bytes)).await {
                        tracing::warn!("Failed to write worker output: {e}");
                    }
                }
                Err(e) => {
                    tracing::warn!("Error reading worker output: {e}");
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl Worker for AgentRunner {
    async fn run(&self, instruction: &str) -> Result<i32, ExecutorError> {
        self.run_instruction(instruction).await
    }
}
