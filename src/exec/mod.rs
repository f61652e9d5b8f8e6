//! Bounded execution of external processes: wall-clock timeout with
//! forced termination, capped output capture, and a process-wide
//! concurrency limit.

pub mod sandbox;

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::io::AsyncReadExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// Appended to captured text when a stream exceeded its cap.
pub const TRUNCATION_MARKER: &str = "\n[TRUNCATED]";

/// Concurrency limiter for spawned processes.
///
/// An explicit object constructed once at startup and threaded through
/// [`ExecContext`](crate::tools::ExecContext); slot acquisition blocks
/// until a slot frees (intentional backpressure, slots are always
/// released), and the capacity cannot change after construction.
#[derive(Debug, Clone)]
pub struct ExecutorPool {
    semaphore: Arc<Semaphore>,
}

impl ExecutorPool {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Acquire a run slot; the permit releases the slot on drop,
    /// regardless of how the run ends.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| anyhow!("executor pool closed: {e}"))
    }

    #[cfg(test)]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Fixed-capacity accumulator for one output stream. Once full, further
/// writes are discarded but still reported as fully consumed, so the
/// child process is never blocked by a full pipe.
#[derive(Debug, Default)]
pub struct CappedBuffer {
    max: usize,
    buf: Vec<u8>,
    truncated: bool,
}

impl CappedBuffer {
    pub fn new(max: usize) -> Self {
        let max = if max == 0 { 1024 } else { max };
        Self {
            max,
            buf: Vec::with_capacity(max.min(4096)),
            truncated: false,
        }
    }

    /// Accept `p`, keeping at most the remaining capacity.
    pub fn write(&mut self, p: &[u8]) {
        if p.is_empty() {
            return;
        }
        if self.buf.len() >= self.max {
            self.truncated = true;
            return;
        }
        let remain = self.max - self.buf.len();
        if p.len() <= remain {
            self.buf.extend_from_slice(p);
        } else {
            self.buf.extend_from_slice(&p[..remain]);
            self.truncated = true;
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Render as text, appending the truncation marker if the cap was hit.
    pub fn into_string(self) -> String {
        let mut s = String::from_utf8_lossy(&self.buf).into_owned();
        if self.truncated {
            s.push_str(TRUNCATION_MARKER);
        }
        s
    }
}

/// How a bounded run ended, when it did not end cleanly.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to start process: {0}")]
    Spawn(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("exit status {0}")]
    NonZero(i32),
    #[error("wait failed: {0}")]
    Wait(String),
}

/// Captured output of a bounded run. `stdout`/`stderr` carry whatever
/// was captured before the cap, the timeout, or the failure.
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub stdout: String,
    pub stderr: String,
    pub error: Option<RunError>,
}

/// Spawn `argv` in `cwd` and wait for it, bounded three ways: a slot
/// from `pool`, a wall-clock `timeout` (kill + reap on expiry), and a
/// per-stream byte cap of `max_output`.
pub async fn run_bounded(
    argv: &[String],
    cwd: &Path,
    timeout: Duration,
    max_output: usize,
    pool: &ExecutorPool,
) -> Result<RunOutcome> {
    let Some((program, rest)) = argv.split_first() else {
        return Err(anyhow!("empty command argv"));
    };
    let _permit = pool.acquire().await?;

    debug!("spawning {:?} (timeout {:?})", argv, timeout);
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(rest)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            return Ok(RunOutcome {
                error: Some(RunError::Spawn(e.to_string())),
                ..Default::default()
            })
        }
    };

    // Drain both pipes in background tasks so the child never stalls on
    // a full pipe even after its cap is reached.
    let stdout_task = child
        .stdout
        .take()
        .map(|r| tokio::spawn(drain_capped(r, max_output)));
    let stderr_task = child
        .stderr
        .take()
        .map(|r| tokio::spawn(drain_capped(r, max_output)));

    let mut error = None;
    tokio::select! {
        res = child.wait() => match res {
            Ok(status) if status.success() => {}
            Ok(status) => error = Some(RunError::NonZero(status.code().unwrap_or(-1))),
            Err(e) => error = Some(RunError::Wait(e.to_string())),
        },
        _ = tokio::time::sleep(timeout) => {
            warn!("process {:?} exceeded {:?}, killing", program, timeout);
            // kill() reaps the child before returning.
            let _ = child.kill().await;
            error = Some(RunError::Timeout(timeout));
        }
    }

    let stdout = collect(stdout_task).await;
    let stderr = collect(stderr_task).await;
    Ok(RunOutcome { stdout, stderr, error })
}

async fn drain_capped<R>(mut reader: R, cap: usize) -> CappedBuffer
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = CappedBuffer::new(cap);
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.write(&chunk[..n]),
        }
    }
    buf
}

async fn collect(task: Option<tokio::task::JoinHandle<CappedBuffer>>) -> String {
    match task {
        Some(t) => t.await.unwrap_or_default().into_string(),
        None => String::new(),
    }
}

/// Present captured streams the way the conversation loop expects:
/// `(no output)` when both are empty, otherwise `STDOUT:`/`STDERR:`
/// blocks as applicable.
pub fn format_exec_output(out: &str, err: &str) -> String {
    match (out.is_empty(), err.is_empty()) {
        (true, true) => "(no output)".to_string(),
        (false, true) => out.to_string(),
        (true, false) => format!("STDERR:\n{err}"),
        (false, false) => format!("STDOUT:\n{out}\n\nSTDERR:\n{err}"),
    }
}
