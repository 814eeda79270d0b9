//! Waiting for asynchronous tasks.
//!
//! [`TaskWaiter::wait`] turns an enqueued task into a terminal
//! [`TaskSnapshot`] by polling the engine on a fixed interval:
//!
//! ```text
//!           ┌──────────────────────────────┐
//!           ▼                              │
//!  canceled? ──yes──▶ Err(Canceled)        │
//!      │ no                                │
//!    fetch ──terminal──▶ Ok(snapshot)      │
//!      │ non-terminal                      │
//!  deadline passed? ──yes──▶ Err(Timeout)  │
//!      │ no                                │
//!  sleep(min(interval, time left)) ────────┘
//!      └── cancel fires ──▶ Err(Canceled)
//! ```
//!
//! A terminal `failed` or `canceled` snapshot is a normal return value; the
//! caller (or the assertion handed to [`TaskWaiter::wait_all`]) decides
//! whether it is an error. The first fetch always happens before the
//! deadline is looked at, so a task that is already done is never reported
//! as timed out. The interval is fixed; there is no backoff.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use engine_client_core::{EngineError, Result, TaskFetcher, TaskSnapshot};

/// Interval used when a caller asks for a zero poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Per-wait settings.
#[derive(Debug, Clone, Default)]
pub struct WaitOptions {
    /// Sleep between polls. Zero means [`DEFAULT_POLL_INTERVAL`].
    pub poll_interval: Duration,
    /// Give up after this long. `None` waits until terminal or canceled.
    pub timeout: Option<Duration>,
    /// Caller-controlled abort signal.
    pub cancel: Option<CancellationToken>,
}

impl WaitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn effective_interval(&self) -> Duration {
        if self.poll_interval.is_zero() {
            DEFAULT_POLL_INTERVAL
        } else {
            self.poll_interval
        }
    }

    fn is_canceled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }
}

/// A batch wait stopped at `task_uid`, the `position`-th id of the batch.
#[derive(Debug, Error)]
#[error("waiting for task {task_uid} (position {position} in batch) failed: {error}")]
pub struct BatchWaitError {
    pub task_uid: u64,
    pub position: usize,
    #[source]
    pub error: EngineError,
}

/// Polls task snapshots until they are terminal.
///
/// Holds no mutable state; one waiter can serve any number of concurrent
/// waits for different tasks.
#[derive(Clone)]
pub struct TaskWaiter {
    fetcher: TaskFetcher,
}

impl TaskWaiter {
    pub fn new(fetcher: TaskFetcher) -> Self {
        Self { fetcher }
    }

    /// Wait for one task to reach a terminal status.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Timeout`] when the deadline passes first. The last
    ///   non-terminal snapshot is discarded.
    /// - [`EngineError::Canceled`] when `options.cancel` fires before a fetch
    ///   or during a sleep.
    /// - Any fetch error, unchanged.
    pub async fn wait(&self, task_uid: u64, options: &WaitOptions) -> Result<TaskSnapshot> {
        let interval = options.effective_interval();
        let started = Instant::now();
        let deadline = options.timeout.map(|t| started + t);
        let mut polls = 0u32;

        loop {
            if options.is_canceled() {
                debug!(task_uid, polls, "wait canceled before fetch");
                return Err(EngineError::Canceled { task_uid });
            }

            let snapshot = self.fetcher.fetch(task_uid).await?;
            polls += 1;

            if snapshot.is_terminal() {
                info!(
                    task_uid,
                    status = %snapshot.status,
                    polls,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "task reached terminal status"
                );
                return Ok(snapshot);
            }

            let nap = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(timed_out(task_uid, started, polls));
                    }
                    interval.min(deadline - now)
                }
                None => interval,
            };

            debug!(task_uid, status = %snapshot.status, polls, "task not finished, sleeping");

            match &options.cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            debug!(task_uid, polls, "wait canceled while sleeping");
                            return Err(EngineError::Canceled { task_uid });
                        }
                        _ = tokio::time::sleep(nap) => {}
                    }
                }
                None => tokio::time::sleep(nap).await,
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(timed_out(task_uid, started, polls));
                }
            }
        }
    }

    /// Wait for each task in order, stopping at the first problem.
    ///
    /// Tasks are awaited sequentially in the given order; a later id is never
    /// fetched once an earlier one fails. Each terminal snapshot is passed to
    /// `assert`, which decides whether a `failed`/`canceled` status stops the
    /// batch (see [`engine_client_core::require_succeeded`]). The timeout in
    /// `options` applies to each task individually; the cancellation token is
    /// shared by the whole batch.
    pub async fn wait_all<F>(
        &self,
        task_uids: &[u64],
        options: &WaitOptions,
        assert: F,
    ) -> std::result::Result<Vec<TaskSnapshot>, BatchWaitError>
    where
        F: Fn(&TaskSnapshot) -> Result<()>,
    {
        let mut snapshots = Vec::with_capacity(task_uids.len());

        for (position, &task_uid) in task_uids.iter().enumerate() {
            let fail = |error| BatchWaitError {
                task_uid,
                position,
                error,
            };
            let snapshot = self.wait(task_uid, options).await.map_err(fail)?;
            assert(&snapshot).map_err(fail)?;
            snapshots.push(snapshot);
        }

        Ok(snapshots)
    }
}

fn timed_out(task_uid: u64, started: Instant, polls: u32) -> EngineError {
    let elapsed = started.elapsed();
    debug!(
        task_uid,
        polls,
        elapsed_ms = elapsed.as_millis() as u64,
        "wait deadline elapsed"
    );
    EngineError::Timeout { task_uid, elapsed }
}
