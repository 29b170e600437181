//! Key-ordered concurrent command scheduler.
//!
//! Commands for the same table run one at a time in submission order;
//! commands for different tables run in parallel, bounded by a shared pool
//! of `worker_count` permits.
//!
//! ## Design
//!
//! Each table with outstanding work has exactly one drain task. The drain
//! task repeatedly takes a permit from the shared semaphore, pops the head
//! of its table's queue, runs it to completion (retries included), and
//! releases the permit. When the queue is empty the table's entry is
//! removed; the next enqueue for that table spawns a new drain task.
//!
//! ```text
//! enqueue(c) ──► queues[table] ──► drain task ──► permit ──► handler.handle(c)
//!                    (FIFO)         (one/table)   (N shared)
//! ```
//!
//! The queue map is guarded by a mutex that is never held across an
//! `.await`. Failures and panics inside the handler are logged and counted;
//! they never stop later commands for the same table.
//!
//! ## Lifecycle
//!
//! - [`Scheduler::shutdown`] stops intake and waits for queued work.
//! - [`Scheduler::cancel`] stops intake, cancels the shared token (which
//!   interrupts retry waits in the executor), and discards commands that
//!   have not started. Discarded work is logged, never persisted.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use floe_core::TableIdent;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::command::Command;
use crate::error::{Error, Result};
use crate::executor::CommandHandler;
use crate::metrics::{SyncMetrics, TimingGuard};

/// Default number of commands that may execute at once.
pub const DEFAULT_WORKER_COUNT: usize = 8;

#[derive(Default)]
struct QueueState {
    queues: HashMap<TableIdent, VecDeque<Command>>,
    pending: usize,
    closed: bool,
}

struct Inner {
    handler: Arc<dyn CommandHandler>,
    permits: Arc<Semaphore>,
    worker_count: usize,
    state: Mutex<QueueState>,
    idle: Notify,
    cancel: CancellationToken,
    runtime: Handle,
    metrics: SyncMetrics,
    in_flight: AtomicUsize,
}

/// Per-table FIFO scheduler over a bounded worker pool.
///
/// ## Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use floe_sync::executor::CommandExecutor;
/// use floe_sync::retry::RetryPolicy;
/// use floe_sync::scheduler::Scheduler;
/// use floe_sync::schema::SchemaMapping;
/// use floe_sync::warehouse::memory::InMemoryWarehouse;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> floe_sync::Result<()> {
/// let cancel = CancellationToken::new();
/// let executor = CommandExecutor::new(
///     Arc::new(InMemoryWarehouse::new()),
///     SchemaMapping::default(),
///     RetryPolicy::default(),
///     cancel.clone(),
/// );
/// let scheduler = Scheduler::new(Arc::new(executor), 8, cancel)?;
/// // scheduler.enqueue(command)?;
/// scheduler.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("worker_count", &self.inner.worker_count)
            .field("pending", &self.pending())
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Creates a scheduler that runs at most `worker_count` commands at once.
    ///
    /// Drain tasks are spawned on the runtime that is current when this is
    /// called. `cancel` is cancelled by [`Scheduler::cancel`]; share it with
    /// the handler so retry waits stop too.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `worker_count` is zero or no
    /// tokio runtime is running.
    pub fn new(
        handler: Arc<dyn CommandHandler>,
        worker_count: usize,
        cancel: CancellationToken,
    ) -> Result<Self> {
        if worker_count == 0 {
            return Err(Error::configuration("worker count must be at least 1"));
        }
        let runtime = Handle::try_current().map_err(|e| {
            Error::configuration(format!("scheduler requires a tokio runtime: {e}"))
        })?;

        Ok(Self {
            inner: Arc::new(Inner {
                handler,
                permits: Arc::new(Semaphore::new(worker_count)),
                worker_count,
                state: Mutex::new(QueueState::default()),
                idle: Notify::new(),
                cancel,
                runtime,
                metrics: SyncMetrics::new(),
                in_flight: AtomicUsize::new(0),
            }),
        })
    }

    /// Queues `command` behind earlier commands for the same table.
    ///
    /// Never blocks on execution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchedulerClosed`] after [`Scheduler::shutdown`] or
    /// [`Scheduler::cancel`].
    pub fn enqueue(&self, command: Command) -> Result<()> {
        let key = command.table().clone();
        let mut state = self.inner.state();
        if state.closed || self.inner.cancel.is_cancelled() {
            return Err(Error::SchedulerClosed);
        }

        let spawn = match state.queues.entry(key.clone()) {
            Entry::Occupied(mut queue) => {
                queue.get_mut().push_back(command);
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(VecDeque::from([command]));
                true
            }
        };
        state.pending += 1;
        let pending = state.pending;
        drop(state);

        self.inner.metrics.set_pending(pending);
        tracing::debug!(table = %key, pending, new_drain = spawn, "command enqueued");

        if spawn {
            self.inner
                .runtime
                .spawn(drain(Arc::clone(&self.inner), key));
        }
        Ok(())
    }

    /// Resolves once no table has queued or running work.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.state().queues.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Stops accepting commands and waits for queued work to finish.
    pub async fn shutdown(&self) {
        self.inner.state().closed = true;
        tracing::info!(pending = self.pending(), "scheduler shutting down");
        self.wait_idle().await;
    }

    /// Stops accepting commands, interrupts retry waits, and discards
    /// commands that have not started.
    ///
    /// Running commands finish (or fail with `Interrupted`); use
    /// [`Scheduler::wait_idle`] to wait for them.
    pub fn cancel(&self) {
        self.inner.state().closed = true;
        self.inner.cancel.cancel();
        tracing::warn!(
            pending = self.pending(),
            in_flight = self.in_flight(),
            "scheduler cancelled"
        );
    }

    /// Maximum number of commands executing at once.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.inner.worker_count
    }

    /// Commands queued but not yet started.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.state().pending
    }

    /// Commands currently executing.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pops the next command for `key`.
    fn pop(&self, key: &TableIdent) -> Option<Command> {
        let mut state = self.state();
        let command = state.queues.get_mut(key).and_then(VecDeque::pop_front);
        if command.is_some() {
            state.pending -= 1;
        }
        let pending = state.pending;
        drop(state);
        self.metrics.set_pending(pending);
        command
    }

    /// Pops the next command for `key`, or discards its queue once cancelled.
    ///
    /// A permit may be granted just before cancellation; nothing starts after
    /// the token is cancelled.
    fn take_next(&self, key: &TableIdent) -> Option<Command> {
        if self.cancel.is_cancelled() {
            self.discard(key);
            return None;
        }
        self.pop(key)
    }

    /// Removes `key` if its queue is empty. Returns true if it was removed.
    fn retire_if_empty(&self, key: &TableIdent) -> bool {
        let mut state = self.state();
        let empty = state.queues.get(key).is_none_or(VecDeque::is_empty);
        if empty {
            state.queues.remove(key);
            if state.queues.is_empty() {
                self.idle.notify_waiters();
            }
        }
        empty
    }

    /// Drops every queued command for `key`.
    fn discard(&self, key: &TableIdent) {
        let mut state = self.state();
        let discarded = state.queues.remove(key).map_or(0, |queue| queue.len());
        state.pending -= discarded;
        let pending = state.pending;
        if state.queues.is_empty() {
            self.idle.notify_waiters();
        }
        drop(state);

        self.metrics.set_pending(pending);
        if discarded > 0 {
            self.metrics.record_discarded(discarded);
            tracing::warn!(table = %key, discarded, "discarded pending commands on cancel");
        }
    }

    async fn run(&self, command: Command) {
        let kind = command.kind();
        let table = command.table().clone();

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.metrics.set_in_flight(in_flight);
        let timing = TimingGuard::new(|elapsed| {
            tracing::debug!(table = %table, ?elapsed, "command finished");
        });

        let outcome = AssertUnwindSafe(self.handler.handle(&command))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(())) => {
                tracing::info!(table = %table, kind = %kind, "command succeeded");
                "success"
            }
            Ok(Err(err)) => {
                tracing::error!(table = %table, kind = %kind, error = %err, "command failed");
                "failure"
            }
            Err(panic) => {
                tracing::error!(
                    table = %table,
                    kind = %kind,
                    panic = panic_message(panic.as_ref()),
                    "command panicked"
                );
                "panic"
            }
        };

        let in_flight = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        self.metrics.set_in_flight(in_flight);
        self.metrics
            .record_command(kind.as_str(), result, timing.elapsed());
    }
}

/// Runs every command queued for `key`, one at a time.
async fn drain(inner: Arc<Inner>, key: TableIdent) {
    let _timing = TimingGuard::new(|elapsed| {
        tracing::debug!(?elapsed, "drain task finished");
    });

    loop {
        let permit = tokio::select! {
            biased;
            () = inner.cancel.cancelled() => None,
            permit = Arc::clone(&inner.permits).acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            inner.discard(&key);
            return;
        };

        match inner.take_next(&key) {
            Some(command) => inner.run(command).await,
            None => {
                inner.retire_if_empty(&key);
                return;
            }
        }
        drop(permit);

        if inner.retire_if_empty(&key) {
            return;
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
