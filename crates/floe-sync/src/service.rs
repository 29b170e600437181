//! Notification entry point.
//!
//! [`SyncService`] wires the pieces together:
//!
//! ```text
//! notification ─► EventFilter ─► CommandGenerator ─┬─► Scheduler ─► CommandExecutor
//!                                                  └─► CommandExecutor (synchronous mode)
//! ```
//!
//! In background mode [`SyncService::submit`] returns as soon as the command
//! is queued and execution failures surface only in logs and metrics. In
//! synchronous mode the command runs inline and its error is returned.

use std::future::Future;
use std::sync::Arc;

use floe_core::{CatalogNotification, TableIdent};
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::error::Result;
use crate::executor::{CommandExecutor, CommandHandler};
use crate::filter::{Decision, EventFilter, SkipReason};
use crate::generator::CommandGenerator;
use crate::scheduler::Scheduler;
use crate::warehouse::Warehouse;

/// What happened to a submitted notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Filtered out; nothing was generated.
    Skipped(SkipReason),
    /// Queued on the scheduler for the given table.
    Enqueued(TableIdent),
    /// Executed inline for the given table.
    Executed(TableIdent),
}

/// Mirrors catalog notifications into a warehouse.
#[derive(Debug)]
pub struct SyncService {
    filter: EventFilter,
    generator: CommandGenerator,
    executor: Arc<CommandExecutor>,
    scheduler: Option<Scheduler>,
    cancel: CancellationToken,
}

impl SyncService {
    /// Builds the service. A scheduler is created unless
    /// `config.force_synchronous` is set.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] if a filter pattern is invalid,
    /// or if the scheduler cannot be created (zero workers, no runtime).
    pub fn new(config: &SyncConfig, warehouse: Arc<dyn Warehouse>) -> Result<Self> {
        let filter = EventFilter::new(
            config.table_filter.as_deref(),
            config.database_filter.as_deref(),
        )?;
        let cancel = CancellationToken::new();
        let executor = Arc::new(CommandExecutor::new(
            warehouse,
            config.schema_mapping(),
            config.retry,
            cancel.clone(),
        ));

        let scheduler = if config.force_synchronous {
            None
        } else {
            let handler: Arc<dyn CommandHandler> = executor.clone();
            Some(Scheduler::new(handler, config.worker_count, cancel.clone())?)
        };

        tracing::info!(
            synchronous = config.force_synchronous,
            workers = config.worker_count,
            max_retries = config.retry.max_retries,
            retry_delay_ms = u64::try_from(config.retry.delay.as_millis()).unwrap_or(u64::MAX),
            "sync service started"
        );

        Ok(Self {
            filter,
            generator: CommandGenerator::new(),
            executor,
            scheduler,
            cancel,
        })
    }

    /// Filters, generates, and dispatches one notification.
    ///
    /// # Errors
    ///
    /// - Generation errors (`UnsupportedEvent`, invalid input) in both modes.
    /// - [`crate::Error::SchedulerClosed`] after shutdown in background mode.
    /// - Execution errors in synchronous mode.
    pub async fn submit(&self, notification: &CatalogNotification) -> Result<Submission> {
        if let Decision::Skip(reason) = self.filter.decide(notification) {
            return Ok(Submission::Skipped(reason));
        }

        let command = self.generator.generate(&notification.event).inspect_err(|err| {
            tracing::error!(
                event = notification.event.kind(),
                error = %err,
                "failed to generate command"
            );
        })?;
        let table = command.table().clone();

        match &self.scheduler {
            Some(scheduler) => {
                scheduler.enqueue(command)?;
                Ok(Submission::Enqueued(table))
            }
            None => {
                self.executor.execute(&command).await?;
                Ok(Submission::Executed(table))
            }
        }
    }

    /// Submits `notification`, cancelling outstanding work if `interrupt`
    /// completes first.
    ///
    /// After an interrupt the submission is still awaited; in synchronous
    /// mode it then ends with [`crate::Error::Interrupted`] from the retry
    /// wait it was blocked in, and its session is closed.
    ///
    /// # Errors
    ///
    /// The same as [`SyncService::submit`].
    pub async fn submit_or_cancel<F>(
        &self,
        notification: &CatalogNotification,
        interrupt: F,
    ) -> Result<Submission>
    where
        F: Future<Output = ()>,
    {
        let submit = self.submit(notification);
        tokio::pin!(submit);
        tokio::select! {
            result = &mut submit => result,
            () = interrupt => {
                tracing::warn!(
                    event = notification.event.kind(),
                    "interrupted during submission, cancelling outstanding work"
                );
                self.cancel();
                submit.await
            }
        }
    }

    /// Returns true once [`SyncService::cancel`] has run.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns true if commands run inline.
    #[must_use]
    pub const fn is_synchronous(&self) -> bool {
        self.scheduler.is_none()
    }

    /// Returns the scheduler, if running in background mode.
    #[must_use]
    pub const fn scheduler(&self) -> Option<&Scheduler> {
        self.scheduler.as_ref()
    }

    /// Stops intake and waits for queued commands to finish.
    pub async fn shutdown(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.shutdown().await;
        }
    }

    /// Interrupts retry waits and discards queued commands.
    pub fn cancel(&self) {
        match &self.scheduler {
            Some(scheduler) => scheduler.cancel(),
            None => self.cancel.cancel(),
        }
    }
}
