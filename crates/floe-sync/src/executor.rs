//! Command execution against a warehouse.
//!
//! [`CommandExecutor`] runs one [`Command`] on a fresh session: connect,
//! then prepare and execute each statement in order, then close. Every
//! remote call goes through [`with_retry`]. The first statement that still
//! fails after its retries ends the command; the session is closed either
//! way and a close failure never replaces the command's outcome.

use std::sync::Arc;

use async_trait::async_trait;
use floe_core::command_span;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::command::Command;
use crate::error::{Error, Result};
use crate::retry::{RetryPolicy, with_retry};
use crate::schema::SchemaMapping;
use crate::warehouse::{Warehouse, WarehouseSession};

/// Something that can carry out a [`Command`].
///
/// The scheduler drives commands through this trait so that execution can
/// be replaced in tests.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    /// Executes `command` to completion, including any retries.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the command.
    async fn handle(&self, command: &Command) -> Result<()>;
}

/// Executes commands on a [`Warehouse`] with retries.
pub struct CommandExecutor {
    warehouse: Arc<dyn Warehouse>,
    schemas: SchemaMapping,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl std::fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("schemas", &self.schemas)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl CommandExecutor {
    /// Creates an executor. Cancelling `cancel` interrupts retry waits.
    #[must_use]
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        schemas: SchemaMapping,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            warehouse,
            schemas,
            retry,
            cancel,
        }
    }

    /// Executes `command`.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if no session could be opened.
    /// - [`Error::RemoteExecution`] naming the first statement that failed.
    /// - [`Error::Interrupted`] if cancelled during a retry wait.
    pub async fn execute(&self, command: &Command) -> Result<()> {
        let table = command.table();
        let span = command_span(command.kind().as_str(), table.database(), table.name());
        self.execute_inner(command).instrument(span).await
    }

    async fn execute_inner(&self, command: &Command) -> Result<()> {
        let schema = self.schemas.schema_for(command.table().database());
        let warehouse = self.warehouse.as_ref();

        let session = with_retry(&self.retry, &self.cancel, "connect", move || {
            warehouse.connect(schema)
        })
        .await?;

        let outcome = self.run_statements(session.as_ref(), command).await;

        if let Err(err) = session.close().await {
            tracing::warn!(error = %err, "failed to close warehouse session");
        }
        outcome
    }

    async fn run_statements(&self, session: &dyn WarehouseSession, command: &Command) -> Result<()> {
        for sql in command.statements() {
            let sql = sql.as_str();
            let prepared = with_retry(&self.retry, &self.cancel, "prepare", move || {
                session.prepare(sql)
            })
            .await
            .map_err(|e| statement_error(sql, e))?;

            let statement = &prepared;
            let result = with_retry(&self.retry, &self.cancel, "execute", move || {
                session.execute(statement)
            })
            .await
            .map_err(|e| statement_error(sql, e))?;

            tracing::info!(
                statement = sql,
                request_id = %prepared.request_id(),
                "{result}"
            );
        }
        Ok(())
    }
}

/// Attributes a failure to `sql`, keeping errors that already do.
fn statement_error(sql: &str, err: Error) -> Error {
    match err {
        Error::RemoteExecution { .. } | Error::Interrupted { .. } => err,
        other => Error::RemoteExecution {
            statement: sql.to_string(),
            message: other.to_string(),
            source: Some(Box::new(other)),
        },
    }
}

#[async_trait]
impl CommandHandler for CommandExecutor {
    async fn handle(&self, command: &Command) -> Result<()> {
        self.execute(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;
    use crate::warehouse::memory::InMemoryWarehouse;
    use floe_core::TableIdent;
    use std::time::Duration;

    fn command(database: &str, statements: &[&str]) -> Command {
        Command::new(
            CommandKind::DropTable,
            TableIdent::new(database, "t1").expect("ident"),
            statements.iter().map(|s| (*s).to_string()).collect(),
        )
    }

    fn executor(warehouse: &InMemoryWarehouse, max_retries: u32) -> CommandExecutor {
        CommandExecutor::new(
            Arc::new(warehouse.clone()),
            SchemaMapping::new(["sales"], "PUBLIC"),
            RetryPolicy::new(max_retries, Duration::from_millis(100)),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn executes_statements_in_mapped_schema() {
        let warehouse = InMemoryWarehouse::new();
        executor(&warehouse, 1)
            .execute(&command("sales", &["S1", "S2"]))
            .await
            .expect("execute");
        executor(&warehouse, 1)
            .execute(&command("hr", &["S3"]))
            .await
            .expect("execute");

        let executed = warehouse.executed();
        let schemas: Vec<_> = executed.iter().map(|s| s.schema.as_str()).collect();
        assert_eq!(schemas, ["sales", "sales", "PUBLIC"]);
        assert_eq!(warehouse.statements(), ["S1", "S2", "S3"]);
        assert_eq!(warehouse.sessions_opened(), 2);
        assert_eq!(warehouse.sessions_closed(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_failures_are_retried() {
        let warehouse = InMemoryWarehouse::new();
        warehouse.fail_connects(2);
        executor(&warehouse, 2)
            .execute(&command("sales", &["S1"]))
            .await
            .expect("third connect succeeds");
        assert_eq!(warehouse.connect_attempts(), 3);
        assert_eq!(warehouse.statements(), ["S1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_connect_runs_no_statements() {
        let warehouse = InMemoryWarehouse::new();
        warehouse.fail_connects(10);
        let err = executor(&warehouse, 1)
            .execute(&command("sales", &["S1"]))
            .await
            .expect_err("connect fails");

        assert!(matches!(err, Error::Connection { .. }));
        assert_eq!(warehouse.connect_attempts(), 2);
        assert!(warehouse.statements().is_empty());
        assert_eq!(warehouse.sessions_closed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn statement_failure_stops_command_and_closes_session() {
        let warehouse = InMemoryWarehouse::new();
        warehouse.fail_statements("S2", None);
        let err = executor(&warehouse, 1)
            .execute(&command("sales", &["S1", "S2", "S3"]))
            .await
            .expect_err("S2 fails");

        assert!(matches!(err, Error::RemoteExecution { ref statement, .. } if statement == "S2"));
        assert_eq!(warehouse.attempts("S2"), 2);
        assert_eq!(warehouse.attempts("S3"), 0);
        assert_eq!(warehouse.statements(), ["S1"]);
        assert_eq!(warehouse.sessions_closed(), 1);
    }

    #[tokio::test]
    async fn close_failure_does_not_mask_success() {
        let warehouse = InMemoryWarehouse::new();
        warehouse.fail_close(true);
        executor(&warehouse, 0)
            .execute(&command("sales", &["S1"]))
            .await
            .expect("close failure is only logged");
        assert_eq!(warehouse.sessions_closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_statement_retries() {
        let warehouse = InMemoryWarehouse::new();
        warehouse.fail_statements("S1", None);
        let cancel = CancellationToken::new();
        let executor = CommandExecutor::new(
            Arc::new(warehouse.clone()),
            SchemaMapping::default(),
            RetryPolicy::new(100, Duration::from_secs(60)),
            cancel.clone(),
        );

        let handle = tokio::spawn(async move { executor.execute(&command("db", &["S1"])).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let err = handle.await.expect("join").expect_err("interrupted");
        assert!(err.is_interrupted());
        assert_eq!(warehouse.attempts("S1"), 1);
        assert_eq!(warehouse.sessions_closed(), 1);
    }

    #[test]
    fn statement_error_wraps_foreign_errors() {
        let err = statement_error("S1", Error::connection("session closed"));
        assert!(matches!(err, Error::RemoteExecution { ref statement, .. } if statement == "S1"));

        let err = statement_error("S1", Error::remote("S0", "boom"));
        assert!(matches!(err, Error::RemoteExecution { ref statement, .. } if statement == "S0"));
    }
}
