//! Remote warehouse abstraction.
//!
//! A [`Warehouse`] opens [`WarehouseSession`]s scoped to one schema. Sessions
//! are never shared between commands: each command connects, runs its
//! statements in order, and closes.
//!
//! ## Implementations
//!
//! - [`snowflake::SnowflakeWarehouse`]: Snowflake SQL API v2 over HTTPS
//! - [`memory::InMemoryWarehouse`]: recording fake with failure injection

pub mod memory;
pub mod snowflake;

use std::fmt;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

/// Statement text bound to a request id.
///
/// The request id is minted once at prepare time and reused on every
/// submission of the statement, so a retried submission can be recognised
/// by the server as the same request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStatement {
    request_id: Uuid,
    sql: String,
}

impl PreparedStatement {
    /// Prepares `sql` with a fresh request id.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            sql: sql.into(),
        }
    }

    /// Returns the request id.
    #[must_use]
    pub const fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Returns the statement text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// Tabular result of one statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    /// Column names.
    pub columns: Vec<String>,
    /// Row values; `None` is SQL NULL.
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryResult {
    /// Creates a result.
    #[must_use]
    pub const fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    /// Single-column status result, the shape DDL statements return.
    #[must_use]
    pub fn status(message: impl Into<String>) -> Self {
        Self {
            columns: vec!["status".to_string()],
            rows: vec![vec![Some(message.into())]],
        }
    }
}

/// Renders `Result:` followed by one line per row, columns joined by `|`.
impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Result:")?;
        for row in &self.rows {
            f.write_str("\n")?;
            for (i, value) in row.iter().enumerate() {
                if i > 0 {
                    f.write_str("|")?;
                }
                f.write_str(value.as_deref().unwrap_or("NULL"))?;
            }
        }
        Ok(())
    }
}

/// A remote warehouse that accepts SQL statements.
#[async_trait]
pub trait Warehouse: Send + Sync + 'static {
    /// Opens a session whose default schema is `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connection`] if the session cannot be opened.
    async fn connect(&self, schema: &str) -> Result<Box<dyn WarehouseSession>>;
}

/// An open session on a [`Warehouse`].
#[async_trait]
pub trait WarehouseSession: Send + Sync {
    /// Prepares `sql` for execution.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed or rejects the statement.
    async fn prepare(&self, sql: &str) -> Result<PreparedStatement>;

    /// Executes a prepared statement and returns its result.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RemoteExecution`] if the warehouse reports a
    /// failure or cannot be reached.
    async fn execute(&self, statement: &PreparedStatement) -> Result<QueryResult>;

    /// Closes the session. The session must not be used afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the warehouse fails to release the session.
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepared_statements_get_distinct_request_ids() {
        let a = PreparedStatement::new("SELECT 1");
        let b = PreparedStatement::new("SELECT 1");
        assert_ne!(a.request_id(), b.request_id());
        assert_eq!(a.sql(), "SELECT 1");
    }

    #[test]
    fn result_renders_pipe_separated_rows() {
        let result = QueryResult::new(
            vec!["a".into(), "b".into()],
            vec![
                vec![Some("1".into()), None],
                vec![Some("x".into()), Some("y".into())],
            ],
        );
        assert_eq!(result.to_string(), "Result:\n1|NULL\nx|y");
    }

    #[test]
    fn empty_result_renders_header_only() {
        assert_eq!(QueryResult::default().to_string(), "Result:");
        assert_eq!(
            QueryResult::status("Statement executed successfully.").to_string(),
            "Result:\nStatement executed successfully."
        );
    }
}
