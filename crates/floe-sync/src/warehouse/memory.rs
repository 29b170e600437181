//! In-memory warehouse for testing.
//!
//! [`InMemoryWarehouse`] accepts every statement and records what it saw.
//! Failures and latency can be injected to exercise retry and scheduling
//! behaviour without a network.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: statements are recorded, never run
//! - **Failure injection is count-based**: the next `n` matching calls fail

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::{PreparedStatement, QueryResult, Warehouse, WarehouseSession};
use crate::error::{Error, Result};

/// One statement the warehouse executed successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedStatement {
    /// Session id (1-based, in connect order).
    pub session: usize,
    /// Schema the session was opened with.
    pub schema: String,
    /// Request id of the prepared statement.
    pub request_id: Uuid,
    /// Statement text.
    pub sql: String,
}

#[derive(Debug, Default)]
struct WarehouseState {
    connect_failures: u32,
    statement_failures: Vec<(String, Option<u32>)>,
    fail_close: bool,
    connect_attempts: usize,
    sessions_opened: usize,
    sessions_closed: usize,
    attempts: HashMap<String, usize>,
    executed: Vec<ExecutedStatement>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<WarehouseState>,
    latency: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, WarehouseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-memory warehouse for testing.
///
/// ## Example
///
/// ```rust
/// use floe_sync::warehouse::memory::InMemoryWarehouse;
///
/// let warehouse = InMemoryWarehouse::new();
/// warehouse.fail_connects(1);
/// assert!(warehouse.statements().is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryWarehouse {
    shared: Arc<Shared>,
}

impl InMemoryWarehouse {
    /// Creates a warehouse that executes instantly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a warehouse where every statement takes `latency`.
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                latency,
                ..Shared::default()
            }),
        }
    }

    /// Makes the next `count` connects fail.
    pub fn fail_connects(&self, count: u32) {
        self.shared.state().connect_failures = count;
    }

    /// Makes statements containing `pattern` fail.
    ///
    /// With `Some(n)` the next `n` matching executions fail; with `None`
    /// every matching execution fails.
    pub fn fail_statements(&self, pattern: impl Into<String>, times: Option<u32>) {
        self.shared
            .state()
            .statement_failures
            .push((pattern.into(), times));
    }

    /// Makes every session close fail.
    pub fn fail_close(&self, fail: bool) {
        self.shared.state().fail_close = fail;
    }

    /// Statements executed successfully, in completion order.
    #[must_use]
    pub fn executed(&self) -> Vec<ExecutedStatement> {
        self.shared.state().executed.clone()
    }

    /// Text of the statements executed successfully, in completion order.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.shared
            .state()
            .executed
            .iter()
            .map(|s| s.sql.clone())
            .collect()
    }

    /// Execution attempts (successful or not) for the exact statement `sql`.
    #[must_use]
    pub fn attempts(&self, sql: &str) -> usize {
        self.shared.state().attempts.get(sql).copied().unwrap_or(0)
    }

    /// Connect calls, including failed ones.
    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.shared.state().connect_attempts
    }

    /// Sessions successfully opened.
    #[must_use]
    pub fn sessions_opened(&self) -> usize {
        self.shared.state().sessions_opened
    }

    /// Sessions closed (successfully or not).
    #[must_use]
    pub fn sessions_closed(&self) -> usize {
        self.shared.state().sessions_closed
    }

    /// Highest number of statements that were executing at the same time.
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.shared.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Warehouse for InMemoryWarehouse {
    async fn connect(&self, schema: &str) -> Result<Box<dyn WarehouseSession>> {
        let id = {
            let mut state = self.shared.state();
            state.connect_attempts += 1;
            if state.connect_failures > 0 {
                state.connect_failures -= 1;
                return Err(Error::connection(format!(
                    "injected connect failure for schema {schema}"
                )));
            }
            state.sessions_opened += 1;
            state.sessions_opened
        };

        Ok(Box::new(InMemorySession {
            id,
            schema: schema.to_string(),
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct InMemorySession {
    id: usize,
    schema: String,
    shared: Arc<Shared>,
}

/// Decrements the active statement count on drop.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl WarehouseSession for InMemorySession {
    async fn prepare(&self, sql: &str) -> Result<PreparedStatement> {
        Ok(PreparedStatement::new(sql))
    }

    async fn execute(&self, statement: &PreparedStatement) -> Result<QueryResult> {
        let active = self.shared.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveGuard(&self.shared.active);
        self.shared.peak.fetch_max(active, Ordering::SeqCst);

        if !self.shared.latency.is_zero() {
            tokio::time::sleep(self.shared.latency).await;
        }

        let mut state = self.shared.state();
        *state
            .attempts
            .entry(statement.sql().to_string())
            .or_default() += 1;

        let injected = state
            .statement_failures
            .iter_mut()
            .find(|(pattern, remaining)| {
                statement.sql().contains(pattern.as_str()) && *remaining != Some(0)
            });
        if let Some((_, remaining)) = injected {
            if let Some(n) = remaining {
                *n -= 1;
            }
            return Err(Error::remote(statement.sql(), "injected statement failure"));
        }

        state.executed.push(ExecutedStatement {
            session: self.id,
            schema: self.schema.clone(),
            request_id: statement.request_id(),
            sql: statement.sql().to_string(),
        });
        drop(state);

        Ok(QueryResult::status("Statement executed successfully."))
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.shared.state();
        state.sessions_closed += 1;
        if state.fail_close {
            return Err(Error::connection(format!(
                "injected close failure for session {}",
                self.id
            )));
        }
        Ok(())
    }
}
