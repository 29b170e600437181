//! # floe-sync
//!
//! Mirrors catalog table lifecycle events into a remote warehouse as SQL
//! commands.
//!
//! This crate provides:
//!
//! - **Command Generation**: Pure translation of catalog events into
//!   `CREATE`/`ALTER ... REFRESH`/`DROP` Iceberg statements
//! - **Key-Ordered Scheduling**: Per-table FIFO execution over a bounded,
//!   shared worker pool
//! - **Retrying Execution**: Fixed-delay retries with cancellation around
//!   every remote call
//! - **Warehouse Clients**: Snowflake SQL API v2 and an in-memory fake
//!
//! ## Guarantees
//!
//! - **Ordered**: Commands for one table run one at a time, in submission order
//! - **Bounded**: At most `worker_count` commands execute at once
//! - **Isolated**: A failing or panicking command never blocks later ones
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use floe_core::{CatalogEvent, CatalogNotification, TableProperties, TableSnapshot};
//! use floe_core::properties::METADATA_LOCATION;
//! use floe_sync::config::SyncConfig;
//! use floe_sync::service::{Submission, SyncService};
//! use floe_sync::warehouse::memory::InMemoryWarehouse;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> floe_sync::Result<()> {
//! let warehouse = InMemoryWarehouse::new();
//! let service = SyncService::new(&SyncConfig::default(), Arc::new(warehouse.clone()))?;
//!
//! let props = TableProperties::new().with(METADATA_LOCATION, "s3://b/t1/metadata/v1.json");
//! let notification = CatalogNotification::new(CatalogEvent::TableDropped {
//!     table: TableSnapshot::new("sales", "t1", props),
//! });
//!
//! assert!(matches!(service.submit(&notification).await?, Submission::Enqueued(_)));
//! service.shutdown().await;
//! assert_eq!(warehouse.statements(), ["DROP ICEBERG IF EXISTS TABLE t1;"]);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod filter;
pub mod generator;
pub mod metrics;
pub mod retry;
pub mod scheduler;
pub mod schema;
pub mod service;
pub mod sql;
pub mod warehouse;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::command::{Command, CommandKind};
    pub use crate::config::SyncConfig;
    pub use crate::error::{Error, Result};
    pub use crate::executor::{CommandExecutor, CommandHandler};
    pub use crate::generator::CommandGenerator;
    pub use crate::retry::{RetryPolicy, with_retry};
    pub use crate::scheduler::Scheduler;
    pub use crate::service::{Submission, SyncService};
    pub use crate::warehouse::{PreparedStatement, QueryResult, Warehouse, WarehouseSession};
}

pub use error::{Error, Result};
