//! # floe-core
//!
//! Shared primitives for mirroring catalog table changes into a remote warehouse.
//!
//! This crate provides the types every other Floe component agrees on:
//!
//! - **Table Identity**: [`TableIdent`], the key used to serialize work per table
//! - **Table Properties**: [`TableProperties`] with the Iceberg-specific lookups
//!   (creatable predicate, relative metadata path)
//! - **Catalog Notifications**: [`CatalogEvent`] and its delivery envelope
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging initialization and span helpers
//!
//! ## Example
//!
//! ```rust
//! use floe_core::prelude::*;
//!
//! # fn main() -> floe_core::Result<()> {
//! let table = TableIdent::new("sales", "orders")?;
//! assert_eq!(table.to_string(), "sales.orders");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod catalog_event;
pub mod error;
pub mod observability;
pub mod properties;
pub mod table;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use floe_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::catalog_event::{CatalogEvent, CatalogNotification, TableSnapshot};
    pub use crate::error::{Error, Result};
    pub use crate::properties::TableProperties;
    pub use crate::table::TableIdent;
}

// Re-export key types at crate root for ergonomics
pub use catalog_event::{CatalogEvent, CatalogNotification, TableSnapshot};
pub use error::{Error, Result};
pub use observability::{LogFormat, command_span, init_logging};
pub use properties::TableProperties;
pub use table::TableIdent;
