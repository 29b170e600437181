//! Catalog lifecycle notifications.
//!
//! The external catalog emits one notification per table or partition
//! change. Floe receives them as [`CatalogNotification`] envelopes, usually
//! one JSON document per line:
//!
//! ```json
//! {"succeeded":true,"event":{"event_type":"table_dropped","table":{"database":"db","name":"t1"}}}
//! ```
//!
//! Notifications are immutable once constructed and discarded after a
//! command has been derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::properties::TableProperties;
use crate::table::TableIdent;

/// Point-in-time view of a catalog table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    /// Database (namespace) the table belongs to.
    pub database: String,
    /// Table name.
    pub name: String,
    /// Table properties at the time of the event.
    #[serde(default)]
    pub properties: TableProperties,
}

impl TableSnapshot {
    /// Creates a snapshot.
    #[must_use]
    pub fn new(
        database: impl Into<String>,
        name: impl Into<String>,
        properties: TableProperties,
    ) -> Self {
        Self {
            database: database.into(),
            name: name.into(),
            properties,
        }
    }

    /// Returns the validated identity of this table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] if the database or table name is empty.
    pub fn ident(&self) -> Result<TableIdent> {
        TableIdent::new(self.database.clone(), self.name.clone())
    }
}

/// A table or partition lifecycle event raised by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum CatalogEvent {
    /// A table was created.
    TableCreated {
        /// The created table.
        table: TableSnapshot,
    },
    /// A table was dropped.
    TableDropped {
        /// The dropped table.
        table: TableSnapshot,
    },
    /// A table's schema, location, or properties changed.
    TableAltered {
        /// Table state before the alteration.
        before: TableSnapshot,
        /// Table state after the alteration.
        after: TableSnapshot,
    },
    /// A partition was added to a table.
    PartitionAdded {
        /// The owning table.
        table: TableSnapshot,
    },
    /// A partition was dropped from a table.
    PartitionDropped {
        /// The owning table.
        table: TableSnapshot,
    },
    /// A partition was altered.
    PartitionAltered {
        /// The owning table.
        table: TableSnapshot,
    },
}

impl CatalogEvent {
    /// Returns the stable event type name (matches the serialized tag).
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TableCreated { .. } => "table_created",
            Self::TableDropped { .. } => "table_dropped",
            Self::TableAltered { .. } => "table_altered",
            Self::PartitionAdded { .. } => "partition_added",
            Self::PartitionDropped { .. } => "partition_dropped",
            Self::PartitionAltered { .. } => "partition_altered",
        }
    }

    /// Returns the table the event is about.
    ///
    /// For alterations this is the post-alteration table. Commands for an
    /// alteration are keyed by `before` instead.
    #[must_use]
    pub const fn table(&self) -> &TableSnapshot {
        match self {
            Self::TableCreated { table }
            | Self::TableDropped { table }
            | Self::PartitionAdded { table }
            | Self::PartitionDropped { table }
            | Self::PartitionAltered { table } => table,
            Self::TableAltered { after, .. } => after,
        }
    }
}

/// Delivery envelope around a [`CatalogEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogNotification {
    /// Whether the catalog operation itself succeeded.
    #[serde(default = "default_succeeded")]
    pub succeeded: bool,

    /// When the notification was received.
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,

    /// The event payload.
    pub event: CatalogEvent,
}

const fn default_succeeded() -> bool {
    true
}

impl CatalogNotification {
    /// Wraps a successful event received now.
    #[must_use]
    pub fn new(event: CatalogEvent) -> Self {
        Self {
            succeeded: true,
            received_at: Utc::now(),
            event,
        }
    }

    /// Marks the underlying catalog operation as failed.
    #[must_use]
    pub const fn failed(mut self) -> Self {
        self.succeeded = false;
        self
    }

    /// Parses a notification from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the document is not a valid
    /// notification (including unknown event types).
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization {
            message: format!("parse catalog notification: {e}"),
        })
    }
}
