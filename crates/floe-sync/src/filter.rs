//! Notification filtering.
//!
//! Decides whether a notification is mirrored at all. Checks run in order
//! and the first that applies names the skip reason:
//!
//! 1. the catalog operation failed
//! 2. the table name matches the table filter
//! 3. the database name matches the database filter
//! 4. the table has no `metadata_location` property
//! 5. a `table_created` table is not creatable
//!
//! Filters match the whole name, not a substring.

use std::fmt;

use floe_core::properties::METADATA_LOCATION;
use floe_core::{CatalogEvent, CatalogNotification};
use regex::Regex;

use crate::error::{Error, Result};
use crate::metrics::SyncMetrics;

/// Why a notification was not mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// The catalog operation itself failed.
    FailedStatus,
    /// The table name matched the table filter.
    TableFiltered,
    /// The database name matched the database filter.
    DatabaseFiltered,
    /// The table has no `metadata_location` property.
    MissingMetadataLocation,
    /// A created table lacks `CATALOG`, `EXTERNAL_VOLUME` or `BASE_LOCATION`.
    NotCreatable,
}

impl SkipReason {
    /// Stable name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FailedStatus => "failed_status",
            Self::TableFiltered => "table_filtered",
            Self::DatabaseFiltered => "database_filtered",
            Self::MissingMetadataLocation => "missing_metadata_location",
            Self::NotCreatable => "not_creatable",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`EventFilter::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Mirror the notification.
    Handle,
    /// Drop the notification.
    Skip(SkipReason),
}

/// Skip rules applied before command generation.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    table_filter: Option<Regex>,
    database_filter: Option<Regex>,
    metrics: SyncMetrics,
}

impl EventFilter {
    /// Creates a filter from optional table and database name patterns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a pattern is not a valid regex.
    pub fn new(table_pattern: Option<&str>, database_pattern: Option<&str>) -> Result<Self> {
        Ok(Self {
            table_filter: table_pattern.map(full_match).transpose()?,
            database_filter: database_pattern.map(full_match).transpose()?,
            metrics: SyncMetrics::new(),
        })
    }

    /// Decides whether `notification` should be mirrored.
    ///
    /// Skips are logged and counted.
    #[must_use]
    pub fn decide(&self, notification: &CatalogNotification) -> Decision {
        let decision = self.evaluate(notification);
        if let Decision::Skip(reason) = decision {
            let table = notification.event.table();
            tracing::info!(
                event = notification.event.kind(),
                database = %table.database,
                table = %table.name,
                reason = %reason,
                "skipping catalog event"
            );
            self.metrics.record_skip(reason.as_str());
        }
        decision
    }

    fn evaluate(&self, notification: &CatalogNotification) -> Decision {
        let event = &notification.event;
        let table = event.table();

        if !notification.succeeded {
            return Decision::Skip(SkipReason::FailedStatus);
        }
        if self
            .table_filter
            .as_ref()
            .is_some_and(|re| re.is_match(&table.name))
        {
            return Decision::Skip(SkipReason::TableFiltered);
        }
        if self
            .database_filter
            .as_ref()
            .is_some_and(|re| re.is_match(&table.database))
        {
            return Decision::Skip(SkipReason::DatabaseFiltered);
        }
        if !table.properties.contains(METADATA_LOCATION) {
            return Decision::Skip(SkipReason::MissingMetadataLocation);
        }
        if matches!(event, CatalogEvent::TableCreated { .. }) && !table.properties.is_creatable() {
            return Decision::Skip(SkipReason::NotCreatable);
        }
        Decision::Handle
    }
}

/// Compiles `pattern` anchored at both ends.
fn full_match(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})$"))
        .map_err(|e| Error::configuration(format!("invalid filter pattern '{pattern}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use floe_core::TableProperties;
    use floe_core::TableSnapshot;
    use floe_core::properties::{BASE_LOCATION, CATALOG, EXTERNAL_VOLUME};

    fn props() -> TableProperties {
        TableProperties::new().with(METADATA_LOCATION, "s3://b/t/metadata/m.json")
    }

    fn dropped(database: &str, name: &str, props: TableProperties) -> CatalogNotification {
        CatalogNotification::new(CatalogEvent::TableDropped {
            table: TableSnapshot::new(database, name, props),
        })
    }

    #[test]
    fn handles_plain_events() {
        let filter = EventFilter::default();
        assert_eq!(filter.decide(&dropped("db", "t1", props())), Decision::Handle);
    }

    #[test]
    fn failed_status_is_skipped_first() {
        let filter = EventFilter::new(Some("t1"), None).expect("filter");
        let notification = dropped("db", "t1", TableProperties::new()).failed();
        assert_eq!(
            filter.decide(&notification),
            Decision::Skip(SkipReason::FailedStatus)
        );
    }

    #[test]
    fn table_filter_matches_whole_name() {
        let filter = EventFilter::new(Some("tmp_.*"), None).expect("filter");
        assert_eq!(
            filter.decide(&dropped("db", "tmp_orders", props())),
            Decision::Skip(SkipReason::TableFiltered)
        );
        assert_eq!(
            filter.decide(&dropped("db", "orders_tmp_1", props())),
            Decision::Handle
        );
    }

    #[test]
    fn alternation_is_anchored_as_a_whole() {
        let filter = EventFilter::new(Some("a|b"), None).expect("filter");
        assert_eq!(
            filter.decide(&dropped("db", "b", props())),
            Decision::Skip(SkipReason::TableFiltered)
        );
        assert_eq!(filter.decide(&dropped("db", "ab", props())), Decision::Handle);
    }

    #[test]
    fn database_filter() {
        let filter = EventFilter::new(None, Some("staging")).expect("filter");
        assert_eq!(
            filter.decide(&dropped("staging", "t1", props())),
            Decision::Skip(SkipReason::DatabaseFiltered)
        );
        assert_eq!(
            filter.decide(&dropped("staging2", "t1", props())),
            Decision::Handle
        );
    }

    #[test]
    fn metadata_location_is_required() {
        assert_eq!(
            EventFilter::default().decide(&dropped("db", "t1", TableProperties::new())),
            Decision::Skip(SkipReason::MissingMetadataLocation)
        );
    }

    #[test]
    fn created_tables_must_be_creatable() {
        let filter = EventFilter::default();
        let created = |props| {
            CatalogNotification::new(CatalogEvent::TableCreated {
                table: TableSnapshot::new("db", "t1", props),
            })
        };
        assert_eq!(
            filter.decide(&created(props())),
            Decision::Skip(SkipReason::NotCreatable)
        );
        let full = props()
            .with(CATALOG, "c")
            .with(EXTERNAL_VOLUME, "v")
            .with(BASE_LOCATION, "b");
        assert_eq!(filter.decide(&created(full)), Decision::Handle);
    }

    #[test]
    fn alteration_uses_post_alteration_table() {
        let filter = EventFilter::new(Some("old"), None).expect("filter");
        let notification = CatalogNotification::new(CatalogEvent::TableAltered {
            before: TableSnapshot::new("db", "old", props()),
            after: TableSnapshot::new("db", "new", props()),
        });
        assert_eq!(filter.decide(&notification), Decision::Handle);
    }

    #[test]
    fn invalid_pattern_is_a_configuration_error() {
        let err = EventFilter::new(Some("("), None).expect_err("invalid");
        assert!(matches!(err, Error::Configuration(_)));
    }
}
