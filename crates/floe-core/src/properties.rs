//! Catalog table properties and the Iceberg lookups built on them.
//!
//! The catalog attaches free-form string properties to every table. Floe
//! reads four of them:
//!
//! | key | meaning |
//! |-----|---------|
//! | `CATALOG` | warehouse catalog integration name |
//! | `EXTERNAL_VOLUME` | warehouse external volume |
//! | `BASE_LOCATION` | table base location relative to the volume |
//! | `metadata_location` | full URI of the current Iceberg metadata file |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Property naming the warehouse catalog integration.
pub const CATALOG: &str = "CATALOG";

/// Property naming the warehouse external volume.
pub const EXTERNAL_VOLUME: &str = "EXTERNAL_VOLUME";

/// Property holding the table base location.
pub const BASE_LOCATION: &str = "BASE_LOCATION";

/// Property holding the full metadata file location.
pub const METADATA_LOCATION: &str = "metadata_location";

/// Marker locating the metadata directory inside a metadata location.
const METADATA_DIR_MARKER: &str = "/metadata/";

/// Snapshot of a table's properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableProperties(BTreeMap<String, String>);

impl TableProperties {
    /// Creates an empty property set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy with `key` set to `value`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Returns the value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns true if `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Returns the value for `key` or an invalid input error naming `table`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the property is absent.
    pub fn require(&self, key: &str, table: impl std::fmt::Display) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| Error::missing_property(key, table))
    }

    /// Returns true if the properties carry enough information to (re)create
    /// the warehouse table rather than only refresh its metadata pointer.
    #[must_use]
    pub fn is_creatable(&self) -> bool {
        self.contains(CATALOG) && self.contains(EXTERNAL_VOLUME) && self.contains(BASE_LOCATION)
    }

    /// Returns the metadata file path relative to the table location.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `metadata_location` is absent or has
    /// no `/metadata/` segment.
    pub fn relative_metadata_path(&self, table: impl std::fmt::Display) -> Result<&str> {
        let location = self.require(METADATA_LOCATION, &table)?;
        relative_metadata_path(location).ok_or_else(|| {
            Error::InvalidInput(format!(
                "metadata location '{location}' of table {table} has no '{METADATA_DIR_MARKER}' segment"
            ))
        })
    }

    /// Iterates over all properties in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for TableProperties
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Strips everything up to and including the slash that precedes the first
/// `metadata/` directory.
///
/// ```rust
/// use floe_core::properties::relative_metadata_path;
///
/// assert_eq!(
///     relative_metadata_path("s3://bucket/db.db/tbl/metadata/00004-x.metadata.json"),
///     Some("metadata/00004-x.metadata.json"),
/// );
/// assert_eq!(relative_metadata_path("s3://bucket/tbl/v1.json"), None);
/// ```
#[must_use]
pub fn relative_metadata_path(location: &str) -> Option<&str> {
    location
        .find(METADATA_DIR_MARKER)
        .map(|index| &location[index + 1..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creatable() -> TableProperties {
        TableProperties::new()
            .with(CATALOG, "c")
            .with(EXTERNAL_VOLUME, "v")
            .with(BASE_LOCATION, "b")
            .with(METADATA_LOCATION, "s3://bucket/t/metadata/m.json")
    }

    #[test]
    fn creatable_requires_all_three_properties() {
        assert!(creatable().is_creatable());

        for key in [CATALOG, EXTERNAL_VOLUME, BASE_LOCATION] {
            let props: TableProperties = creatable().iter().filter(|(k, _)| *k != key).collect();
            assert!(!props.is_creatable(), "{key} missing should not be creatable");
        }
    }

    #[test]
    fn metadata_path_from_full_uri() {
        let props = TableProperties::new().with(
            METADATA_LOCATION,
            "S3://bucket/db.db/tbl/metadata/00004-x.metadata.json",
        );
        assert_eq!(
            props.relative_metadata_path("db.tbl").expect("path"),
            "metadata/00004-x.metadata.json"
        );
    }

    #[test]
    fn metadata_path_uses_first_marker() {
        assert_eq!(
            relative_metadata_path("gs://b/metadata/t/metadata/v2.metadata.json"),
            Some("metadata/t/metadata/v2.metadata.json")
        );
    }

    #[test]
    fn metadata_path_missing_property() {
        let err = TableProperties::new()
            .relative_metadata_path("db.tbl")
            .expect_err("missing");
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(err.to_string().contains(METADATA_LOCATION));
    }

    #[test]
    fn metadata_path_without_marker() {
        let props = TableProperties::new().with(METADATA_LOCATION, "s3://bucket/t/metadata.json");
        let err = props.relative_metadata_path("db.tbl").expect_err("no marker");
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn deserializes_from_plain_map() {
        let props: TableProperties =
            serde_json::from_str(r#"{"CATALOG":"c","metadata_location":"x/metadata/y"}"#)
                .expect("deserialize");
        assert_eq!(props.get(CATALOG), Some("c"));
        assert!(!props.is_creatable());
    }
}
