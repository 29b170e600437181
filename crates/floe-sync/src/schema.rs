//! Catalog database to warehouse schema mapping.

use std::collections::HashSet;

/// Default warehouse schema for databases that are not synced by name.
pub const DEFAULT_SCHEMA: &str = "PUBLIC";

/// Resolves the warehouse schema a table's statements run in.
///
/// Databases listed as synced map to the schema of the same name; every
/// other database maps to the default schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMapping {
    synced: HashSet<String>,
    default_schema: String,
}

impl Default for SchemaMapping {
    fn default() -> Self {
        Self::new(Vec::<String>::new(), DEFAULT_SCHEMA)
    }
}

impl SchemaMapping {
    /// Creates a mapping.
    #[must_use]
    pub fn new<I, S>(synced: I, default_schema: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            synced: synced.into_iter().map(Into::into).collect(),
            default_schema: default_schema.into(),
        }
    }

    /// Returns the schema for `database`.
    #[must_use]
    pub fn schema_for<'a>(&'a self, database: &'a str) -> &'a str {
        if self.synced.contains(database) {
            database
        } else {
            &self.default_schema
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synced_database_maps_to_same_schema() {
        let mapping = SchemaMapping::new(["sales", "ops"], "PUBLIC");
        assert_eq!(mapping.schema_for("sales"), "sales");
        assert_eq!(mapping.schema_for("ops"), "ops");
    }

    #[test]
    fn other_databases_use_default() {
        let mapping = SchemaMapping::new(["sales"], "LANDING");
        assert_eq!(mapping.schema_for("Sales"), "LANDING");
        assert_eq!(mapping.schema_for("hr"), "LANDING");
        assert_eq!(SchemaMapping::default().schema_for("any"), DEFAULT_SCHEMA);
    }
}
