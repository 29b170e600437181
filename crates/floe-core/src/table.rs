//! Table identity.
//!
//! A [`TableIdent`] names a catalog table by database and table name. It is
//! the scheduling key: two commands with equal identities never run at the
//! same time. Beyond equality and hashing it carries no meaning.

use serde::Serialize;
use std::fmt;

use crate::error::{Error, Result};

/// Identity of a catalog table (database name + table name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TableIdent {
    database: String,
    name: String,
}

impl TableIdent {
    /// Creates a table identity after validating both parts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] if either part is empty or only whitespace.
    pub fn new(database: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let database = database.into();
        let name = name.into();

        if database.trim().is_empty() {
            return Err(Error::InvalidId {
                message: format!("database name for table '{name}' cannot be empty"),
            });
        }
        if name.trim().is_empty() {
            return Err(Error::InvalidId {
                message: format!("table name in database '{database}' cannot be empty"),
            });
        }

        Ok(Self { database, name })
    }

    /// Returns the database name.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TableIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.name)
    }
}
