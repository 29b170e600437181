//! Error types and result aliases for Floe.
//!
//! These errors cover malformed input coming from the catalog. Remote
//! execution failures live in `floe-sync`, which wraps this type.

/// The result type used throughout floe-core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when interpreting catalog data.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the identifier invalid.
        message: String,
    },

    /// Invalid input was provided (missing or malformed table properties).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },
}

impl Error {
    /// Creates an invalid input error for a table property that is absent.
    #[must_use]
    pub fn missing_property(key: &str, table: impl std::fmt::Display) -> Self {
        Self::InvalidInput(format!("table {table} has no '{key}' property"))
    }

    /// Returns true if this error describes malformed input.
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::InvalidId { .. })
    }
}
