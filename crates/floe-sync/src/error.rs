//! Error types for command generation, scheduling, and remote execution.

/// The result type used throughout floe-sync.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while mirroring catalog events.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The catalog event kind has no warehouse counterpart.
    #[error("unsupported event: {kind}")]
    UnsupportedEvent {
        /// The rejected event kind.
        kind: String,
    },

    /// A warehouse connection could not be opened.
    #[error("connection error: {message}")]
    Connection {
        /// Description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A statement failed on the warehouse.
    #[error("remote execution failed for `{statement}`: {message}")]
    RemoteExecution {
        /// The statement text that failed.
        statement: String,
        /// Description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A retry wait was cancelled.
    #[error("interrupted while retrying {operation}")]
    Interrupted {
        /// The operation whose retry chain was abandoned.
        operation: String,
    },

    /// The scheduler no longer accepts commands.
    #[error("scheduler is closed")]
    SchedulerClosed,

    /// Configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An error from floe-core (malformed identifiers or properties).
    #[error("core error: {0}")]
    Core(#[from] floe_core::Error),
}

impl Error {
    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a connection error without a source.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a remote execution error for `statement`.
    #[must_use]
    pub fn remote(statement: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteExecution {
            statement: statement.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a remote execution error with a source cause.
    #[must_use]
    pub fn remote_with_source(
        statement: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::RemoteExecution {
            statement: statement.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true if this error is a cancelled retry chain.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }

    /// Returns true if this error describes malformed catalog input.
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        match self {
            Self::Core(core) => core.is_invalid_input(),
            _ => false,
        }
    }

    /// Short, stable label for metrics and logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::UnsupportedEvent { .. } => "unsupported_event",
            Self::Connection { .. } => "connection",
            Self::RemoteExecution { .. } => "remote_execution",
            Self::Interrupted { .. } => "interrupted",
            Self::SchedulerClosed => "scheduler_closed",
            Self::Configuration(_) => "configuration",
            Self::Core(_) => "invalid_input",
        }
    }
}
