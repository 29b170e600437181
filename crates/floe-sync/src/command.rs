//! Ready-to-execute warehouse commands.

use std::fmt;

use floe_core::TableIdent;
use serde::Serialize;

/// What a command does to the mirrored table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Create or replace the warehouse table.
    CreateTable,
    /// Point the warehouse table at a new metadata file.
    RefreshTable,
    /// Drop the warehouse table if it exists.
    DropTable,
}

impl CommandKind {
    /// Stable name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateTable => "create_table",
            Self::RefreshTable => "refresh_table",
            Self::DropTable => "drop_table",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully resolved remote action derived from one catalog event.
///
/// Commands are immutable. The scheduler takes them by value and executes
/// each one exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Command {
    kind: CommandKind,
    table: TableIdent,
    statements: Vec<String>,
}

impl Command {
    /// Creates a command.
    #[must_use]
    pub const fn new(kind: CommandKind, table: TableIdent, statements: Vec<String>) -> Self {
        Self {
            kind,
            table,
            statements,
        }
    }

    /// Returns the command kind.
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Returns the table this command serializes on.
    #[must_use]
    pub const fn table(&self) -> &TableIdent {
        &self.table
    }

    /// Returns the statements, in execution order.
    #[must_use]
    pub fn statements(&self) -> &[String] {
        &self.statements
    }
}
