//! Translation of catalog events into warehouse commands.
//!
//! Generation is pure: no I/O, no retries, and the same event always yields
//! the same command.
//!
//! | event | condition | command |
//! |-------|-----------|---------|
//! | `table_created` | always | `CREATE OR REPLACE ICEBERG TABLE ...` |
//! | `table_altered` | post-alteration properties creatable | `CREATE OR REPLACE ICEBERG TABLE ...` |
//! | `table_altered` | otherwise | `ALTER ICEBERG TABLE ... REFRESH ...` |
//! | `table_dropped` | always | `DROP ICEBERG IF EXISTS TABLE ...` |
//! | `partition_*` | always | rejected |
//!
//! An alteration is keyed by the table as it was before the change, so a
//! rename or move stays ordered behind earlier work on the old name and runs
//! in the old database's schema. The statement itself names the new table.

use floe_core::properties::{BASE_LOCATION, CATALOG, EXTERNAL_VOLUME};
use floe_core::{CatalogEvent, TableIdent, TableSnapshot};

use crate::command::{Command, CommandKind};
use crate::error::{Error, Result};
use crate::sql::{escape_identifier, escape_literal};

/// Derives [`Command`]s from [`CatalogEvent`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandGenerator;

impl CommandGenerator {
    /// Creates a generator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Generates the command for `event`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedEvent`] for partition events.
    /// - [`Error::Core`] with `InvalidInput` when a required property is
    ///   missing or the metadata location has no `/metadata/` segment.
    /// - [`Error::Core`] with `InvalidId` when the table identity is empty.
    pub fn generate(&self, event: &CatalogEvent) -> Result<Command> {
        let command = match event {
            CatalogEvent::TableCreated { table } => create_table(table.ident()?, table)?,
            CatalogEvent::TableAltered { before, after } => {
                // Key is the pre-alteration identity; text comes from `after`.
                let key = before.ident()?;
                if after.properties.is_creatable() {
                    create_table(key, after)?
                } else {
                    refresh_table(key, after)?
                }
            }
            CatalogEvent::TableDropped { table } => drop_table(table)?,
            CatalogEvent::PartitionAdded { .. }
            | CatalogEvent::PartitionDropped { .. }
            | CatalogEvent::PartitionAltered { .. } => {
                return Err(Error::UnsupportedEvent {
                    kind: event.kind().to_string(),
                });
            }
        };

        tracing::info!(
            kind = %command.kind(),
            table = %command.table(),
            statements = ?command.statements(),
            "generated command"
        );
        Ok(command)
    }
}

/// Builds the create statement from `table`, keyed by `key`.
fn create_table(key: TableIdent, table: &TableSnapshot) -> Result<Command> {
    let ident = table.ident()?;
    let props = &table.properties;
    let external_volume = props.require(EXTERNAL_VOLUME, &ident)?;
    let catalog = props.require(CATALOG, &ident)?;
    let base_location = props.require(BASE_LOCATION, &ident)?;
    let metadata_path = props.relative_metadata_path(&ident)?;

    let statement = format!(
        "CREATE OR REPLACE ICEBERG TABLE {} EXTERNAL_VOLUME='{}' CATALOG='{}' BASE_LOCATION='{}' METADATA_FILE_PATH='{}';",
        escape_identifier(ident.name()),
        escape_literal(external_volume),
        escape_literal(catalog),
        escape_literal(base_location),
        escape_literal(metadata_path),
    );
    Ok(Command::new(CommandKind::CreateTable, key, vec![statement]))
}

fn refresh_table(key: TableIdent, table: &TableSnapshot) -> Result<Command> {
    let ident = table.ident()?;
    let metadata_path = table.properties.relative_metadata_path(&ident)?;

    let statement = format!(
        "ALTER ICEBERG TABLE {} REFRESH '{}';",
        escape_identifier(ident.name()),
        escape_literal(metadata_path),
    );
    Ok(Command::new(CommandKind::RefreshTable, key, vec![statement]))
}

fn drop_table(table: &TableSnapshot) -> Result<Command> {
    let ident = table.ident()?;
    let statement = format!(
        "DROP ICEBERG IF EXISTS TABLE {};",
        escape_identifier(ident.name())
    );
    Ok(Command::new(CommandKind::DropTable, ident, vec![statement]))
}
