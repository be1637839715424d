// 🔁 Migration Registry & Runner
//
// Brings an existing database up to the latest schema, safely, on every
// startup:
//
//   1. a legacy `version` table is present -> back up the database file,
//      then retire the table (one-shot adapter, see `legacy`)
//   2. compare the store's schema version marker with the registry
//   3. nothing pending -> return
//   4. back up the database file unless step 1 already did; a failed backup
//      stops everything
//   5. apply every pending unit in version order inside ONE transaction,
//      then advance the marker in that same transaction
//
// A failed backup leaves the database untouched, legacy table included. A
// failing unit rolls the whole run back: schema and marker stay exactly as
// they were, and the backup is the recovery path.

pub mod data;
pub mod legacy;
pub mod m001_init;
pub mod m002_single_default;
pub mod m003_account_type_integrity;

use crate::backup::backup_database;
use crate::db::{write_schema_version, Store};
use crate::error::{LedgerError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// One versioned schema change.
#[derive(Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub apply: fn(&rusqlite::Transaction<'_>) -> rusqlite::Result<()>,
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("name", &self.name)
            .finish()
    }
}

/// Registry, ascending by version. Add new units at the end.
pub const MIGRATIONS: &[Migration] = &[
    m001_init::MIGRATION,
    m002_single_default::MIGRATION,
    m003_account_type_integrity::MIGRATION,
];

pub fn latest_version() -> u32 {
    latest_in(MIGRATIONS)
}

fn latest_in(registry: &[Migration]) -> u32 {
    registry.iter().map(|m| m.version).max().unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaStatus {
    pub current: u32,
    pub latest: u32,
    pub pending: Vec<u32>,
}

impl SchemaStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Report the current and target schema versions. Read-only: the legacy
/// table, if still present, is not converted here.
pub fn schema_status(store: &Store) -> Result<SchemaStatus> {
    let current = store.schema_version()?;
    let mut pending: Vec<u32> = MIGRATIONS
        .iter()
        .map(|m| m.version)
        .filter(|v| *v > current)
        .collect();
    pending.sort_unstable();

    Ok(SchemaStatus {
        current,
        latest: latest_version(),
        pending,
    })
}

/// What a runner pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    pub applied: Vec<u32>,
    pub backup: Option<PathBuf>,
    pub legacy_version_adopted: Option<u32>,
}

impl MigrationReport {
    pub fn changed_schema(&self) -> bool {
        !self.applied.is_empty()
    }
}

pub struct MigrationRunner<'r> {
    registry: &'r [Migration],
    backup_path: Option<PathBuf>,
}

impl MigrationRunner<'static> {
    pub fn new() -> Self {
        MigrationRunner {
            registry: MIGRATIONS,
            backup_path: None,
        }
    }
}

impl Default for MigrationRunner<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'r> MigrationRunner<'r> {
    pub fn with_registry(registry: &'r [Migration]) -> Self {
        MigrationRunner {
            registry,
            backup_path: None,
        }
    }

    /// Write the pre-migration backup here instead of `<db>.bak`.
    pub fn backup_to(mut self, path: impl AsRef<Path>) -> Self {
        self.backup_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn run(&self, store: &mut Store) -> Result<MigrationReport> {
        let mut backup = None;
        let mut backed_up = false;
        if legacy::has_legacy_version_table(store)? {
            backup = backup_database(store, self.backup_path.as_deref())?;
            backed_up = true;
        }
        let legacy_version_adopted = legacy::retire_legacy_version_table(store)?;

        let current = store.schema_version()?;
        let mut pending: Vec<&Migration> = self
            .registry
            .iter()
            .filter(|m| m.version > current)
            .collect();
        pending.sort_by_key(|m| m.version);

        let mut report = MigrationReport {
            from_version: current,
            to_version: current,
            backup,
            legacy_version_adopted,
            ..MigrationReport::default()
        };

        let Some(target) = pending.last().map(|m| m.version) else {
            info!(version = current, "database schema is up to date");
            return Ok(report);
        };

        info!(pending = pending.len(), from = current, to = target, "pending schema migrations");

        if !backed_up {
            report.backup = backup_database(store, self.backup_path.as_deref())?;
        }

        let outcome = store.transaction(|tx| {
            for migration in &pending {
                info!(version = migration.version, name = migration.name, "applying migration");
                (migration.apply)(tx).map_err(|source| LedgerError::MigrationApply {
                    version: migration.version,
                    current,
                    source,
                })?;
            }

            write_schema_version(tx, target).map_err(|source| LedgerError::MigrationApply {
                version: target,
                current,
                source,
            })
        });

        if let Err(err) = outcome {
            error!(error = %err, version = current, "migration failed, rolled back");
            return Err(err);
        }

        info!(version = target, "database schema upgraded");
        report.to_version = target;
        report.applied = pending.iter().map(|m| m.version).collect();
        Ok(report)
    }
}

/// Bring `store` to the latest schema. Idempotent; call on every startup.
pub fn run_schema_migrations(store: &mut Store) -> Result<MigrationReport> {
    MigrationRunner::new().run(store)
}
