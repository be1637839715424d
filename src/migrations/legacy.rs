// Legacy version-table adapter
//
// Early builds tracked the schema version as a row in an ordinary `version`
// table. This pre-step adopts that value into the store-level marker and
// drops the table, in one transaction. Once the table is gone the check is
// a cheap no-op. Delete this module when no supported install predates the
// marker.

use crate::db::{table_exists, write_schema_version, Store};
use crate::error::Result;
use rusqlite::OptionalExtension;
use tracing::info;

pub const LEGACY_VERSION_TABLE: &str = "version";

pub fn has_legacy_version_table(store: &Store) -> Result<bool> {
    Ok(table_exists(store.conn(), LEGACY_VERSION_TABLE)?)
}

/// Returns the adopted version when a legacy table held one.
pub fn retire_legacy_version_table(store: &mut Store) -> Result<Option<u32>> {
    if !has_legacy_version_table(store)? {
        return Ok(None);
    }

    info!("found legacy 'version' table, moving it to the schema version marker");

    store.transaction(|tx| {
        let raw: Option<f64> = tx
            .query_row("SELECT version FROM version LIMIT 1", [], |row| {
                row.get::<_, Option<f64>>(0)
            })
            .optional()?
            .flatten();

        let adopted = raw.map(floor_version);
        if let Some(version) = adopted {
            write_schema_version(tx, version)?;
            info!(version, "adopted legacy schema version");
        }

        tx.execute_batch("DROP TABLE version")?;
        info!("dropped legacy 'version' table");
        Ok(adopted)
    })
}

/// Legacy values were stored as reals ("2.0"); the marker is a whole number
/// that SQLite keeps as a signed 32-bit int.
fn floor_version(raw: f64) -> u32 {
    if !raw.is_finite() || raw <= 0.0 {
        return 0;
    }
    let floored = raw.floor();
    if floored >= i32::MAX as f64 {
        i32::MAX as u32
    } else {
        floored as u32
    }
}
