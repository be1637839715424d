// Bundle data migrations
//
// Exports from older databases may predate constraints the current schema
// enforces. Before verification, a bundle is walked through every data
// transform newer than its `databaseVersion`, then stamped with the latest
// version.

use super::latest_version;
use crate::bundle::Bundle;
use tracing::info;

pub struct DataMigration {
    pub version: u32,
    pub name: &'static str,
    pub run: fn(Bundle) -> Bundle,
}

pub const DATA_MIGRATIONS: &[DataMigration] = &[DataMigration {
    version: 2,
    name: "single_default_account",
    run: keep_first_default_account,
}];

/// Upgrade `bundle` to the current data shape. Bundles without a version
/// are treated as version 0.
pub fn upgrade_bundle(bundle: Bundle) -> Bundle {
    let from = bundle.database_version.unwrap_or(0);
    let target = latest_version();
    if from >= target {
        return bundle;
    }

    info!(from, to = target, "upgrading imported bundle");

    let mut pending: Vec<&DataMigration> =
        DATA_MIGRATIONS.iter().filter(|m| m.version > from).collect();
    pending.sort_by_key(|m| m.version);

    let mut upgraded = bundle;
    for migration in pending {
        info!(version = migration.version, name = migration.name, "transforming bundle");
        upgraded = (migration.run)(upgraded);
    }
    upgraded.database_version = Some(target);
    upgraded
}

/// Schema version 2 allows one default account; the first one listed keeps
/// its flag.
fn keep_first_default_account(mut bundle: Bundle) -> Bundle {
    if let Some(accounts) = bundle.accounts.as_mut() {
        let mut seen_default = false;
        for account in accounts.iter_mut() {
            if account.is_default == Some(true) {
                if seen_default {
                    account.is_default = Some(false);
                }
                seen_default = true;
            }
        }
    }
    bundle
}
