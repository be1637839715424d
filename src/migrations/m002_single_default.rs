// Schema version 2: at most one default account, enforced by the store.
//
// Existing rows are normalised first: the lowest-id default survives, and if
// no account is default the lowest-id account is promoted. Then a partial
// unique index makes a second `isDefault = 1` row impossible.

use super::Migration;
use rusqlite::Transaction;

pub const MIGRATION: Migration = Migration {
    version: 2,
    name: "single_default_account",
    apply,
};

fn apply(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        "UPDATE accounts SET isDefault = 0
         WHERE isDefault <> 0
           AND id <> (SELECT MIN(id) FROM accounts WHERE isDefault <> 0);

        UPDATE accounts SET isDefault = 1
         WHERE id = (SELECT MIN(id) FROM accounts)
           AND NOT EXISTS (SELECT 1 FROM accounts WHERE isDefault <> 0);

        CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_single_default
            ON accounts(isDefault) WHERE isDefault = 1;",
    )
}
