// Schema version 3: every account has an account type.
//
// `accounts.accountTypeId` is nullable with ON DELETE SET NULL, and older
// builds deleted types without checking for users. Accounts left without a
// type are moved to an "Other" type (created only when needed). Triggers then
// refuse to delete a type that is still in use and refuse a NULL type on
// insert or update.

use super::Migration;
use rusqlite::{OptionalExtension, Transaction};
use tracing::info;

pub const MIGRATION: Migration = Migration {
    version: 3,
    name: "account_type_integrity",
    apply,
};

pub const FALLBACK_ACCOUNT_TYPE: &str = "Other";

const ORPHANS: &str = "accountTypeId IS NULL OR accountTypeId NOT IN (SELECT id FROM accountType)";

fn apply(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    let orphans: i64 = tx.query_row(
        &format!("SELECT COUNT(*) FROM accounts WHERE {}", ORPHANS),
        [],
        |row| row.get(0),
    )?;

    if orphans > 0 {
        let fallback = fallback_type_id(tx)?;
        tx.execute(
            &format!("UPDATE accounts SET accountTypeId = ?1 WHERE {}", ORPHANS),
            [fallback],
        )?;
        info!(orphans, account_type_id = fallback, "reassigned accounts without a type");
    }

    tx.execute_batch(
        "CREATE TRIGGER IF NOT EXISTS trg_account_type_in_use
         BEFORE DELETE ON accountType
         WHEN EXISTS (SELECT 1 FROM accounts WHERE accountTypeId = OLD.id)
         BEGIN
             SELECT RAISE(ABORT, 'account type is still used by an account');
         END;

        CREATE TRIGGER IF NOT EXISTS trg_account_requires_type_insert
         BEFORE INSERT ON accounts
         WHEN NEW.accountTypeId IS NULL
         BEGIN
             SELECT RAISE(ABORT, 'account requires an account type');
         END;

        CREATE TRIGGER IF NOT EXISTS trg_account_requires_type_update
         BEFORE UPDATE OF accountTypeId ON accounts
         WHEN NEW.accountTypeId IS NULL
         BEGIN
             SELECT RAISE(ABORT, 'account requires an account type');
         END;",
    )
}

fn fallback_type_id(tx: &Transaction<'_>) -> rusqlite::Result<i64> {
    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM accountType WHERE type = ?1 ORDER BY id LIMIT 1",
            [FALLBACK_ACCOUNT_TYPE],
            |row| row.get(0),
        )
        .optional()?;
    match existing {
        Some(id) => Ok(id),
        None => {
            tx.execute("INSERT INTO accountType (type) VALUES (?1)", [FALLBACK_ACCOUNT_TYPE])?;
            Ok(tx.last_insert_rowid())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crud::{get_account, get_account_type, get_default_account};
    use crate::db::Store;
    use crate::export::export_bundle;
    use crate::merge::{import_with_mode, ImportMode};
    use crate::migrations::{run_schema_migrations, MigrationRunner, MIGRATIONS};

    /// A version-2 store whose default account lost its type.
    fn store_with_orphaned_account() -> (Store, i64) {
        let mut store = Store::open_in_memory().unwrap();
        MigrationRunner::with_registry(&MIGRATIONS[..2])
            .run(&mut store)
            .unwrap();
        let conn = store.conn();
        let account = get_default_account(conn).unwrap().unwrap();
        conn.execute(
            "DELETE FROM accountType WHERE id = ?1",
            [account.account_type_id.unwrap()],
        )
        .unwrap();
        (store, account.id)
    }

    #[test]
    fn test_missing_type_reads_as_none() {
        let (store, account_id) = store_with_orphaned_account();

        let account = get_account(store.conn(), account_id).unwrap();

        assert_eq!(account.account_type_id, None);
    }

    #[test]
    fn test_orphaned_account_moves_to_fallback_type() {
        let (mut store, account_id) = store_with_orphaned_account();

        run_schema_migrations(&mut store).unwrap();

        let conn = store.conn();
        let type_id = get_account(conn, account_id).unwrap().account_type_id.unwrap();
        assert_eq!(get_account_type(conn, type_id).unwrap().label, FALLBACK_ACCOUNT_TYPE);
    }

    #[test]
    fn test_repaired_store_round_trips_through_export() {
        let (mut store, _) = store_with_orphaned_account();
        run_schema_migrations(&mut store).unwrap();
        let bundle = export_bundle(store.conn()).unwrap();

        let mut target = Store::open_in_memory().unwrap();
        run_schema_migrations(&mut target).unwrap();
        let summary = import_with_mode(&mut target, bundle, ImportMode::Replace).unwrap();

        assert_eq!(summary.accounts.inserted, 1);
        let imported = get_default_account(target.conn()).unwrap().unwrap();
        let type_id = imported.account_type_id.unwrap();
        assert_eq!(
            get_account_type(target.conn(), type_id).unwrap().label,
            FALLBACK_ACCOUNT_TYPE
        );
    }

    #[test]
    fn test_type_in_use_cannot_be_deleted_directly() {
        let mut store = Store::open_in_memory().unwrap();
        run_schema_migrations(&mut store).unwrap();
        let conn = store.conn();
        let account = get_default_account(conn).unwrap().unwrap();

        let deleted = conn.execute(
            "DELETE FROM accountType WHERE id = ?1",
            [account.account_type_id.unwrap()],
        );
        assert!(deleted.is_err());

        let nulled = conn.execute(
            "UPDATE accounts SET accountTypeId = NULL WHERE id = ?1",
            [account.id],
        );
        assert!(nulled.is_err());
        assert!(get_account(conn, account.id).unwrap().account_type_id.is_some());
    }

    #[test]
    fn test_no_fallback_type_without_orphans() {
        let mut store = Store::open_in_memory().unwrap();
        run_schema_migrations(&mut store).unwrap();

        let fallback: i64 = store
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM accountType WHERE type = ?1",
                [FALLBACK_ACCOUNT_TYPE],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(fallback, 0);
    }
}
