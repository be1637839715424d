// ✏️ Entity CRUD
// Single-entity create/read/update/delete over a plain connection.
//
// Every function takes `&Connection`, so it works standalone or inside an
// outer transaction (a `rusqlite::Transaction` derefs to `Connection`).
// Multi-statement operations use a savepoint so they land whole either way.

use crate::db::{delete_all, get_by_id, list_all, with_savepoint, Entity};
use crate::deduplication::{natural_institution, natural_name};
use crate::entities::{
    Account, AccountType, Category, EntityKind, LedgerPeriod, LedgerYear, NewAccount, NewCategory,
    NewTransaction, Transaction, TransactionView,
};
use crate::error::{LedgerError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

// ============================================================================
// ACCOUNT TYPES
// ============================================================================

pub fn get_all_account_types(conn: &Connection) -> Result<Vec<AccountType>> {
    list_all(conn)
}

pub fn get_account_type(conn: &Connection, id: i64) -> Result<AccountType> {
    get_by_id(conn, id)
}

pub fn insert_account_type(conn: &Connection, label: &str) -> Result<AccountType> {
    let label = natural_name(label);
    if label.is_empty() {
        return Err(LedgerError::InvalidInput(
            "account type label must not be empty".to_string(),
        ));
    }
    conn.execute("INSERT INTO accountType (type) VALUES (?1)", [label])?;
    Ok(AccountType {
        id: conn.last_insert_rowid(),
        label: label.to_string(),
    })
}

pub fn update_account_type(conn: &Connection, id: i64, label: &str) -> Result<AccountType> {
    let label = natural_name(label);
    if label.is_empty() {
        return Err(LedgerError::InvalidInput(
            "account type label must not be empty".to_string(),
        ));
    }
    let changed = conn.execute("UPDATE accountType SET type = ?1 WHERE id = ?2", params![label, id])?;
    ensure_found(changed, EntityKind::AccountType, id)?;
    get_account_type(conn, id)
}

/// Refused while any account still has this type.
pub fn delete_account_type(conn: &Connection, id: i64) -> Result<()> {
    let dependents: i64 = conn.query_row(
        "SELECT COUNT(*) FROM accounts WHERE accountTypeId = ?1",
        [id],
        |row| row.get(0),
    )?;
    if dependents > 0 {
        return Err(LedgerError::InUse {
            kind: EntityKind::AccountType,
            id,
            dependents,
        });
    }
    let changed = conn.execute("DELETE FROM accountType WHERE id = ?1", [id])?;
    ensure_found(changed, EntityKind::AccountType, id)
}

// ============================================================================
// ACCOUNTS
// ============================================================================

/// What happens to an account's transactions when it is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountRemoval {
    /// Move every transaction to another account.
    TransferTo(i64),
    DeleteTransactions,
}

pub fn get_all_accounts(conn: &Connection) -> Result<Vec<Account>> {
    list_all(conn)
}

pub fn get_account(conn: &Connection, id: i64) -> Result<Account> {
    get_by_id(conn, id)
}

pub fn get_default_account(conn: &Connection) -> Result<Option<Account>> {
    let sql = format!("SELECT {} FROM accounts WHERE isDefault = 1", Account::COLUMNS);
    Ok(conn.query_row(&sql, [], Account::from_row).optional()?)
}

/// Insert an account. A new default takes over from the old one.
pub fn insert_account(conn: &Connection, account: &NewAccount) -> Result<Account> {
    account.validate()?;
    get_account_type(conn, account.account_type_id)?;

    with_savepoint(conn, "insert_account", |conn| {
        if account.is_default {
            clear_default(conn)?;
        }
        conn.execute(
            "INSERT INTO accounts (accountName, institutionName, startingBalance, accountTypeId, isDefault)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                natural_name(&account.name),
                natural_institution(account.institution.as_deref()),
                account.starting_balance,
                account.account_type_id,
                account.is_default
            ],
        )?;
        get_account(conn, conn.last_insert_rowid())
    })
}

/// Update an account. Passing `is_default = true` makes it the default;
/// the current default is never demoted here, use `set_default_account` on
/// another account instead.
pub fn update_account(conn: &Connection, id: i64, account: &NewAccount) -> Result<Account> {
    account.validate()?;
    let existing = get_account(conn, id)?;
    get_account_type(conn, account.account_type_id)?;
    let is_default = account.is_default || existing.is_default;

    with_savepoint(conn, "update_account", |conn| {
        if is_default && !existing.is_default {
            clear_default(conn)?;
        }
        conn.execute(
            "UPDATE accounts
             SET accountName = ?1, institutionName = ?2, startingBalance = ?3, accountTypeId = ?4, isDefault = ?5
             WHERE id = ?6",
            params![
                natural_name(&account.name),
                natural_institution(account.institution.as_deref()),
                account.starting_balance,
                account.account_type_id,
                is_default,
                id
            ],
        )?;
        get_account(conn, id)
    })
}

/// Clear the old default, then set the new one, as one step.
pub fn set_default_account(conn: &Connection, id: i64) -> Result<Account> {
    get_account(conn, id)?;
    with_savepoint(conn, "set_default_account", |conn| {
        clear_default(conn)?;
        conn.execute("UPDATE accounts SET isDefault = 1 WHERE id = ?1", [id])?;
        info!(account_id = id, "default account changed");
        get_account(conn, id)
    })
}

/// If accounts exist but none is the default, promote the lowest id.
/// Returns the promoted account's id.
pub fn ensure_default_account(conn: &Connection) -> Result<Option<i64>> {
    if get_default_account(conn)?.is_some() {
        return Ok(None);
    }
    let first: Option<i64> = conn.query_row("SELECT MIN(id) FROM accounts", [], |row| row.get(0))?;
    if let Some(id) = first {
        conn.execute("UPDATE accounts SET isDefault = 1 WHERE id = ?1", [id])?;
        info!(account_id = id, "promoted account to default");
    }
    Ok(first)
}

fn clear_default(conn: &Connection) -> Result<()> {
    conn.execute("UPDATE accounts SET isDefault = 0 WHERE isDefault = 1", [])?;
    Ok(())
}

/// Delete an account, disposing of its transactions per `removal`. The
/// last remaining account cannot be deleted. If the deleted account was the
/// default, the transfer target (or else the first remaining account)
/// inherits the flag.
pub fn delete_account(conn: &Connection, id: i64, removal: AccountRemoval) -> Result<()> {
    let account = get_account(conn, id)?;

    let total: i64 = conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
    if total <= 1 {
        return Err(LedgerError::InvalidInput(format!(
            "cannot delete '{}': it is the only account",
            account.name
        )));
    }

    if let AccountRemoval::TransferTo(target) = removal {
        if target == id {
            return Err(LedgerError::InvalidInput(
                "cannot transfer transactions to the account being deleted".to_string(),
            ));
        }
        get_account(conn, target)?;
    }

    with_savepoint(conn, "delete_account", |conn| {
        let moved = match removal {
            AccountRemoval::TransferTo(target) => conn.execute(
                "UPDATE transactions SET accountId = ?1 WHERE accountId = ?2",
                params![target, id],
            )?,
            AccountRemoval::DeleteTransactions => {
                conn.execute("DELETE FROM transactions WHERE accountId = ?1", [id])?
            }
        };
        conn.execute("DELETE FROM accounts WHERE id = ?1", [id])?;

        if account.is_default {
            let heir = match removal {
                AccountRemoval::TransferTo(target) => target,
                AccountRemoval::DeleteTransactions => {
                    conn.query_row("SELECT MIN(id) FROM accounts", [], |row| row.get(0))?
                }
            };
            conn.execute("UPDATE accounts SET isDefault = 1 WHERE id = ?1", [heir])?;
            info!(account_id = heir, "default account reassigned");
        }

        info!(account_id = id, ?removal, transactions = moved, "account deleted");
        Ok(())
    })
}

// ============================================================================
// CATEGORIES
// ============================================================================

pub fn get_all_categories(conn: &Connection) -> Result<Vec<Category>> {
    list_all(conn)
}

pub fn get_category(conn: &Connection, id: i64) -> Result<Category> {
    get_by_id(conn, id)
}

pub fn insert_category(conn: &Connection, category: &NewCategory) -> Result<Category> {
    category.validate()?;
    conn.execute(
        "INSERT INTO categories (name, colorCode, icon) VALUES (?1, ?2, ?3)",
        params![natural_name(&category.name), category.color_code, category.icon],
    )?;
    get_category(conn, conn.last_insert_rowid())
}

pub fn update_category(conn: &Connection, id: i64, category: &NewCategory) -> Result<Category> {
    category.validate()?;
    let changed = conn.execute(
        "UPDATE categories SET name = ?1, colorCode = ?2, icon = ?3 WHERE id = ?4",
        params![natural_name(&category.name), category.color_code, category.icon, id],
    )?;
    ensure_found(changed, EntityKind::Category, id)?;
    get_category(conn, id)
}

/// Transactions in the category become uncategorised.
pub fn delete_category(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("DELETE FROM categories WHERE id = ?1", [id])?;
    ensure_found(changed, EntityKind::Category, id)
}

// ============================================================================
// LEDGER YEARS
// ============================================================================

pub fn get_all_ledger_years(conn: &Connection) -> Result<Vec<LedgerYear>> {
    list_all(conn)
}

pub fn ledger_year_exists(conn: &Connection, year: i32) -> Result<bool> {
    let found: Option<i32> = conn
        .query_row("SELECT year FROM ledger_years WHERE year = ?1", [year], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

/// Open a year for bookkeeping. Opening an open year is a no-op.
pub fn insert_ledger_year(conn: &Connection, year: i32) -> Result<LedgerYear> {
    conn.execute("INSERT OR IGNORE INTO ledger_years (year) VALUES (?1)", [year])?;
    Ok(LedgerYear::new(year))
}

pub fn delete_ledger_year(conn: &Connection, year: i32, delete_transactions: bool) -> Result<()> {
    if !ledger_year_exists(conn, year)? {
        return Err(LedgerError::NotFound {
            kind: EntityKind::LedgerYear,
            id: i64::from(year),
        });
    }
    with_savepoint(conn, "delete_ledger_year", |conn| {
        if delete_transactions {
            let removed = conn.execute(
                "DELETE FROM transactions WHERE substr(date, 1, 4) = ?1",
                [LedgerPeriod::Year(year).date_prefix()],
            )?;
            debug!(year, removed, "deleted transactions of ledger year");
        }
        conn.execute("DELETE FROM ledger_years WHERE year = ?1", [year])?;
        Ok(())
    })
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

const VIEW_SELECT: &str = "SELECT t.id, t.title, t.amount, t.date, t.type, t.notes, t.categoryId, t.accountId,
            c.name, c.colorCode, c.icon
     FROM transactions t
     LEFT JOIN categories c ON c.id = t.categoryId";

fn view_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TransactionView> {
    Ok(TransactionView {
        transaction: Transaction::from_row(row)?,
        category_name: row.get(8)?,
        category_color: row.get(9)?,
        category_icon: row.get(10)?,
    })
}

pub fn get_all_transactions(conn: &Connection) -> Result<Vec<Transaction>> {
    list_all(conn)
}

/// Transactions in `period` with their category display fields, newest first.
pub fn get_transaction_views(conn: &Connection, period: LedgerPeriod) -> Result<Vec<TransactionView>> {
    let sql = format!(
        "{} WHERE t.date LIKE ?1 || '%' ORDER BY t.date DESC, t.id DESC",
        VIEW_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let views = stmt
        .query_map([period.date_prefix()], view_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(views)
}

pub fn get_transaction(conn: &Connection, id: i64) -> Result<TransactionView> {
    let sql = format!("{} WHERE t.id = ?1", VIEW_SELECT);
    conn.query_row(&sql, [id], view_from_row)
        .optional()?
        .ok_or(LedgerError::NotFound {
            kind: EntityKind::Transaction,
            id,
        })
}

fn check_transaction_refs(conn: &Connection, tx: &NewTransaction) -> Result<()> {
    get_account(conn, tx.account_id)?;
    if let Some(category_id) = tx.category_id {
        get_category(conn, category_id)?;
    }
    Ok(())
}

pub fn insert_transaction(conn: &Connection, tx: &NewTransaction) -> Result<Transaction> {
    tx.validate()?;
    check_transaction_refs(conn, tx)?;
    conn.execute(
        "INSERT INTO transactions (title, amount, date, type, notes, categoryId, accountId)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![tx.title, tx.amount, tx.date, tx.kind, tx.notes, tx.category_id, tx.account_id],
    )?;
    get_by_id(conn, conn.last_insert_rowid())
}

pub fn update_transaction(conn: &Connection, id: i64, tx: &NewTransaction) -> Result<Transaction> {
    tx.validate()?;
    check_transaction_refs(conn, tx)?;
    let changed = conn.execute(
        "UPDATE transactions
         SET title = ?1, amount = ?2, date = ?3, type = ?4, notes = ?5, categoryId = ?6, accountId = ?7
         WHERE id = ?8",
        params![tx.title, tx.amount, tx.date, tx.kind, tx.notes, tx.category_id, tx.account_id, id],
    )?;
    ensure_found(changed, EntityKind::Transaction, id)?;
    get_by_id(conn, id)
}

pub fn delete_transaction(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("DELETE FROM transactions WHERE id = ?1", [id])?;
    ensure_found(changed, EntityKind::Transaction, id)
}

// ============================================================================
// WIPE
// ============================================================================

/// Empty every entity table, dependents first. Used by replace-mode import.
pub fn wipe_all(conn: &Connection) -> Result<usize> {
    let removed = delete_all::<Transaction>(conn)?
        + delete_all::<LedgerYear>(conn)?
        + delete_all::<Category>(conn)?
        + delete_all::<Account>(conn)?
        + delete_all::<AccountType>(conn)?;
    info!(removed, "wiped all ledger data");
    Ok(removed)
}

fn ensure_found(changed: usize, kind: EntityKind, id: i64) -> Result<()> {
    if changed == 0 {
        Err(LedgerError::NotFound { kind, id })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count, Store};
    use crate::entities::TransactionKind;
    use crate::migrations::run_schema_migrations;

    fn setup_store() -> Store {
        let mut store = Store::open_in_memory().unwrap();
        run_schema_migrations(&mut store).unwrap();
        store
    }

    fn new_account(name: &str, account_type_id: i64, is_default: bool) -> NewAccount {
        NewAccount {
            name: name.to_string(),
            institution: None,
            starting_balance: 100.0,
            account_type_id,
            is_default,
        }
    }

    fn new_tx(title: &str, amount: f64, date: &str, account_id: i64) -> NewTransaction {
        NewTransaction {
            title: title.to_string(),
            amount,
            date: date.to_string(),
            kind: TransactionKind::Expense,
            notes: None,
            category_id: None,
            account_id,
        }
    }

    fn default_id(conn: &Connection) -> i64 {
        get_default_account(conn).unwrap().unwrap().id
    }

    #[test]
    fn test_new_default_account_replaces_old_default() {
        let store = setup_store();
        let conn = store.conn();
        let seeded = default_id(conn);

        let savings = insert_account(conn, &new_account("Savings", 1, true)).unwrap();

        assert!(savings.is_default);
        assert_eq!(default_id(conn), savings.id);
        assert!(!get_account(conn, seeded).unwrap().is_default);
    }

    #[test]
    fn test_names_are_stored_trimmed() {
        let store = setup_store();
        let conn = store.conn();
        let mut padded = new_account("  Travel ", 1, false);
        padded.institution = Some(" ".to_string());

        let account = insert_account(conn, &padded).unwrap();
        let category = insert_category(conn, &NewCategory::named("Coffee  ")).unwrap();
        let account_type = insert_account_type(conn, " Credit Card").unwrap();

        assert_eq!(account.name, "Travel");
        assert_eq!(account.institution, None);
        assert_eq!(category.name, "Coffee");
        assert_eq!(get_account_type(conn, account_type.id).unwrap().label, "Credit Card");
    }

    #[test]
    fn test_set_default_account() {
        let store = setup_store();
        let conn = store.conn();
        let other = insert_account(conn, &new_account("Travel", 1, false)).unwrap();

        set_default_account(conn, other.id).unwrap();

        let defaults: Vec<_> = get_all_accounts(conn)
            .unwrap()
            .into_iter()
            .filter(|a| a.is_default)
            .collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, other.id);
    }

    #[test]
    fn test_update_never_demotes_the_default() {
        let store = setup_store();
        let conn = store.conn();
        let seeded = get_account(conn, default_id(conn)).unwrap();

        let edit = new_account("Main", seeded.account_type_id.unwrap(), false);
        let updated = update_account(conn, seeded.id, &edit).unwrap();

        assert_eq!(updated.name, "Main");
        assert!(updated.is_default);
    }

    #[test]
    fn test_ensure_default_account_promotes_lowest_id() {
        let store = setup_store();
        let conn = store.conn();
        let seeded = default_id(conn);
        insert_account(conn, &new_account("Travel", 1, false)).unwrap();

        assert_eq!(ensure_default_account(conn).unwrap(), None);

        conn.execute("UPDATE accounts SET isDefault = 0", []).unwrap();
        assert_eq!(ensure_default_account(conn).unwrap(), Some(seeded));
        assert_eq!(default_id(conn), seeded);
    }

    #[test]
    fn test_cannot_delete_only_account() {
        let store = setup_store();
        let conn = store.conn();

        let err = delete_account(conn, default_id(conn), AccountRemoval::DeleteTransactions).unwrap_err();

        assert!(matches!(err, LedgerError::InvalidInput(_)));
        assert_eq!(count::<Account>(conn).unwrap(), 1);
    }

    #[test]
    fn test_delete_default_account_transfers_transactions_and_flag() {
        let store = setup_store();
        let conn = store.conn();
        let seeded = default_id(conn);
        let other = insert_account(conn, &new_account("Travel", 1, false)).unwrap();
        insert_transaction(conn, &new_tx("Coffee", 4.5, "2023-05-01", seeded)).unwrap();

        delete_account(conn, seeded, AccountRemoval::TransferTo(other.id)).unwrap();

        let txs = get_all_transactions(conn).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].account_id, other.id);
        assert_eq!(default_id(conn), other.id);
    }

    #[test]
    fn test_delete_account_with_its_transactions() {
        let store = setup_store();
        let conn = store.conn();
        let other = insert_account(conn, &new_account("Travel", 1, false)).unwrap();
        insert_transaction(conn, &new_tx("Train", 30.0, "2023-06-01", other.id)).unwrap();

        delete_account(conn, other.id, AccountRemoval::DeleteTransactions).unwrap();

        assert_eq!(count::<Transaction>(conn).unwrap(), 0);
        assert_eq!(count::<Account>(conn).unwrap(), 1);
    }

    #[test]
    fn test_account_type_in_use_cannot_be_deleted() {
        let store = setup_store();
        let conn = store.conn();
        let used = get_account(conn, default_id(conn)).unwrap().account_type_id.unwrap();

        let err = delete_account_type(conn, used).unwrap_err();
        assert!(matches!(err, LedgerError::InUse { dependents: 1, .. }));

        let spare = insert_account_type(conn, "Credit Card").unwrap();
        delete_account_type(conn, spare.id).unwrap();
    }

    #[test]
    fn test_deleting_category_uncategorises_transactions() {
        let store = setup_store();
        let conn = store.conn();
        let coffee = insert_category(conn, &NewCategory::named("Coffee")).unwrap();
        let mut tx = new_tx("Latte", 5.0, "2024-01-03", default_id(conn));
        tx.category_id = Some(coffee.id);
        let tx = insert_transaction(conn, &tx).unwrap();

        assert_eq!(get_transaction(conn, tx.id).unwrap().category_name.as_deref(), Some("Coffee"));
        delete_category(conn, coffee.id).unwrap();

        let view = get_transaction(conn, tx.id).unwrap();
        assert_eq!(view.transaction.category_id, None);
        assert_eq!(view.category_name, None);
    }

    #[test]
    fn test_transaction_rejects_unknown_account() {
        let store = setup_store();
        let err = insert_transaction(store.conn(), &new_tx("Ghost", 1.0, "2024-01-01", 999)).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { kind: EntityKind::Account, id: 999 }));
    }

    #[test]
    fn test_transaction_views_filtered_by_period() {
        let store = setup_store();
        let conn = store.conn();
        let account = default_id(conn);
        insert_transaction(conn, &new_tx("Jan", 1.0, "2023-01-15", account)).unwrap();
        insert_transaction(conn, &new_tx("May", 2.0, "2023-05-01", account)).unwrap();
        insert_transaction(conn, &new_tx("Next", 3.0, "2024-05-01", account)).unwrap();

        let titles = |period| -> Vec<String> {
            get_transaction_views(conn, period)
                .unwrap()
                .into_iter()
                .map(|v| v.transaction.title)
                .collect()
        };

        assert_eq!(titles(LedgerPeriod::All), vec!["Next", "May", "Jan"]);
        assert_eq!(titles(LedgerPeriod::Year(2023)), vec!["May", "Jan"]);
        assert_eq!(titles(LedgerPeriod::Month(2023, 5)), vec!["May"]);
    }

    #[test]
    fn test_ledger_years() {
        let store = setup_store();
        let conn = store.conn();
        insert_ledger_year(conn, 2023).unwrap();
        insert_ledger_year(conn, 2024).unwrap();
        insert_ledger_year(conn, 2023).unwrap();
        insert_transaction(conn, &new_tx("Old", 1.0, "2023-02-02", default_id(conn))).unwrap();
        insert_transaction(conn, &new_tx("New", 1.0, "2024-02-02", default_id(conn))).unwrap();

        assert_eq!(
            get_all_ledger_years(conn).unwrap(),
            vec![LedgerYear::new(2024), LedgerYear::new(2023)]
        );

        delete_ledger_year(conn, 2023, true).unwrap();

        assert!(!ledger_year_exists(conn, 2023).unwrap());
        let remaining = get_all_transactions(conn).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].title, "New");
    }

    #[test]
    fn test_wipe_all_empties_every_table() {
        let store = setup_store();
        let conn = store.conn();
        insert_ledger_year(conn, 2024).unwrap();
        insert_transaction(conn, &new_tx("Coffee", 4.5, "2024-05-01", default_id(conn))).unwrap();

        wipe_all(conn).unwrap();

        assert_eq!(count::<Transaction>(conn).unwrap(), 0);
        assert_eq!(count::<Account>(conn).unwrap(), 0);
        assert_eq!(count::<AccountType>(conn).unwrap(), 0);
        assert_eq!(count::<Category>(conn).unwrap(), 0);
        assert_eq!(count::<LedgerYear>(conn).unwrap(), 0);
    }
}
