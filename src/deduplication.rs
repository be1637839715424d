// 🔍 Deduplication - natural-key matching against the live store
//
// Surrogate ids mean nothing across databases, so "is this record already
// here?" is answered by each kind's natural key:
//
//   AccountType  label
//   Account      (name, institution)   missing institution matches missing
//   Category     name
//   LedgerYear   year
//   Transaction  (title, amount, date)
//
// Names are compared trimmed on both sides, so padding in a bundle or in
// rows written by older builds never splits one record into two.

use crate::crud::ledger_year_exists;
use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};

/// Amounts are REAL columns; two amounts closer than this are the same.
pub const AMOUNT_TOLERANCE: f64 = 1e-6;

/// The stored and compared form of a label or name.
pub fn natural_name(raw: &str) -> &str {
    raw.trim()
}

/// Institution as stored: trimmed, blank means none.
pub fn natural_institution(raw: Option<&str>) -> Option<&str> {
    raw.map(natural_name).filter(|s| !s.is_empty())
}

pub fn find_account_type(conn: &Connection, label: &str) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM accountType WHERE TRIM(type) = ?1 ORDER BY id LIMIT 1",
            [natural_name(label)],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn find_account(conn: &Connection, name: &str, institution: Option<&str>) -> Result<Option<i64>> {
    // `IS` so a NULL institution matches a NULL institution
    Ok(conn
        .query_row(
            "SELECT id FROM accounts
             WHERE TRIM(accountName) = ?1 AND NULLIF(TRIM(institutionName), '') IS ?2
             ORDER BY id LIMIT 1",
            params![natural_name(name), natural_institution(institution)],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn find_category(conn: &Connection, name: &str) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM categories WHERE TRIM(name) = ?1 ORDER BY id LIMIT 1",
            [natural_name(name)],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn find_ledger_year(conn: &Connection, year: i32) -> Result<Option<i32>> {
    Ok(ledger_year_exists(conn, year)?.then_some(year))
}

pub fn find_transaction(conn: &Connection, title: &str, amount: f64, date: &str) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM transactions
             WHERE title = ?1 AND date = ?3 AND ABS(amount - ?2) < ?4
             ORDER BY id LIMIT 1",
            params![title, amount, date, AMOUNT_TOLERANCE],
            |row| row.get(0),
        )
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crud::{get_default_account, insert_account, insert_transaction};
    use crate::db::Store;
    use crate::entities::{NewAccount, NewTransaction, TransactionKind};
    use crate::migrations::run_schema_migrations;

    fn setup_store() -> Store {
        let mut store = Store::open_in_memory().unwrap();
        run_schema_migrations(&mut store).unwrap();
        store
    }

    #[test]
    fn test_reference_data_matches_by_name() {
        let store = setup_store();
        let conn = store.conn();

        assert!(find_account_type(conn, "Savings").unwrap().is_some());
        assert!(find_account_type(conn, "Checking").unwrap().is_none());
        assert!(find_category(conn, "Salary").unwrap().is_some());
        assert!(find_category(conn, "salary").unwrap().is_none());
        assert_eq!(find_ledger_year(conn, 2023).unwrap(), None);
    }

    #[test]
    fn test_padding_is_ignored_on_both_sides() {
        let store = setup_store();
        let conn = store.conn();
        let savings = find_account_type(conn, "Savings").unwrap();

        assert_eq!(find_account_type(conn, "  Savings ").unwrap(), savings);
        assert!(find_category(conn, "Salary\t").unwrap().is_some());

        // A row written padded by an older build still matches
        conn.execute("INSERT INTO accountType (type) VALUES ('Credit Card ')", [])
            .unwrap();
        let padded = conn.last_insert_rowid();
        assert_eq!(find_account_type(conn, "Credit Card").unwrap(), Some(padded));
    }

    #[test]
    fn test_blank_institution_is_no_institution() {
        let store = setup_store();
        let conn = store.conn();
        let seeded = get_default_account(conn).unwrap().unwrap();

        assert_eq!(find_account(conn, &seeded.name, Some("  ")).unwrap(), Some(seeded.id));
        assert_eq!(natural_institution(Some(" Credit Union ")), Some("Credit Union"));
        assert_eq!(natural_institution(Some("")), None);
    }

    #[test]
    fn test_account_matches_on_name_and_institution() {
        let store = setup_store();
        let conn = store.conn();
        let account = insert_account(
            conn,
            &NewAccount {
                name: "Everyday".to_string(),
                institution: Some("Credit Union".to_string()),
                starting_balance: 0.0,
                account_type_id: 1,
                is_default: false,
            },
        )
        .unwrap();

        assert_eq!(find_account(conn, "Everyday", Some("Credit Union")).unwrap(), Some(account.id));
        assert_eq!(find_account(conn, "Everyday", None).unwrap(), None);
        assert_eq!(find_account(conn, "Everyday", Some("Big Bank")).unwrap(), None);

        // Seeded account has no institution
        let seeded = get_default_account(conn).unwrap().unwrap();
        assert_eq!(find_account(conn, &seeded.name, None).unwrap(), Some(seeded.id));
    }

    #[test]
    fn test_transaction_matches_on_title_amount_date() {
        let store = setup_store();
        let conn = store.conn();
        let account_id = get_default_account(conn).unwrap().unwrap().id;
        let tx = insert_transaction(
            conn,
            &NewTransaction {
                title: "Coffee".to_string(),
                amount: 4.5,
                date: "2023-05-01".to_string(),
                kind: TransactionKind::Expense,
                notes: None,
                category_id: None,
                account_id,
            },
        )
        .unwrap();

        assert_eq!(find_transaction(conn, "Coffee", 4.5, "2023-05-01").unwrap(), Some(tx.id));
        assert_eq!(find_transaction(conn, "Coffee", 4.5000000001, "2023-05-01").unwrap(), Some(tx.id));
        assert_eq!(find_transaction(conn, "Coffee", 4.6, "2023-05-01").unwrap(), None);
        assert_eq!(find_transaction(conn, "Coffee", 4.5, "2023-05-02").unwrap(), None);
        assert_eq!(find_transaction(conn, "Tea", 4.5, "2023-05-01").unwrap(), None);
    }
}
