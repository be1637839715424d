// Schema version 1: base tables, indexes and starter reference data.

use super::Migration;
use rusqlite::{params, Transaction};

pub const MIGRATION: Migration = Migration {
    version: 1,
    name: "init",
    apply,
};

/// Starter categories: (name, colour, icon).
pub const DEFAULT_CATEGORIES: [(&str, &str, &str); 8] = [
    ("Salary", "#22c55e", "pi-wallet"),
    ("Food & Dining", "#f97316", "pi-shopping-cart"),
    ("Transportation", "#3b82f6", "pi-car"),
    ("Entertainment", "#a855f7", "pi-ticket"),
    ("Shopping", "#ec4899", "pi-shopping-bag"),
    ("Bills & Utilities", "#eab308", "pi-bolt"),
    ("Healthcare", "#14b8a6", "pi-heart"),
    ("Other", "#6b7280", "pi-ellipsis-h"),
];

pub const DEFAULT_ACCOUNT_TYPES: [&str; 3] = ["Cash", "Chequing", "Savings"];

pub const DEFAULT_ACCOUNT_NAME: &str = "OneFinance";

fn apply(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS ledger_years (
            year INTEGER PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            colorCode TEXT NOT NULL DEFAULT '#6366f1',
            icon TEXT NOT NULL DEFAULT 'pi-tag'
        );

        CREATE TABLE IF NOT EXISTS accountType (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            type TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            accountName TEXT NOT NULL,
            institutionName TEXT,
            startingBalance REAL NOT NULL,
            accountTypeId INTEGER,
            isDefault BOOLEAN NOT NULL,
            FOREIGN KEY (accountTypeId) REFERENCES accountType(id) ON DELETE SET NULL
        );

        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            amount REAL NOT NULL,
            date TEXT NOT NULL,
            type TEXT NOT NULL CHECK (type IN ('income', 'expense')),
            notes TEXT,
            categoryId INTEGER,
            accountId INTEGER NOT NULL,
            FOREIGN KEY (categoryId) REFERENCES categories(id) ON DELETE SET NULL,
            FOREIGN KEY (accountId) REFERENCES accounts(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_transactions_category ON transactions(categoryId);
        CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(accountId);
        CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);",
    )?;

    seed_default_categories(tx)?;
    seed_default_account_data(tx)?;
    Ok(())
}

fn table_is_empty(tx: &Transaction<'_>, table: &str) -> rusqlite::Result<bool> {
    let count: i64 = tx.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;
    Ok(count == 0)
}

fn seed_default_categories(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    if !table_is_empty(tx, "categories")? {
        return Ok(());
    }

    let mut insert = tx.prepare("INSERT INTO categories (name, colorCode, icon) VALUES (?1, ?2, ?3)")?;
    for (name, color, icon) in DEFAULT_CATEGORIES {
        insert.execute(params![name, color, icon])?;
    }
    Ok(())
}

fn seed_default_account_data(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    if table_is_empty(tx, "accountType")? {
        let mut insert = tx.prepare("INSERT INTO accountType (type) VALUES (?1)")?;
        for label in DEFAULT_ACCOUNT_TYPES {
            insert.execute([label])?;
        }
    }

    if table_is_empty(tx, "accounts")? {
        // The starter account takes the most recently created type
        let account_type_id: Option<i64> =
            tx.query_row("SELECT MAX(id) FROM accountType", [], |row| row.get(0))?;
        tx.execute(
            "INSERT INTO accounts (accountName, institutionName, startingBalance, accountTypeId, isDefault)
             VALUES (?1, NULL, 0, ?2, 1)",
            params![DEFAULT_ACCOUNT_NAME, account_type_id],
        )?;
    }
    Ok(())
}
