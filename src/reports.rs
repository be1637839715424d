// 📊 Reports - read-only dashboard projections
// Sums and breakdowns over a ledger period. Nothing here writes.

use crate::entities::{LedgerPeriod, TransactionKind};
use crate::error::Result;
use rusqlite::{params, Connection};
use serde::Serialize;

pub const UNCATEGORIZED_NAME: &str = "Uncategorized";
pub const UNCATEGORIZED_COLOR: &str = "#9ca3af";
pub const UNCATEGORIZED_ICON: &str = "pi-tag";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSummary {
    pub total_income: f64,
    pub total_expenses: f64,
    /// Income minus expenses.
    pub balance: f64,
    pub transaction_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBreakdown {
    pub category_id: Option<i64>,
    pub category_name: String,
    pub category_color: String,
    pub category_icon: String,
    pub total: f64,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    pub account_id: i64,
    pub account_name: String,
    pub starting_balance: f64,
    pub income: f64,
    pub expenses: f64,
    pub balance: f64,
}

pub fn period_summary(conn: &Connection, period: LedgerPeriod) -> Result<PeriodSummary> {
    let (income, expenses, count): (f64, f64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(CASE WHEN type = 'income' THEN amount END), 0),
                COALESCE(SUM(CASE WHEN type = 'expense' THEN amount END), 0),
                COUNT(*)
         FROM transactions
         WHERE date LIKE ?1 || '%'",
        [period.date_prefix()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    Ok(PeriodSummary {
        total_income: income,
        total_expenses: expenses,
        balance: income - expenses,
        transaction_count: count,
    })
}

/// Totals per category for one transaction kind, largest first.
/// Uncategorised transactions share one bucket.
pub fn category_breakdown(
    conn: &Connection,
    period: LedgerPeriod,
    kind: TransactionKind,
) -> Result<Vec<CategoryBreakdown>> {
    let mut stmt = conn.prepare(
        "SELECT t.categoryId,
                COALESCE(c.name, ?3), COALESCE(c.colorCode, ?4), COALESCE(c.icon, ?5),
                SUM(t.amount), COUNT(*)
         FROM transactions t
         LEFT JOIN categories c ON c.id = t.categoryId
         WHERE t.type = ?1 AND t.date LIKE ?2 || '%'
         GROUP BY t.categoryId
         ORDER BY SUM(t.amount) DESC, t.categoryId",
    )?;

    let rows = stmt
        .query_map(
            params![
                kind,
                period.date_prefix(),
                UNCATEGORIZED_NAME,
                UNCATEGORIZED_COLOR,
                UNCATEGORIZED_ICON
            ],
            |row| {
                Ok(CategoryBreakdown {
                    category_id: row.get(0)?,
                    category_name: row.get(1)?,
                    category_color: row.get(2)?,
                    category_icon: row.get(3)?,
                    total: row.get(4)?,
                    count: row.get(5)?,
                })
            },
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Starting balance plus all income minus all expenses, per account.
pub fn account_balances(conn: &Connection) -> Result<Vec<AccountBalance>> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.accountName, a.startingBalance,
                COALESCE(SUM(CASE WHEN t.type = 'income' THEN t.amount END), 0),
                COALESCE(SUM(CASE WHEN t.type = 'expense' THEN t.amount END), 0)
         FROM accounts a
         LEFT JOIN transactions t ON t.accountId = a.id
         GROUP BY a.id
         ORDER BY a.accountName",
    )?;

    let rows = stmt
        .query_map([], |row| {
            let starting_balance: f64 = row.get(2)?;
            let income: f64 = row.get(3)?;
            let expenses: f64 = row.get(4)?;
            Ok(AccountBalance {
                account_id: row.get(0)?,
                account_name: row.get(1)?,
                starting_balance,
                income,
                expenses,
                balance: starting_balance + income - expenses,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
