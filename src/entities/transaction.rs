// 💸 Transaction Entity - one dated income or expense
//
// `amount` is always a non-negative magnitude; the direction lives in `kind`.
// Natural key for de-duplication: (title, amount, date).

use crate::db::Entity;
use crate::entities::EntityKind;
use crate::error::{LedgerError, Result};
use chrono::{Datelike, NaiveDate};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// TRANSACTION KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown transaction type '{0}', expected 'income' or 'expense'")]
pub struct UnknownTransactionKind(pub String);

impl FromStr for TransactionKind {
    type Err = UnknownTransactionKind;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "income" => Ok(TransactionKind::Income),
            "expense" => Ok(TransactionKind::Expense),
            other => Err(UnknownTransactionKind(other.to_string())),
        }
    }
}

impl ToSql for TransactionKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

// ============================================================================
// TRANSACTION ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub title: String,
    pub amount: f64,
    pub date: String,
    pub kind: TransactionKind,
    pub notes: Option<String>,
    pub category_id: Option<i64>,
    pub account_id: i64,
}

impl Transaction {
    /// Amount with direction applied: income positive, expense negative.
    pub fn signed_amount(&self) -> f64 {
        match self.kind {
            TransactionKind::Income => self.amount,
            TransactionKind::Expense => -self.amount,
        }
    }

    /// Ledger year the transaction falls into, if its date parses.
    pub fn year(&self) -> Option<i32> {
        parse_date(&self.date).map(|d| d.year())
    }

    pub fn natural_key(&self) -> (&str, f64, &str) {
        (&self.title, self.amount, &self.date)
    }
}

impl Entity for Transaction {
    const KIND: EntityKind = EntityKind::Transaction;
    const TABLE: &'static str = "transactions";
    const COLUMNS: &'static str = "id, title, amount, date, type, notes, categoryId, accountId";
    const ORDER_BY: &'static str = "date DESC, id DESC";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Transaction {
            id: row.get(0)?,
            title: row.get(1)?,
            amount: row.get(2)?,
            date: row.get(3)?,
            kind: row.get(4)?,
            notes: row.get(5)?,
            category_id: row.get(6)?,
            account_id: row.get(7)?,
        })
    }
}

/// A transaction joined with the display fields of its category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub category_name: Option<String>,
    pub category_color: Option<String>,
    pub category_icon: Option<String>,
}

// ============================================================================
// NEW TRANSACTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub title: String,
    pub amount: f64,
    pub date: String,
    pub kind: TransactionKind,
    pub notes: Option<String>,
    pub category_id: Option<i64>,
    pub account_id: i64,
}

impl NewTransaction {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(LedgerError::InvalidInput(
                "transaction title must not be empty".to_string(),
            ));
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(LedgerError::InvalidInput(format!(
                "transaction '{}' amount must be a non-negative magnitude, got {}",
                self.title, self.amount
            )));
        }
        if parse_date(&self.date).is_none() {
            return Err(LedgerError::InvalidInput(format!(
                "transaction '{}' date '{}' is not YYYY-MM-DD",
                self.title, self.date
            )));
        }
        Ok(())
    }
}

pub fn parse_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date, DATE_FORMAT).ok()
}
