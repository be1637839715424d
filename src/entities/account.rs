// 💳 Account Entity - where money lives
//
// An Account belongs to an AccountType ("Cash", "Chequing", ...) and carries
// its opening balance. Exactly one account is the default at any time:
// setting a new default clears the old one first, and a partial unique
// index (schema version 2) rejects a second default outright.

use crate::db::Entity;
use crate::entities::EntityKind;
use crate::error::{LedgerError, Result};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

// ============================================================================
// ACCOUNT TYPE
// ============================================================================

/// Free-form account classification. The label doubles as the natural key
/// when two databases are folded together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountType {
    pub id: i64,
    pub label: String,
}

impl Entity for AccountType {
    const KIND: EntityKind = EntityKind::AccountType;
    const TABLE: &'static str = "accountType";
    const COLUMNS: &'static str = "id, type";
    const ORDER_BY: &'static str = "type";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(AccountType {
            id: row.get(0)?,
            label: row.get(1)?,
        })
    }
}

// ============================================================================
// ACCOUNT ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub institution: Option<String>,
    pub starting_balance: f64,
    /// NULL when the type row was removed behind the ledger's back; schema
    /// version 3 reassigns such accounts and blocks new orphans.
    pub account_type_id: Option<i64>,
    pub is_default: bool,
}

impl Account {
    /// Natural key: (name, institution).
    pub fn natural_key(&self) -> (&str, Option<&str>) {
        (&self.name, self.institution.as_deref())
    }
}

impl Entity for Account {
    const KIND: EntityKind = EntityKind::Account;
    const TABLE: &'static str = "accounts";
    const COLUMNS: &'static str =
        "id, accountName, institutionName, startingBalance, accountTypeId, isDefault";
    const ORDER_BY: &'static str = "accountName";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Account {
            id: row.get(0)?,
            name: row.get(1)?,
            institution: row.get(2)?,
            starting_balance: row.get(3)?,
            account_type_id: row.get(4)?,
            is_default: row.get(5)?,
        })
    }
}

/// Input for creating an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAccount {
    pub name: String,
    pub institution: Option<String>,
    pub starting_balance: f64,
    pub account_type_id: i64,
    pub is_default: bool,
}

impl NewAccount {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(LedgerError::InvalidInput(
                "account name must not be empty".to_string(),
            ));
        }
        if !self.starting_balance.is_finite() {
            return Err(LedgerError::InvalidInput(format!(
                "starting balance of account '{}' is not a finite number",
                self.name
            )));
        }
        Ok(())
    }
}
