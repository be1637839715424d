// Entity Models
// Typed records for everything the ledger persists.
//
// Each entity has:
// - A store-assigned integer id, meaningful only inside its own database
// - A natural key used to recognise the same real-world thing across databases
// - Validation predicates shared by seeding, CRUD and import verification

pub mod account;
pub mod category;
pub mod ledger_year;
pub mod transaction;

pub use account::{Account, AccountType, NewAccount};
pub use category::{Category, NewCategory};
pub use ledger_year::{LedgerPeriod, LedgerYear};
pub use transaction::{NewTransaction, Transaction, TransactionKind, TransactionView};

use serde::{Deserialize, Serialize};
use std::fmt;

/// The five entity kinds, listed in foreign-key dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    AccountType,
    Account,
    Category,
    LedgerYear,
    Transaction,
}

impl EntityKind {
    /// Order in which an import must process kinds so every reference is
    /// already resolved when a record needs it.
    pub const DEPENDENCY_ORDER: [EntityKind; 5] = [
        EntityKind::AccountType,
        EntityKind::Account,
        EntityKind::Category,
        EntityKind::LedgerYear,
        EntityKind::Transaction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::AccountType => "account type",
            EntityKind::Account => "account",
            EntityKind::Category => "category",
            EntityKind::LedgerYear => "ledger year",
            EntityKind::Transaction => "transaction",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `#RGB` or `#RRGGBB`, hex digits in either case.
pub fn is_valid_hex_color(color: &str) -> bool {
    match color.strip_prefix('#') {
        Some(digits) => {
            (digits.len() == 3 || digits.len() == 6)
                && digits.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}
