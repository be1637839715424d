// 📅 Ledger Year - a calendar year open for bookkeeping
// A year is either present or absent; the year number is its whole identity.

use crate::db::Entity;
use crate::entities::EntityKind;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerYear {
    pub year: i32,
}

impl LedgerYear {
    pub fn new(year: i32) -> Self {
        LedgerYear { year }
    }

    /// Months a ledger year is subdivided into for reporting.
    pub fn months(&self) -> impl Iterator<Item = (i32, u32)> {
        let year = self.year;
        (1..=12).map(move |month| (year, month))
    }
}

/// Reporting window: everything, one year, or one month of a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerPeriod {
    All,
    Year(i32),
    Month(i32, u32),
}

impl LedgerPeriod {
    /// Build from optional year/month filters. A month without a year is
    /// meaningless and rejected.
    pub fn from_parts(year: Option<i32>, month: Option<u32>) -> Option<Self> {
        match (year, month) {
            (None, None) => Some(LedgerPeriod::All),
            (Some(y), None) => Some(LedgerPeriod::Year(y)),
            (Some(y), Some(m)) if (1..=12).contains(&m) => Some(LedgerPeriod::Month(y, m)),
            _ => None,
        }
    }

    /// Prefix that every `YYYY-MM-DD` date inside the period starts with.
    pub fn date_prefix(&self) -> String {
        match self {
            LedgerPeriod::All => String::new(),
            LedgerPeriod::Year(y) => format!("{:04}", y),
            LedgerPeriod::Month(y, m) => format!("{:04}-{:02}", y, m),
        }
    }
}

impl Entity for LedgerYear {
    const KIND: EntityKind = EntityKind::LedgerYear;
    const TABLE: &'static str = "ledger_years";
    const COLUMNS: &'static str = "year";
    const ORDER_BY: &'static str = "year DESC";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(LedgerYear { year: row.get(0)? })
    }
}
