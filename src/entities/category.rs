// 🏷️ Category Entity - colour-coded buckets for transactions
//
// Category names are unique (store-level UNIQUE constraint) and act as the
// natural key across databases. Deleting a category leaves its transactions
// uncategorized rather than deleting them.

use crate::db::Entity;
use crate::entities::{is_valid_hex_color, EntityKind};
use crate::error::{LedgerError, Result};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

pub const DEFAULT_COLOR: &str = "#6366f1";
pub const DEFAULT_ICON: &str = "pi-tag";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub color_code: String,
    pub icon: String,
}

impl Entity for Category {
    const KIND: EntityKind = EntityKind::Category;
    const TABLE: &'static str = "categories";
    const COLUMNS: &'static str = "id, name, colorCode, icon";
    const ORDER_BY: &'static str = "name";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Category {
            id: row.get(0)?,
            name: row.get(1)?,
            color_code: row.get(2)?,
            icon: row.get(3)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub color_code: String,
    pub icon: String,
}

impl NewCategory {
    /// Category with the stock colour and icon.
    pub fn named(name: impl Into<String>) -> Self {
        NewCategory {
            name: name.into(),
            color_code: DEFAULT_COLOR.to_string(),
            icon: DEFAULT_ICON.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(LedgerError::InvalidInput(
                "category name must not be empty".to_string(),
            ));
        }
        if !is_valid_hex_color(&self.color_code) {
            return Err(LedgerError::InvalidInput(format!(
                "category '{}' has invalid colour '{}'",
                self.name, self.color_code
            )));
        }
        Ok(())
    }
}
