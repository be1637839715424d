// 📦 Bundle - the export/import interchange document
//
// Five named collections: accountTypes, accounts, categories, ledgerYears,
// transactions. Ids inside a bundle are origin ids: they only mean something
// relative to each other, never to the database the bundle is imported into.
//
// Every field is optional on the way in. Deciding whether a record is
// complete is the Verifier's job, so a bundle with holes still parses and
// gets a precise rejection instead of a serde error.

use crate::entities::{AccountType, Account, Category, LedgerYear, TransactionView};
use crate::error::{LedgerError, Result};
use crate::verify::VerificationIssue;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    /// Schema version of the database that produced the bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_version: Option<u32>,
    pub account_types: Option<Vec<BundleAccountType>>,
    pub accounts: Option<Vec<BundleAccount>>,
    pub categories: Option<Vec<BundleCategory>>,
    pub ledger_years: Option<Vec<Option<i64>>>,
    pub transactions: Option<Vec<BundleTransaction>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleAccountType {
    pub id: Option<i64>,
    #[serde(rename = "type")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleAccount {
    pub id: Option<i64>,
    #[serde(rename = "accountName", alias = "name")]
    pub name: Option<String>,
    #[serde(rename = "institutionName", alias = "institution")]
    pub institution: Option<String>,
    pub starting_balance: Option<f64>,
    pub account_type_id: Option<i64>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_default: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleCategory {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub color_code: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleTransaction {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub amount: Option<f64>,
    pub date: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub notes: Option<String>,
    pub category_id: Option<i64>,
    pub account_id: Option<i64>,
    pub category_name: Option<String>,
    pub category_color: Option<String>,
    pub category_icon: Option<String>,
}

/// Older exports wrote SQLite's 0/1 for booleans.
fn flexible_bool<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolLike {
        Bool(bool),
        Int(i64),
        Float(f64),
    }

    Ok(Option::<BoolLike>::deserialize(deserializer)?.map(|value| match value {
        BoolLike::Bool(b) => b,
        BoolLike::Int(i) => i != 0,
        BoolLike::Float(f) => f != 0.0,
    }))
}

impl Bundle {
    /// Parse a bundle document. Malformed JSON is a verification failure:
    /// nothing has been touched yet.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            LedgerError::verification(VerificationIssue::document(format!(
                "not a valid export document: {}",
                e
            )))
        })
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    /// Total records across all five collections.
    pub fn record_count(&self) -> usize {
        self.account_types.as_ref().map_or(0, Vec::len)
            + self.accounts.as_ref().map_or(0, Vec::len)
            + self.categories.as_ref().map_or(0, Vec::len)
            + self.ledger_years.as_ref().map_or(0, Vec::len)
            + self.transactions.as_ref().map_or(0, Vec::len)
    }
}

// ============================================================================
// LIVE ENTITY -> BUNDLE RECORD
// ============================================================================

impl From<&AccountType> for BundleAccountType {
    fn from(t: &AccountType) -> Self {
        BundleAccountType {
            id: Some(t.id),
            label: Some(t.label.clone()),
        }
    }
}

impl From<&Account> for BundleAccount {
    fn from(a: &Account) -> Self {
        BundleAccount {
            id: Some(a.id),
            name: Some(a.name.clone()),
            institution: a.institution.clone(),
            starting_balance: Some(a.starting_balance),
            account_type_id: a.account_type_id,
            is_default: Some(a.is_default),
        }
    }
}

impl From<&Category> for BundleCategory {
    fn from(c: &Category) -> Self {
        BundleCategory {
            id: Some(c.id),
            name: Some(c.name.clone()),
            color_code: Some(c.color_code.clone()),
            icon: Some(c.icon.clone()),
        }
    }
}

pub fn bundle_year(year: &LedgerYear) -> Option<i64> {
    Some(i64::from(year.year))
}

impl From<&TransactionView> for BundleTransaction {
    fn from(view: &TransactionView) -> Self {
        let tx = &view.transaction;
        BundleTransaction {
            id: Some(tx.id),
            title: Some(tx.title.clone()),
            amount: Some(tx.amount),
            date: Some(tx.date.clone()),
            kind: Some(tx.kind.as_str().to_string()),
            notes: tx.notes.clone(),
            category_id: tx.category_id,
            account_id: Some(tx.account_id),
            category_name: view.category_name.clone(),
            category_color: view.category_color.clone(),
            category_icon: view.category_icon.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_original_field_names() {
        let json = r##"{
            "accountTypes": [{"id": 100, "type": "Checking"}],
            "accounts": [{"id": 50, "accountName": "Imported", "institutionName": "Credit Union",
                          "startingBalance": 0, "accountTypeId": 100, "isDefault": 1, "balance": 12.5}],
            "categories": [{"id": 3, "name": "Coffee", "colorCode": "#6f4e37", "icon": "pi-tag"}],
            "ledgerYears": [2023],
            "transactions": [{"id": 9, "ledgerPeriodId": 4, "title": "Coffee", "amount": 4.5,
                              "date": "2023-05-01", "type": "expense", "notes": null,
                              "categoryId": 3, "accountId": 50, "categoryName": "Coffee",
                              "categoryColor": "#6f4e37", "categoryIcon": "pi-tag"}]
        }"##;

        let bundle = Bundle::from_json(json).unwrap();

        let account = &bundle.accounts.as_ref().unwrap()[0];
        assert_eq!(account.name.as_deref(), Some("Imported"));
        assert_eq!(account.institution.as_deref(), Some("Credit Union"));
        assert_eq!(account.is_default, Some(true));

        let tx = &bundle.transactions.as_ref().unwrap()[0];
        assert_eq!(tx.kind.as_deref(), Some("expense"));
        assert_eq!(tx.category_id, Some(3));
        assert_eq!(bundle.ledger_years, Some(vec![Some(2023)]));
        assert_eq!(bundle.database_version, None);
        assert_eq!(bundle.record_count(), 5);
    }

    #[test]
    fn test_accepts_short_account_field_names() {
        let json = r#"{"accounts": [{"id": 50, "accountTypeId": 100, "name": "Imported",
                                      "startingBalance": 0, "isDefault": true}]}"#;

        let bundle = Bundle::from_json(json).unwrap();

        let account = &bundle.accounts.unwrap()[0];
        assert_eq!(account.name.as_deref(), Some("Imported"));
        assert_eq!(account.is_default, Some(true));
        assert!(bundle.transactions.is_none(), "missing collection stays missing");
    }

    #[test]
    fn test_malformed_document_is_a_verification_failure() {
        let err = Bundle::from_json("{ not json").unwrap_err();
        assert!(err.is_verification());

        let err = Bundle::from_json(r#"{"transactions": [{"amount": "lots"}]}"#).unwrap_err();
        assert!(err.is_verification());
    }

    #[test]
    fn test_write_and_read_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("exports").join("bundle.json");
        let bundle = Bundle {
            database_version: Some(2),
            account_types: Some(vec![BundleAccountType { id: Some(1), label: Some("Cash".to_string()) }]),
            accounts: Some(vec![]),
            categories: Some(vec![]),
            ledger_years: Some(vec![Some(2024)]),
            transactions: Some(vec![]),
        };

        bundle.write_to(&path).unwrap();
        let read = Bundle::read_from(&path).unwrap();

        assert_eq!(read, bundle);
    }
}
