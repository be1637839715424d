// 🔍 Import Verifier
// Structural and referential checks on a bundle before anything is written.
//
// Every reference is checked against the bundle itself, never against the
// live store: ids in a bundle are origin ids. One bad record rejects the whole
// bundle, but all issues are collected so the user can fix them in one pass.

use crate::bundle::{Bundle, BundleAccount, BundleAccountType, BundleCategory, BundleTransaction};
use crate::entities::transaction::parse_date;
use crate::entities::{is_valid_hex_color, EntityKind, TransactionKind};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

// ============================================================================
// VERIFICATION ISSUE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationIssue {
    /// `None` when the problem is with the document itself.
    pub kind: Option<EntityKind>,
    pub record_id: Option<i64>,
    pub field: String,
    pub message: String,
}

impl VerificationIssue {
    pub fn new(
        kind: EntityKind,
        record_id: Option<i64>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        VerificationIssue {
            kind: Some(kind),
            record_id,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn document(message: impl Into<String>) -> Self {
        VerificationIssue {
            kind: None,
            record_id: None,
            field: String::new(),
            message: message.into(),
        }
    }
}

impl fmt::Display for VerificationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.record_id) {
            (Some(kind), Some(id)) => write!(f, "[{} #{}]", kind, id)?,
            (Some(kind), None) => write!(f, "[{}]", kind)?,
            (None, _) => f.write_str("[bundle]")?,
        }
        if self.field.is_empty() {
            write!(f, " {}", self.message)
        } else {
            write!(f, " {}: {}", self.field, self.message)
        }
    }
}

pub type VerificationResult = Result<(), Vec<VerificationIssue>>;

// ============================================================================
// ENTRY POINTS
// ============================================================================

/// True when the bundle may be handed to the merger.
pub fn verify(bundle: &Bundle) -> bool {
    verify_bundle(bundle).is_ok()
}

/// Check every collection and record, returning all issues found.
pub fn verify_bundle(bundle: &Bundle) -> VerificationResult {
    let mut issues = Vec::new();

    let account_types = require_collection(&bundle.account_types, EntityKind::AccountType, "accountTypes", &mut issues);
    let accounts = require_collection(&bundle.accounts, EntityKind::Account, "accounts", &mut issues);
    let categories = require_collection(&bundle.categories, EntityKind::Category, "categories", &mut issues);
    let ledger_years = require_collection(&bundle.ledger_years, EntityKind::LedgerYear, "ledgerYears", &mut issues);
    let transactions = require_collection(&bundle.transactions, EntityKind::Transaction, "transactions", &mut issues);

    let account_type_ids: HashSet<i64> = account_types.iter().filter_map(|t| t.id).collect();
    let account_ids: HashSet<i64> = accounts.iter().filter_map(|a| a.id).collect();
    let category_ids: HashSet<i64> = categories.iter().filter_map(|c| c.id).collect();

    for account_type in account_types {
        check_account_type(account_type, &mut issues);
    }
    for account in accounts {
        check_account(account, &account_type_ids, &mut issues);
    }
    for category in categories {
        check_category(category, &mut issues);
    }
    for year in ledger_years {
        check_ledger_year(*year, &mut issues);
    }
    for transaction in transactions {
        check_transaction(transaction, &account_ids, &category_ids, &mut issues);
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

fn require_collection<'b, T>(
    collection: &'b Option<Vec<T>>,
    kind: EntityKind,
    name: &str,
    issues: &mut Vec<VerificationIssue>,
) -> &'b [T] {
    match collection {
        Some(records) => records,
        None => {
            issues.push(VerificationIssue::new(kind, None, name, "collection is missing"));
            &[]
        }
    }
}

// ============================================================================
// PER-RECORD CHECKS
// ============================================================================

/// Records the issue when `value` is absent (blank strings count as absent).
fn require<T>(
    value: Option<T>,
    kind: EntityKind,
    id: Option<i64>,
    field: &str,
    issues: &mut Vec<VerificationIssue>,
) -> Option<T> {
    if value.is_none() {
        issues.push(VerificationIssue::new(kind, id, field, "required field is missing"));
    }
    value
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

fn check_account_type(record: &BundleAccountType, issues: &mut Vec<VerificationIssue>) {
    let kind = EntityKind::AccountType;
    require(record.id, kind, record.id, "id", issues);
    require(non_blank(&record.label), kind, record.id, "type", issues);
}

fn check_account(record: &BundleAccount, account_type_ids: &HashSet<i64>, issues: &mut Vec<VerificationIssue>) {
    let kind = EntityKind::Account;
    let id = record.id;

    require(id, kind, id, "id", issues);
    require(non_blank(&record.name), kind, id, "accountName", issues);
    require(record.is_default, kind, id, "isDefault", issues);

    if let Some(balance) = require(record.starting_balance, kind, id, "startingBalance", issues) {
        if !balance.is_finite() {
            issues.push(VerificationIssue::new(kind, id, "startingBalance", "not a finite number"));
        }
    }

    if let Some(type_id) = require(record.account_type_id, kind, id, "accountTypeId", issues) {
        if !account_type_ids.contains(&type_id) {
            issues.push(VerificationIssue::new(
                kind,
                id,
                "accountTypeId",
                format!("account type {} is not in the bundle", type_id),
            ));
        }
    }
}

fn check_category(record: &BundleCategory, issues: &mut Vec<VerificationIssue>) {
    let kind = EntityKind::Category;
    let id = record.id;

    require(id, kind, id, "id", issues);
    require(non_blank(&record.name), kind, id, "name", issues);
    require(non_blank(&record.icon), kind, id, "icon", issues);

    if let Some(color) = require(record.color_code.as_deref(), kind, id, "colorCode", issues) {
        if !is_valid_hex_color(color) {
            issues.push(VerificationIssue::new(
                kind,
                id,
                "colorCode",
                format!("'{}' is not a hex colour", color),
            ));
        }
    }
}

fn check_ledger_year(year: Option<i64>, issues: &mut Vec<VerificationIssue>) {
    let kind = EntityKind::LedgerYear;
    match year {
        None => issues.push(VerificationIssue::new(kind, None, "year", "year is missing")),
        Some(y) if i32::try_from(y).is_err() => {
            issues.push(VerificationIssue::new(kind, Some(y), "year", "out of range"))
        }
        Some(_) => {}
    }
}

fn check_transaction(
    record: &BundleTransaction,
    account_ids: &HashSet<i64>,
    category_ids: &HashSet<i64>,
    issues: &mut Vec<VerificationIssue>,
) {
    let kind = EntityKind::Transaction;
    let id = record.id;

    require(id, kind, id, "id", issues);
    require(non_blank(&record.title), kind, id, "title", issues);

    if let Some(amount) = require(record.amount, kind, id, "amount", issues) {
        // Direction lives in `type`; the amount is always a magnitude
        if !amount.is_finite() || amount < 0.0 {
            issues.push(VerificationIssue::new(
                kind,
                id,
                "amount",
                format!("{} is not a non-negative magnitude", amount),
            ));
        }
    }

    if let Some(date) = require(record.date.as_deref(), kind, id, "date", issues) {
        if parse_date(date).is_none() {
            issues.push(VerificationIssue::new(kind, id, "date", format!("'{}' is not YYYY-MM-DD", date)));
        }
    }

    if let Some(raw_kind) = require(record.kind.as_deref(), kind, id, "type", issues) {
        if raw_kind.parse::<TransactionKind>().is_err() {
            issues.push(VerificationIssue::new(
                kind,
                id,
                "type",
                format!("'{}' is neither income nor expense", raw_kind),
            ));
        }
    }

    if let Some(account_id) = require(record.account_id, kind, id, "accountId", issues) {
        if !account_ids.contains(&account_id) {
            issues.push(VerificationIssue::new(
                kind,
                id,
                "accountId",
                format!("account {} is not in the bundle", account_id),
            ));
        }
    }

    if let Some(category_id) = record.category_id {
        require(record.category_name.as_deref(), kind, id, "categoryName", issues);
        require(record.category_icon.as_deref(), kind, id, "categoryIcon", issues);

        if let Some(color) = require(record.category_color.as_deref(), kind, id, "categoryColor", issues) {
            if !is_valid_hex_color(color) {
                issues.push(VerificationIssue::new(
                    kind,
                    id,
                    "categoryColor",
                    format!("'{}' is not a hex colour", color),
                ));
            }
        }

        if !category_ids.contains(&category_id) {
            issues.push(VerificationIssue::new(
                kind,
                id,
                "categoryId",
                format!("category {} is not in the bundle", category_id),
            ));
        }
    }
}
