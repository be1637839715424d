// 📤 Exporter
// Reads the whole entity graph into a Bundle, the same shape the verifier
// and merger consume. Local ids are kept as the bundle's origin ids.
//
// Also writes a flat CSV of transactions for spreadsheets.

use crate::bundle::{bundle_year, Bundle, BundleAccount, BundleAccountType, BundleCategory, BundleTransaction};
use crate::crud::{
    get_all_account_types, get_all_accounts, get_all_categories, get_all_ledger_years,
    get_transaction_views,
};
use crate::db::{read_schema_version, with_savepoint};
use crate::entities::LedgerPeriod;
use crate::error::Result;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

/// Snapshot the live store. Pure read.
pub fn export_bundle(conn: &Connection) -> Result<Bundle> {
    // One savepoint so all five collections come from the same snapshot
    let bundle = with_savepoint(conn, "export_bundle", |conn| {
        Ok(Bundle {
            database_version: Some(read_schema_version(conn)?),
            account_types: Some(get_all_account_types(conn)?.iter().map(BundleAccountType::from).collect()),
            accounts: Some(get_all_accounts(conn)?.iter().map(BundleAccount::from).collect()),
            categories: Some(get_all_categories(conn)?.iter().map(BundleCategory::from).collect()),
            ledger_years: Some(get_all_ledger_years(conn)?.iter().map(bundle_year).collect()),
            transactions: Some(
                get_transaction_views(conn, LedgerPeriod::All)?
                    .iter()
                    .map(BundleTransaction::from)
                    .collect(),
            ),
        })
    })?;

    info!(records = bundle.record_count(), "exported ledger");
    Ok(bundle)
}

/// Export and write pretty JSON to `path`.
pub fn write_bundle(conn: &Connection, path: &Path) -> Result<Bundle> {
    let bundle = export_bundle(conn)?;
    bundle.write_to(path)?;
    info!(path = %path.display(), "export written");
    Ok(bundle)
}

pub fn read_bundle(path: &Path) -> Result<Bundle> {
    Bundle::read_from(path)
}

// ============================================================================
// CSV
// ============================================================================

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    id: i64,
    date: &'a str,
    title: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    amount: f64,
    signed_amount: f64,
    category: &'a str,
    account: &'a str,
    notes: &'a str,
}

/// Write every transaction as one CSV row, newest first. Returns the row count.
pub fn export_transactions_csv(conn: &Connection, path: &Path) -> Result<usize> {
    let account_names: HashMap<i64, String> = get_all_accounts(conn)?
        .into_iter()
        .map(|a| (a.id, a.name))
        .collect();
    let views = get_transaction_views(conn, LedgerPeriod::All)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;

    for view in &views {
        let tx = &view.transaction;
        writer.serialize(CsvRow {
            id: tx.id,
            date: &tx.date,
            title: &tx.title,
            kind: tx.kind.as_str(),
            amount: tx.amount,
            signed_amount: tx.signed_amount(),
            category: view.category_name.as_deref().unwrap_or(""),
            account: account_names.get(&tx.account_id).map(String::as_str).unwrap_or(""),
            notes: tx.notes.as_deref().unwrap_or(""),
        })?;
    }
    writer.flush()?;

    info!(rows = views.len(), path = %path.display(), "transactions exported to CSV");
    Ok(views.len())
}
