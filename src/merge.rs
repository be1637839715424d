// 🔀 Import Merger
// Folds a verified bundle into the live store.
//
// Kinds are processed in foreign-key dependency order
// (AccountType -> Account -> Category -> LedgerYear -> Transaction). Each kind
// keeps a remap table from the bundle's origin ids to local ids; every foreign
// key a record carries is rewritten through the table of the kind it points
// at before the record is inserted.
//
// Reference data is always matched by natural key first and reused when a
// local match exists. Names are trimmed once, before the lookup, and stored
// in that form. Transactions are only matched when `skip_duplicates`.
//
// The whole merge, including the replace-mode wipe, runs in ONE store
// transaction: a failure anywhere leaves the database exactly as it was.

use crate::bundle::{Bundle, BundleAccount, BundleAccountType, BundleCategory, BundleTransaction};
use crate::crud::{
    ensure_default_account, insert_account, insert_account_type, insert_category, insert_ledger_year,
    insert_transaction, wipe_all,
};
use crate::db::Store;
use crate::deduplication::{
    find_account, find_account_type, find_category, find_ledger_year, find_transaction, natural_institution,
    natural_name,
};
use crate::entities::{EntityKind, NewAccount, NewCategory, NewTransaction, TransactionKind};
use crate::error::{LedgerError, MergeFailure, Result};
use crate::migrations::data::upgrade_bundle;
use crate::verify::verify_bundle;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

// ============================================================================
// IMPORT MODE & SUMMARY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Wipe every local table, then merge.
    Replace,
    /// Keep local data; collapse duplicate transactions only if asked.
    Merge { skip_duplicates: bool },
}

impl ImportMode {
    pub fn skip_duplicates(&self) -> bool {
        match self {
            ImportMode::Replace => false,
            ImportMode::Merge { skip_duplicates } => *skip_duplicates,
        }
    }
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportMode::Replace => f.write_str("replace"),
            ImportMode::Merge { skip_duplicates: true } => f.write_str("merge (skipping duplicates)"),
            ImportMode::Merge { skip_duplicates: false } => f.write_str("merge"),
        }
    }
}

/// Per-kind outcome: newly inserted rows vs origin records mapped onto an
/// existing local row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    pub inserted: usize,
    pub reused: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub account_types: KindCounts,
    pub accounts: KindCounts,
    pub categories: KindCounts,
    pub ledger_years: KindCounts,
    /// `reused` counts duplicate transactions that were skipped.
    pub transactions: KindCounts,
    /// Rows removed before merging (replace mode only).
    pub wiped: Option<usize>,
    /// Account promoted to default because the merge left none.
    pub promoted_default: Option<i64>,
}

impl ImportSummary {
    fn counts_mut(&mut self, kind: EntityKind) -> &mut KindCounts {
        match kind {
            EntityKind::AccountType => &mut self.account_types,
            EntityKind::Account => &mut self.accounts,
            EntityKind::Category => &mut self.categories,
            EntityKind::LedgerYear => &mut self.ledger_years,
            EntityKind::Transaction => &mut self.transactions,
        }
    }

    pub fn inserted(&self) -> usize {
        self.account_types.inserted
            + self.accounts.inserted
            + self.categories.inserted
            + self.ledger_years.inserted
            + self.transactions.inserted
    }
}

// ============================================================================
// REMAP TABLE
// ============================================================================

/// Origin id -> local id for one entity kind.
#[derive(Debug)]
struct RemapTable {
    kind: EntityKind,
    ids: HashMap<i64, i64>,
}

impl RemapTable {
    fn new(kind: EntityKind) -> Self {
        RemapTable {
            kind,
            ids: HashMap::new(),
        }
    }

    fn record(&mut self, origin_id: i64, local_id: i64) {
        self.ids.insert(origin_id, local_id);
    }

    fn resolve(&self, origin_id: i64) -> std::result::Result<i64, MergeFailure> {
        self.ids
            .get(&origin_id)
            .copied()
            .ok_or(MergeFailure::UnresolvedReference {
                referenced: self.kind,
                origin_id,
            })
    }
}

fn required<T>(value: Option<T>, field: &'static str) -> std::result::Result<T, MergeFailure> {
    value.ok_or(MergeFailure::MissingField { field })
}

type Step<T> = std::result::Result<T, MergeFailure>;

// ============================================================================
// ENTRY POINTS
// ============================================================================

/// Merge an already-verified bundle in one transaction.
pub fn import_bundle(store: &mut Store, bundle: &Bundle, skip_duplicates: bool) -> Result<ImportSummary> {
    store.transaction(|tx| merge_bundle(tx, bundle, skip_duplicates))
}

/// Full import pipeline: upgrade the bundle to the current data shape,
/// verify it, then wipe (replace mode) and merge in one transaction.
/// A rejected bundle leaves the store untouched.
pub fn import_with_mode(store: &mut Store, bundle: Bundle, mode: ImportMode) -> Result<ImportSummary> {
    let bundle = upgrade_bundle(bundle);
    if let Err(issues) = verify_bundle(&bundle) {
        warn!(issues = issues.len(), "import bundle rejected");
        return Err(LedgerError::Verification { issues });
    }

    info!(%mode, records = bundle.record_count(), "importing bundle");

    let summary = store.transaction(|tx| {
        let wiped = match mode {
            ImportMode::Replace => Some(wipe_all(tx)?),
            ImportMode::Merge { .. } => None,
        };
        let mut summary = merge_bundle(tx, &bundle, mode.skip_duplicates())?;
        summary.wiped = wiped;
        Ok(summary)
    });

    match &summary {
        Ok(s) => info!(inserted = s.inserted(), "import committed"),
        Err(err) => warn!(error = %err, "import rolled back"),
    }
    summary
}

/// The merge loop itself, on an open transaction.
pub fn merge_bundle(conn: &Connection, bundle: &Bundle, skip_duplicates: bool) -> Result<ImportSummary> {
    let mut account_types = RemapTable::new(EntityKind::AccountType);
    let mut accounts = RemapTable::new(EntityKind::Account);
    let mut categories = RemapTable::new(EntityKind::Category);
    let mut transactions = RemapTable::new(EntityKind::Transaction);

    let mut summary = ImportSummary::default();

    for kind in EntityKind::DEPENDENCY_ORDER {
        let step = match kind {
            EntityKind::AccountType => merge_account_types(conn, records(&bundle.account_types), &mut account_types),
            EntityKind::Account => merge_accounts(conn, records(&bundle.accounts), &account_types, &mut accounts),
            EntityKind::Category => merge_categories(conn, records(&bundle.categories), &mut categories),
            EntityKind::LedgerYear => merge_ledger_years(conn, records(&bundle.ledger_years)),
            EntityKind::Transaction => merge_transactions(
                conn,
                records(&bundle.transactions),
                &accounts,
                &categories,
                &mut transactions,
                skip_duplicates,
            ),
        };
        *summary.counts_mut(kind) = phase(kind, step)?;
    }

    summary.promoted_default = ensure_default_account(conn)?;
    Ok(summary)
}

fn records<T>(collection: &Option<Vec<T>>) -> &[T] {
    collection.as_deref().unwrap_or(&[])
}

fn phase(kind: EntityKind, step: Step<KindCounts>) -> Result<KindCounts> {
    let counts = step.map_err(|source| LedgerError::Merge { kind, source })?;
    info!(%kind, inserted = counts.inserted, reused = counts.reused, "merged");
    Ok(counts)
}

// ============================================================================
// PER-KIND MERGE STEPS
// ============================================================================

fn merge_account_types(
    conn: &Connection,
    records: &[BundleAccountType],
    remap: &mut RemapTable,
) -> Step<KindCounts> {
    let mut counts = KindCounts::default();
    for record in records {
        let origin_id = required(record.id, "id")?;
        let label = natural_name(required(record.label.as_deref(), "type")?);

        if let Some(local_id) = find_account_type(conn, label)? {
            remap.record(origin_id, local_id);
            counts.reused += 1;
            continue;
        }

        let created = insert_account_type(conn, label)?;
        remap.record(origin_id, created.id);
        counts.inserted += 1;
    }
    Ok(counts)
}

fn merge_accounts(
    conn: &Connection,
    records: &[BundleAccount],
    account_types: &RemapTable,
    remap: &mut RemapTable,
) -> Step<KindCounts> {
    let mut counts = KindCounts::default();
    for record in records {
        let origin_id = required(record.id, "id")?;
        let name = natural_name(required(record.name.as_deref(), "accountName")?);
        let institution = natural_institution(record.institution.as_deref());

        if let Some(local_id) = find_account(conn, name, institution)? {
            remap.record(origin_id, local_id);
            counts.reused += 1;
            continue;
        }

        let account_type_id = account_types.resolve(required(record.account_type_id, "accountTypeId")?)?;
        let created = insert_account(
            conn,
            &NewAccount {
                name: name.to_string(),
                institution: institution.map(str::to_string),
                starting_balance: required(record.starting_balance, "startingBalance")?,
                account_type_id,
                is_default: record.is_default.unwrap_or(false),
            },
        )?;
        remap.record(origin_id, created.id);
        counts.inserted += 1;
    }
    Ok(counts)
}

fn merge_categories(conn: &Connection, records: &[BundleCategory], remap: &mut RemapTable) -> Step<KindCounts> {
    let mut counts = KindCounts::default();
    for record in records {
        let origin_id = required(record.id, "id")?;
        let name = natural_name(required(record.name.as_deref(), "name")?);

        if let Some(local_id) = find_category(conn, name)? {
            remap.record(origin_id, local_id);
            counts.reused += 1;
            continue;
        }

        let created = insert_category(
            conn,
            &NewCategory {
                name: name.to_string(),
                color_code: required(record.color_code.clone(), "colorCode")?,
                icon: required(record.icon.clone(), "icon")?,
            },
        )?;
        remap.record(origin_id, created.id);
        counts.inserted += 1;
    }
    Ok(counts)
}

fn merge_ledger_years(conn: &Connection, records: &[Option<i64>]) -> Step<KindCounts> {
    let mut counts = KindCounts::default();
    for record in records {
        let raw = required(*record, "year")?;
        let year = i32::try_from(raw).map_err(|_| MergeFailure::Rejected(format!("year {} is out of range", raw)))?;

        if find_ledger_year(conn, year)?.is_some() {
            counts.reused += 1;
            continue;
        }
        insert_ledger_year(conn, year)?;
        counts.inserted += 1;
    }
    Ok(counts)
}

fn merge_transactions(
    conn: &Connection,
    records: &[BundleTransaction],
    accounts: &RemapTable,
    categories: &RemapTable,
    remap: &mut RemapTable,
    skip_duplicates: bool,
) -> Step<KindCounts> {
    let mut counts = KindCounts::default();
    for record in records {
        let origin_id = required(record.id, "id")?;
        let title = required(record.title.as_deref(), "title")?;
        let amount = required(record.amount, "amount")?;
        let date = required(record.date.as_deref(), "date")?;

        if skip_duplicates {
            if let Some(local_id) = find_transaction(conn, title, amount, date)? {
                remap.record(origin_id, local_id);
                counts.reused += 1;
                continue;
            }
        }

        let raw_kind = required(record.kind.as_deref(), "type")?;
        let kind: TransactionKind = raw_kind
            .parse()
            .map_err(|_| MergeFailure::Rejected(format!("unknown transaction type '{}'", raw_kind)))?;
        let account_id = accounts.resolve(required(record.account_id, "accountId")?)?;
        let category_id = record.category_id.map(|id| categories.resolve(id)).transpose()?;

        let created = insert_transaction(
            conn,
            &NewTransaction {
                title: title.to_string(),
                amount,
                date: date.to_string(),
                kind,
                notes: record.notes.clone(),
                category_id,
                account_id,
            },
        )?;
        remap.record(origin_id, created.id);
        counts.inserted += 1;
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crud::{get_all_accounts, get_all_transactions, get_default_account};
    use crate::db::{count, list_all};
    use crate::entities::{Account, AccountType, Category, LedgerYear, Transaction};
    use crate::export::export_bundle;
    use crate::migrations::run_schema_migrations;
    use std::collections::BTreeSet;

    fn migrated_store() -> Store {
        let mut store = Store::open_in_memory().unwrap();
        run_schema_migrations(&mut store).unwrap();
        store
    }

    fn empty_store() -> Store {
        let store = migrated_store();
        wipe_all(store.conn()).unwrap();
        store
    }

    /// One AccountType 100, one Account 50, one Transaction 9, no categories.
    fn coffee_bundle() -> Bundle {
        Bundle::from_json(
            r#"{
                "accountTypes": [{"id": 100, "type": "Checking"}],
                "accounts": [{"id": 50, "accountTypeId": 100, "name": "Imported",
                              "startingBalance": 0, "isDefault": true}],
                "categories": [],
                "ledgerYears": [2023],
                "transactions": [{"id": 9, "accountId": 50, "title": "Coffee", "amount": 4.5,
                                  "date": "2023-05-01", "type": "expense"}]
            }"#,
        )
        .unwrap()
    }

    fn source_store() -> Store {
        let store = migrated_store();
        let conn = store.conn();
        let main = get_default_account(conn).unwrap().unwrap();
        let savings = insert_account(
            conn,
            &NewAccount {
                name: "Rainy Day".to_string(),
                institution: Some("Credit Union".to_string()),
                starting_balance: 500.0,
                account_type_id: 3,
                is_default: false,
            },
        )
        .unwrap();
        let coffee = insert_category(conn, &NewCategory::named("Coffee")).unwrap();
        insert_ledger_year(conn, 2023).unwrap();
        insert_ledger_year(conn, 2024).unwrap();
        for (title, amount, date, kind, category, account) in [
            ("Latte", 5.25, "2023-05-01", TransactionKind::Expense, Some(coffee.id), main.id),
            ("Paycheque", 2000.0, "2023-05-15", TransactionKind::Income, None, main.id),
            ("Interest", 1.75, "2024-01-31", TransactionKind::Income, None, savings.id),
        ] {
            insert_transaction(
                conn,
                &NewTransaction {
                    title: title.to_string(),
                    amount,
                    date: date.to_string(),
                    kind,
                    notes: None,
                    category_id: category,
                    account_id: account,
                },
            )
            .unwrap();
        }
        store
    }

    type KeySets = (BTreeSet<String>, BTreeSet<String>, BTreeSet<String>, BTreeSet<i32>, BTreeSet<String>);

    fn natural_keys(conn: &Connection) -> KeySets {
        let types = list_all::<AccountType>(conn).unwrap().into_iter().map(|t| t.label).collect();
        let accounts = list_all::<Account>(conn)
            .unwrap()
            .into_iter()
            .map(|a| format!("{}|{:?}", a.name, a.institution))
            .collect();
        let categories = list_all::<Category>(conn).unwrap().into_iter().map(|c| c.name).collect();
        let years = list_all::<LedgerYear>(conn).unwrap().into_iter().map(|y| y.year).collect();
        let transactions = list_all::<Transaction>(conn)
            .unwrap()
            .into_iter()
            .map(|t| format!("{}|{}|{}", t.title, t.amount, t.date))
            .collect();
        (types, accounts, categories, years, transactions)
    }

    fn net_total(conn: &Connection) -> f64 {
        get_all_transactions(conn).unwrap().iter().map(Transaction::signed_amount).sum()
    }

    #[test]
    fn test_foreign_keys_are_remapped_to_local_ids() {
        let mut store = empty_store();

        let summary = import_bundle(&mut store, &coffee_bundle(), false).unwrap();

        let conn = store.conn();
        assert_eq!(count::<AccountType>(conn).unwrap(), 1);
        let accounts = get_all_accounts(conn).unwrap();
        assert_eq!(accounts.len(), 1);
        assert!(accounts[0].is_default);

        let transactions = get_all_transactions(conn).unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].account_id, accounts[0].id);
        assert_ne!(transactions[0].account_id, 50);

        assert_eq!(summary.inserted(), 4);
        assert_eq!(summary.promoted_default, None);
    }

    #[test]
    fn test_replace_round_trip_preserves_natural_keys_and_totals() {
        let source = source_store();
        let bundle = export_bundle(source.conn()).unwrap();
        let json = bundle.to_json_pretty().unwrap();

        // Target already holds unrelated data that replace must discard
        let mut target = migrated_store();
        insert_category(target.conn(), &NewCategory::named("Gardening")).unwrap();

        let summary = import_with_mode(&mut target, Bundle::from_json(&json).unwrap(), ImportMode::Replace).unwrap();

        assert!(summary.wiped.unwrap() > 0);
        assert_eq!(natural_keys(target.conn()), natural_keys(source.conn()));
        assert!((net_total(target.conn()) - net_total(source.conn())).abs() < 1e-9);
        assert_eq!(
            get_default_account(target.conn()).unwrap().unwrap().name,
            get_default_account(source.conn()).unwrap().unwrap().name
        );
    }

    #[test]
    fn test_merge_never_duplicates_reference_data() {
        let source = source_store();
        let bundle = export_bundle(source.conn()).unwrap();
        let mut target = migrated_store();

        // Seeded categories, account types and the default account are shared
        let first = import_with_mode(&mut target, bundle.clone(), ImportMode::Merge { skip_duplicates: true }).unwrap();
        assert_eq!(first.account_types.inserted, 0);
        assert_eq!(first.categories.inserted, 1);
        assert_eq!(first.accounts.inserted, 1);
        assert_eq!(first.transactions.inserted, 3);

        let second = import_with_mode(&mut target, bundle, ImportMode::Merge { skip_duplicates: true }).unwrap();
        assert_eq!(second.inserted(), 0);
        assert_eq!(second.transactions.reused, 3);

        let conn = target.conn();
        assert_eq!(count::<AccountType>(conn).unwrap(), 3);
        assert_eq!(count::<Account>(conn).unwrap(), 2);
        assert_eq!(count::<Category>(conn).unwrap(), 9);
        assert_eq!(count::<LedgerYear>(conn).unwrap(), 2);
        assert_eq!(count::<Transaction>(conn).unwrap(), 3);
    }

    #[test]
    fn test_padded_names_collapse_onto_existing_rows() {
        let padded = Bundle::from_json(
            r##"{
                "accountTypes": [{"id": 100, "type": "Checking "}, {"id": 101, "type": " Savings"}],
                "accounts": [{"id": 50, "accountTypeId": 100, "name": " Imported ",
                              "institutionName": "Credit Union  ", "startingBalance": 0, "isDefault": false}],
                "categories": [{"id": 7, "name": "Salary ", "colorCode": "#22c55e", "icon": "pi-wallet"},
                               {"id": 8, "name": " Coffee", "colorCode": "#6b7280", "icon": "pi-tag"}],
                "ledgerYears": [2023],
                "transactions": [{"id": 9, "accountId": 50, "categoryId": 8, "categoryName": " Coffee",
                                  "categoryColor": "#6b7280", "categoryIcon": "pi-tag",
                                  "title": "Latte", "amount": 4.5, "date": "2023-05-01", "type": "expense"}]
            }"##,
        )
        .unwrap();
        let mut store = migrated_store();
        let skip = ImportMode::Merge { skip_duplicates: true };

        let first = import_with_mode(&mut store, padded.clone(), skip).unwrap();
        assert_eq!(first.account_types.inserted, 1);
        assert_eq!(first.account_types.reused, 1);
        assert_eq!(first.categories.inserted, 1);
        assert_eq!(first.categories.reused, 1);

        let second = import_with_mode(&mut store, padded, skip).unwrap();
        assert_eq!(second.inserted(), 0);

        let conn = store.conn();
        let labels: Vec<String> = list_all::<AccountType>(conn).unwrap().into_iter().map(|t| t.label).collect();
        assert_eq!(labels, vec!["Cash", "Checking", "Chequing", "Savings"]);
        assert_eq!(count::<Category>(conn).unwrap(), 9);
        let imported = get_all_accounts(conn)
            .unwrap()
            .into_iter()
            .find(|a| a.name == "Imported")
            .unwrap();
        assert_eq!(imported.institution.as_deref(), Some("Credit Union"));
        assert_eq!(count::<Account>(conn).unwrap(), 2);
    }

    #[test]
    fn test_merge_without_skip_keeps_duplicate_transactions() {
        let mut store = empty_store();
        import_bundle(&mut store, &coffee_bundle(), false).unwrap();

        let summary = import_bundle(&mut store, &coffee_bundle(), false).unwrap();

        assert_eq!(summary.account_types.reused, 1);
        assert_eq!(summary.accounts.reused, 1);
        assert_eq!(summary.transactions.inserted, 1);
        assert_eq!(count::<Transaction>(store.conn()).unwrap(), 2);
    }

    #[test]
    fn test_unresolved_reference_rolls_back_everything() {
        let mut store = empty_store();
        let mut bundle = coffee_bundle();
        bundle.transactions.as_mut().unwrap()[0].account_id = Some(51);

        let err = import_bundle(&mut store, &bundle, false).unwrap_err();

        assert!(matches!(
            err,
            LedgerError::Merge {
                kind: EntityKind::Transaction,
                source: MergeFailure::UnresolvedReference {
                    referenced: EntityKind::Account,
                    origin_id: 51
                }
            }
        ));
        let conn = store.conn();
        assert_eq!(count::<AccountType>(conn).unwrap(), 0);
        assert_eq!(count::<Account>(conn).unwrap(), 0);
        assert_eq!(count::<LedgerYear>(conn).unwrap(), 0);
    }

    #[test]
    fn test_rejected_bundle_leaves_store_untouched() {
        let mut store = migrated_store();
        let mut bundle = coffee_bundle();
        bundle.transactions.as_mut().unwrap()[0].category_id = Some(3);

        let err = import_with_mode(&mut store, bundle, ImportMode::Replace).unwrap_err();

        assert!(err.is_verification());
        assert_eq!(count::<Category>(store.conn()).unwrap(), 8);
        assert_eq!(count::<Account>(store.conn()).unwrap(), 1);
    }

    #[test]
    fn test_failed_replace_keeps_old_data() {
        let mut store = migrated_store();
        store
            .conn()
            .execute_batch(
                "CREATE TRIGGER refuse_transactions BEFORE INSERT ON transactions
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let err = import_with_mode(&mut store, coffee_bundle(), ImportMode::Replace).unwrap_err();

        assert!(err.is_merge());
        assert!(matches!(err, LedgerError::Merge { kind: EntityKind::Transaction, .. }));
        let conn = store.conn();
        assert_eq!(count::<Category>(conn).unwrap(), 8);
        assert_eq!(count::<AccountType>(conn).unwrap(), 3);
        assert_eq!(get_default_account(conn).unwrap().unwrap().name, "OneFinance");
    }

    #[test]
    fn test_old_bundle_with_two_defaults_is_upgraded() {
        let mut store = empty_store();
        let mut bundle = coffee_bundle();
        let mut second = bundle.accounts.as_ref().unwrap()[0].clone();
        second.id = Some(51);
        second.name = Some("Second".to_string());
        bundle.accounts.as_mut().unwrap().push(second);

        import_with_mode(&mut store, bundle, ImportMode::Merge { skip_duplicates: false }).unwrap();

        let default = get_default_account(store.conn()).unwrap().unwrap();
        assert_eq!(default.name, "Imported");
    }

    #[test]
    fn test_default_is_promoted_when_bundle_has_none() {
        let mut store = empty_store();
        let mut bundle = coffee_bundle();
        bundle.accounts.as_mut().unwrap()[0].is_default = Some(false);

        let summary = import_bundle(&mut store, &bundle, false).unwrap();

        let default = get_default_account(store.conn()).unwrap().unwrap();
        assert_eq!(summary.promoted_default, Some(default.id));
    }
}
