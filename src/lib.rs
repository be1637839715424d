// Pocket Ledger - Core Library
// Personal-finance ledger: schema migrations, export, and verified,
// id-remapping import. Exposes all modules for the CLI, the API server,
// and tests.

pub mod backup;
pub mod bundle;
pub mod config;
pub mod crud;
pub mod db;
pub mod deduplication;
pub mod entities;
pub mod error;
pub mod export;
pub mod logging;
pub mod merge;
pub mod migrations;
pub mod reports;
pub mod verify;

// Re-export commonly used types
pub use bundle::Bundle;
pub use config::Config;
pub use db::Store;
pub use entities::{
    Account, AccountType, Category, EntityKind, LedgerPeriod, LedgerYear, NewAccount, NewCategory,
    NewTransaction, Transaction, TransactionKind, TransactionView,
};
pub use error::{LedgerError, MergeFailure, Result};
pub use export::{export_bundle, export_transactions_csv, read_bundle, write_bundle};
pub use merge::{import_bundle, import_with_mode, ImportMode, ImportSummary};
pub use migrations::{
    run_schema_migrations, schema_status, MigrationReport, MigrationRunner, SchemaStatus,
};
pub use reports::{account_balances, category_breakdown, period_summary, PeriodSummary};
pub use verify::{verify, verify_bundle, VerificationIssue};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
