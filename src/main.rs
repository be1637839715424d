// Pocket Ledger CLI
//
// Every command opens the ledger and brings its schema up to date first.
// A failed migration stops here with the backup location.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pocket_ledger::bundle::Bundle;
use pocket_ledger::config::{Config, DEFAULT_CONFIG_FILE};
use pocket_ledger::entities::{LedgerPeriod, TransactionKind};
use pocket_ledger::logging::init_tracing;
use pocket_ledger::migrations::data::upgrade_bundle;
use pocket_ledger::{
    account_balances, category_breakdown, export_transactions_csv, import_with_mode, period_summary,
    schema_status, verify_bundle, write_bundle, ImportMode, LedgerError, MigrationRunner, Store,
    VerificationIssue,
};
use std::path::{Path, PathBuf};
use std::process;

/// Personal-finance ledger tools.
#[derive(Parser)]
#[command(name = "pocket-ledger")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(global = true, short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Database file (overrides config file)
    #[arg(global = true, short, long)]
    database: Option<PathBuf>,

    /// Log level (overrides config file)
    #[arg(global = true, short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,

    /// Show schema version and record counts
    Status,

    /// Export the whole ledger as a JSON bundle
    Export {
        /// Output file
        file: PathBuf,

        /// Also write a flat CSV of transactions here
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Import a JSON bundle
    Import {
        /// Bundle file
        file: PathBuf,

        /// replace: wipe local data first; merge: keep it
        #[arg(short, long, value_enum, default_value = "merge")]
        mode: ModeArg,

        /// Skip transactions already present (merge mode)
        #[arg(long)]
        skip_duplicates: bool,
    },

    /// Check a bundle without importing it
    Verify {
        /// Bundle file
        file: PathBuf,
    },

    /// Income, expenses and balances for a period
    Summary {
        #[arg(short, long)]
        year: Option<i32>,

        /// Month 1-12 (requires --year)
        #[arg(short, long)]
        month: Option<u32>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Replace,
    Merge,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?.with_overrides(cli.database.clone(), cli.log_level.clone());
    if let Err(e) = init_tracing(&config.logging.level, config.logging.json) {
        eprintln!("Warning: logging not initialised: {}", e);
    }

    let mut store = open_ledger(&config)?;

    match cli.command {
        Commands::Migrate => {
            // open_ledger already ran the runner
            let status = schema_status(&store)?;
            println!("✓ Schema at version {} (latest {})", status.current, status.latest);
        }
        Commands::Status => run_status(&store, &config)?,
        Commands::Export { file, csv } => run_export(&store, &file, csv.as_deref())?,
        Commands::Import {
            file,
            mode,
            skip_duplicates,
        } => {
            let mode = match mode {
                ModeArg::Replace => ImportMode::Replace,
                ModeArg::Merge => ImportMode::Merge { skip_duplicates },
            };
            run_import(&mut store, &file, mode)?;
        }
        Commands::Verify { file } => run_verify(&file)?,
        Commands::Summary { year, month } => run_summary(&store, year, month)?,
    }

    store.close().context("failed to close database")?;
    Ok(())
}

fn open_ledger(config: &Config) -> Result<Store> {
    let db_path = &config.database.path;
    let mut store = Store::open(db_path)
        .with_context(|| format!("failed to open ledger at {}", db_path.display()))?;

    let backup_path = config.backup_path();
    match MigrationRunner::new().backup_to(&backup_path).run(&mut store) {
        Ok(report) => {
            if let Some(version) = report.legacy_version_adopted {
                println!("✓ Converted legacy version table (version {})", version);
            }
            if report.changed_schema() {
                println!(
                    "✓ Migrated schema {} → {}",
                    report.from_version, report.to_version
                );
                if let Some(backup) = &report.backup {
                    println!("  Backup: {}", backup.display());
                }
            }
            Ok(store)
        }
        Err(LedgerError::Backup { backup, source, .. }) => {
            eprintln!("❌ Could not back up the database before migrating: {}", source);
            eprintln!("   Target: {}", backup.display());
            eprintln!("   No schema change was made.");
            process::exit(1);
        }
        Err(err) => {
            eprintln!("❌ Database migration failed: {}", err);
            eprintln!("   The schema was rolled back.");
            if backup_path.exists() {
                eprintln!("   To recover, restore the backup: {}", backup_path.display());
            }
            process::exit(1);
        }
    }
}

fn run_status(store: &Store, config: &Config) -> Result<()> {
    let status = schema_status(store)?;
    let conn = store.conn();

    println!("📒 {}", config.database.path.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Schema version:  {} (latest {})", status.current, status.latest);
    if !status.is_up_to_date() {
        println!("Pending:         {:?}", status.pending);
    }
    for (label, table) in [
        ("Account types", "accountType"),
        ("Accounts", "accounts"),
        ("Categories", "categories"),
        ("Ledger years", "ledger_years"),
        ("Transactions", "transactions"),
    ] {
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        println!("{:<17}{}", format!("{}:", label), count);
    }
    Ok(())
}

fn run_export(store: &Store, file: &Path, csv: Option<&Path>) -> Result<()> {
    let bundle = write_bundle(store.conn(), file)
        .with_context(|| format!("failed to export to {}", file.display()))?;
    println!("✓ Exported {} records to {}", bundle.record_count(), file.display());

    if let Some(csv) = csv {
        let rows = export_transactions_csv(store.conn(), csv)
            .with_context(|| format!("failed to write {}", csv.display()))?;
        println!("✓ Wrote {} transactions to {}", rows, csv.display());
    }
    Ok(())
}

fn run_import(store: &mut Store, file: &Path, mode: ImportMode) -> Result<()> {
    println!("📥 Importing {} ({})", file.display(), mode);

    let outcome = Bundle::read_from(file).and_then(|bundle| import_with_mode(store, bundle, mode));
    match outcome {
        Ok(summary) => {
            println!("✓ Import complete: {} new records", summary.inserted());
            if let Some(wiped) = summary.wiped {
                println!("  Replaced {} existing rows", wiped);
            }
            println!(
                "  Account types {}, accounts {}, categories {}, years {}, transactions {}",
                summary.account_types.inserted,
                summary.accounts.inserted,
                summary.categories.inserted,
                summary.ledger_years.inserted,
                summary.transactions.inserted
            );
            if summary.transactions.reused > 0 {
                println!("  Skipped {} duplicate transactions", summary.transactions.reused);
            }
            Ok(())
        }
        Err(LedgerError::Verification { issues }) => {
            eprintln!("❌ Import rejected: the file did not pass verification. Nothing was changed.");
            print_issues(&issues);
            process::exit(1);
        }
        Err(err @ LedgerError::Merge { .. }) => {
            eprintln!("❌ Import failed while merging: {}", err);
            if let Some(source) = std::error::Error::source(&err) {
                eprintln!("   Cause: {}", source);
            }
            eprintln!("   All changes were rolled back; your ledger is as it was.");
            process::exit(1);
        }
        Err(err) => Err(err).context("import failed"),
    }
}

fn run_verify(file: &Path) -> Result<()> {
    let bundle = match Bundle::read_from(file) {
        Ok(bundle) => upgrade_bundle(bundle),
        Err(LedgerError::Verification { issues }) => {
            eprintln!("❌ {} is not a valid bundle", file.display());
            print_issues(&issues);
            process::exit(1);
        }
        Err(err) => return Err(err).with_context(|| format!("failed to read {}", file.display())),
    };

    match verify_bundle(&bundle) {
        Ok(()) => {
            println!("✓ {} is valid ({} records)", file.display(), bundle.record_count());
            Ok(())
        }
        Err(issues) => {
            eprintln!("❌ {} failed verification", file.display());
            print_issues(&issues);
            process::exit(1);
        }
    }
}

fn print_issues(issues: &[VerificationIssue]) {
    for issue in issues {
        eprintln!("   • {}", issue);
    }
}

fn run_summary(store: &Store, year: Option<i32>, month: Option<u32>) -> Result<()> {
    let Some(period) = LedgerPeriod::from_parts(year, month) else {
        bail!("--month must be 1-12 and requires --year");
    };
    let conn = store.conn();

    let summary = period_summary(conn, period)?;
    println!("📊 Summary ({})", describe(period));
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Income:        {:>12.2}", summary.total_income);
    println!("Expenses:      {:>12.2}", summary.total_expenses);
    println!("Balance:       {:>12.2}", summary.balance);
    println!("Transactions:  {:>12}", summary.transaction_count);

    let breakdown = category_breakdown(conn, period, TransactionKind::Expense)?;
    if !breakdown.is_empty() {
        println!("\nExpenses by category:");
        for row in breakdown {
            println!("  {:<24}{:>12.2}  ({})", row.category_name, row.total, row.count);
        }
    }

    println!("\nAccount balances:");
    for account in account_balances(conn)? {
        println!("  {:<24}{:>12.2}", account.account_name, account.balance);
    }
    Ok(())
}

fn describe(period: LedgerPeriod) -> String {
    match period {
        LedgerPeriod::All => "all time".to_string(),
        LedgerPeriod::Year(y) => y.to_string(),
        LedgerPeriod::Month(y, m) => format!("{}-{:02}", y, m),
    }
}
