// Pocket Ledger - Web Server
// Local REST API with Axum: status, export, import, summary

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clap::Parser;
use pocket_ledger::config::ServerArgs;
use pocket_ledger::logging::init_tracing;
use pocket_ledger::reports::{AccountBalance, CategoryBreakdown};
use pocket_ledger::{
    account_balances, category_breakdown, export_bundle, import_with_mode, period_summary,
    schema_status, Bundle, ImportMode, LedgerError, LedgerPeriod, MigrationRunner, PeriodSummary,
    Store, TransactionKind, VerificationIssue,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Store>>,
}

impl AppState {
    fn store(&self) -> Result<MutexGuard<'_, Store>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::internal("database lock poisoned".to_string()))
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    issues: Vec<VerificationIssue>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            issues: Vec::new(),
        }
    }
}

/// Error half of a handler result: a status plus a message.
struct ApiError {
    status: StatusCode,
    message: String,
    issues: Vec<VerificationIssue>,
}

impl ApiError {
    fn internal(message: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
            issues: Vec::new(),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Verification { issues } => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                message: "import rejected: the bundle failed verification, nothing was changed".to_string(),
                issues,
            },
            err @ LedgerError::Merge { .. } => {
                let cause = std::error::Error::source(&err)
                    .map(|s| format!(": {}", s))
                    .unwrap_or_default();
                Self::internal(format!("{}{}; all changes were rolled back", err, cause))
            }
            LedgerError::InvalidInput(message) => Self {
                status: StatusCode::BAD_REQUEST,
                message,
                issues: Vec::new(),
            },
            other => Self::internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.message, "request failed");
        } else {
            warn!(status = %self.status, error = %self.message, "request rejected");
        }
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
            issues: self.issues,
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum ModeParam {
    Replace,
    Merge,
}

#[derive(Deserialize)]
struct ImportQuery {
    mode: Option<ModeParam>,
    #[serde(default)]
    skip_duplicates: bool,
}

#[derive(Deserialize)]
struct SummaryQuery {
    year: Option<i32>,
    month: Option<u32>,
}

#[derive(Serialize)]
struct SummaryResponse {
    summary: PeriodSummary,
    expenses_by_category: Vec<CategoryBreakdown>,
    income_by_category: Vec<CategoryBreakdown>,
    accounts: Vec<AccountBalance>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/status - Schema version
async fn get_status(State(state): State<AppState>) -> ApiResult<pocket_ledger::SchemaStatus> {
    let store = state.store()?;
    Ok(Json(ApiResponse::ok(schema_status(&store)?)))
}

/// GET /api/export - Whole ledger as a bundle
async fn get_export(State(state): State<AppState>) -> ApiResult<Bundle> {
    let store = state.store()?;
    Ok(Json(ApiResponse::ok(export_bundle(store.conn())?)))
}

/// POST /api/import?mode=replace|merge&skip_duplicates=true - Import a bundle
async fn post_import(
    State(state): State<AppState>,
    Query(query): Query<ImportQuery>,
    body: String,
) -> ApiResult<pocket_ledger::ImportSummary> {
    let mode = match query.mode.unwrap_or(ModeParam::Merge) {
        ModeParam::Replace => ImportMode::Replace,
        ModeParam::Merge => ImportMode::Merge {
            skip_duplicates: query.skip_duplicates,
        },
    };
    let bundle = Bundle::from_json(&body)?;

    let mut store = state.store()?;
    let summary = import_with_mode(&mut store, bundle, mode)?;
    info!(%mode, inserted = summary.inserted(), "import via API");
    Ok(Json(ApiResponse::ok(summary)))
}

/// GET /api/summary?year=&month= - Dashboard figures for a period
async fn get_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> ApiResult<SummaryResponse> {
    let period = LedgerPeriod::from_parts(query.year, query.month).ok_or_else(|| {
        ApiError::from(LedgerError::InvalidInput(
            "month must be 1-12 and requires a year".to_string(),
        ))
    })?;

    let store = state.store()?;
    let conn = store.conn();
    Ok(Json(ApiResponse::ok(SummaryResponse {
        summary: period_summary(conn, period)?,
        expenses_by_category: category_breakdown(conn, period, TransactionKind::Expense)?,
        income_by_category: category_breakdown(conn, period, TransactionKind::Income)?,
        accounts: account_balances(conn)?,
    })))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServerArgs::parse();
    let config = args.load_config()?;
    if let Err(e) = init_tracing(&config.logging.level, config.logging.json) {
        eprintln!("Warning: logging not initialised: {}", e);
    }

    println!("🌐 Pocket Ledger - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = &config.database.path;
    let mut store = Store::open(db_path)
        .with_context(|| format!("failed to open ledger at {}", db_path.display()))?;

    let backup_path = config.backup_path();
    let report = MigrationRunner::new()
        .backup_to(&backup_path)
        .run(&mut store)
        .with_context(|| {
            format!(
                "database migration failed; schema rolled back, backup (if any) at {}",
                backup_path.display()
            )
        })?;
    println!("✓ Database opened: {} (schema v{})", db_path.display(), report.to_version);

    // Create shared state
    let state = AppState {
        db: Arc::new(Mutex::new(store)),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .route("/export", get(get_export))
        .route("/import", post(post_import))
        .route("/summary", get(get_summary))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    // Start server
    let addr = config.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/summary", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await.context("server stopped")?;
    Ok(())
}
