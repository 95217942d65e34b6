//! Application startup and lifecycle management.

use crate::config::FinanceConfig;
use crate::handlers::{
    accounts, closings, commissions, events, expenses, financial, operators,
};
use crate::services::{
    init_metrics, ClosingEngine, CurrencyDefaults, CurrencyService, Database, LedgerEvents,
    ReportService,
};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{extract::State, Json, Router};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::metrics::{metrics_middleware, render_metrics};
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: FinanceConfig,
    pub db: Database,
    pub currency: CurrencyService,
    pub reports: ReportService,
    pub ledger_events: LedgerEvents,
    pub closing_engine: ClosingEngine,
}

/// State for health check endpoints.
#[derive(Clone)]
struct HealthState {
    db: Database,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": "finance-service",
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "service": "finance-service",
                "error": e.to_string()
            })),
        ),
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Prometheus scrape endpoint.
async fn metrics_endpoint() -> impl IntoResponse {
    render_metrics()
}

/// Wire the service layer onto a connected database.
pub fn build_state(config: FinanceConfig, db: Database) -> AppState {
    let currency = CurrencyService::new(db.clone(), CurrencyDefaults::default());
    let reports = ReportService::new(db.clone(), currency.clone());
    let ledger_events = LedgerEvents::new(
        db.clone(),
        config.ledger.default_commission_rate,
        config.ledger.operator_cost_percentage,
    );
    let closing_engine = ClosingEngine::new(db.clone());

    AppState {
        config,
        db,
        currency,
        reports,
        ledger_events,
        closing_engine,
    }
}

fn api_router(state: AppState) -> Router {
    let commissions = Router::new()
        .route("/", get(commissions::list_commissions))
        .route("/summary/", get(commissions::commission_summary))
        .route("/unique-values/", get(commissions::unique_values))
        .route(
            "/extended-unique-values/",
            get(commissions::extended_unique_values),
        )
        .route("/close/", post(closings::close_commissions))
        .route("/closings/", get(closings::list_closings))
        .route("/closings/:id/", get(closings::get_closing))
        .route("/closings/:id/undo/", post(closings::undo_closing))
        .route("/:id/", put(commissions::update_commission));

    let operators = Router::new()
        .route("/", get(operators::list_operator_payments))
        .route("/summary/", get(operators::operator_summary))
        .route("/unique-values/", get(operators::unique_values))
        .route("/close/", post(operators::close_operator_payments))
        .route("/:id/", put(operators::update_operator_payment));

    let events = Router::new()
        .route("/bookings/:id/", post(events::booking_persisted))
        .route("/booking-tours/:id/", post(events::booking_tour_persisted));

    let financial = Router::new()
        .route("/dashboard/", get(financial::dashboard))
        .route("/income-statement/", get(financial::income_statement))
        .route("/cash-flow/", get(financial::cash_flow))
        .route("/bank-statement/", get(financial::bank_statement))
        .route("/receivables/", get(financial::receivables))
        .route("/payables/", get(financial::payables))
        .route(
            "/expenses/",
            get(expenses::list_expenses).post(expenses::create_expense),
        )
        .route("/expenses/summary/", get(expenses::expense_summary))
        .route(
            "/expenses/:id/",
            get(expenses::get_expense)
                .put(expenses::update_expense)
                .delete(expenses::delete_expense),
        )
        .route(
            "/accounts/",
            get(accounts::list_accounts).post(accounts::create_account),
        )
        .route(
            "/accounts/:id/",
            get(accounts::get_account)
                .put(accounts::update_account)
                .delete(accounts::delete_account),
        )
        .route(
            "/transfers/",
            get(accounts::list_transfers).post(accounts::create_transfer),
        );

    Router::new()
        .nest("/api/commissions", commissions)
        .nest("/api/operators", operators)
        .nest("/api/events", events)
        .nest("/api/financial", financial)
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration, running
    /// migrations first.
    pub async fn build(config: FinanceConfig) -> Result<Self, AppError> {
        let db = Self::connect(&config).await?;
        db.run_migrations().await?;
        Self::with_database(config, db).await
    }

    /// Build against an already-migrated database. Integration tests use
    /// this to avoid racing concurrent migration runs.
    pub async fn build_without_migrations(config: FinanceConfig) -> Result<Self, AppError> {
        let db = Self::connect(&config).await?;
        Self::with_database(config, db).await
    }

    async fn connect(config: &FinanceConfig) -> Result<Database, AppError> {
        Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
    }

    async fn with_database(config: FinanceConfig, db: Database) -> Result<Self, AppError> {
        init_metrics();

        // Port 0 binds a random free port for tests.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Finance service listening");

        let state = build_state(config, db);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let health_state = HealthState {
            db: self.state.db.clone(),
        };

        let router = api_router(self.state)
            .route("/health", get(health_check).with_state(health_state.clone()))
            .route("/ready", get(readiness_check).with_state(health_state))
            .route("/metrics", get(metrics_endpoint))
            .layer(axum::middleware::from_fn(metrics_middleware))
            .layer(axum::middleware::from_fn(request_id_middleware))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive());

        axum::serve(self.listener, router).await
    }
}
