//! Configuration module for finance-service.

use rust_decimal::Decimal;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct FinanceConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Derivation policy knobs for the commission and operator ledgers.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Rate applied when the salesperson has no stored commission rate.
    pub default_commission_rate: Decimal,
    /// Share of a bought-in tour's subtotal estimated as operator cost.
    pub operator_cost_percentage: Decimal,
}

fn decimal_env(name: &str, default: Decimal) -> Result<Decimal, AppError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse().map_err(|_| {
            AppError::ConfigError(anyhow::anyhow!("{} is not a valid decimal: '{}'", name, raw))
        }),
    }
}

impl FinanceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "finance-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            ledger: LedgerConfig {
                default_commission_rate: decimal_env(
                    "DEFAULT_COMMISSION_RATE",
                    Decimal::new(100, 1),
                )?,
                operator_cost_percentage: decimal_env(
                    "OPERATOR_COST_PERCENTAGE",
                    Decimal::new(700, 1),
                )?,
            },
        })
    }
}
