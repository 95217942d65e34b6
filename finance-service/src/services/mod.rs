//! Service layer: database access, derivation, closing, reporting.

pub mod audit;
pub mod closing;
pub mod currency;
pub mod database;
pub mod ledgers;
pub mod metrics;
pub mod reports;
pub mod sync;

pub use closing::{CloseCommand, CloseOutcome, ClosingEngine};
pub use currency::{CurrencyDefaults, CurrencyService};
pub use database::Database;
pub use ledgers::LedgerEvents;
pub use metrics::init_metrics;
pub use reports::ReportService;
pub use sync::{CommissionSyncOptions, OperatorSyncOptions, SyncReport, SyncService};
