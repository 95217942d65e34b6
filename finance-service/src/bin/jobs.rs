//! Offline backfill jobs for the finance ledgers.
//!
//! Runs against the same database and configuration as the service.
//! Progress and the final summary go to stdout so the jobs can be run
//! from cron or by hand.

use clap::{Parser, Subcommand};
use finance_service::config::FinanceConfig;
use finance_service::services::{
    CommissionSyncOptions, Database, LedgerEvents, OperatorSyncOptions, SyncReport, SyncService,
};
use rust_decimal::Decimal;
use service_core::observability::init_tracing;

#[derive(Parser)]
#[command(name = "finance-jobs", version, about = "Backfill jobs for the finance ledgers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create missing commissions for bookings that have tour lines.
    SyncCommissions {
        /// Report what would be created without committing anything.
        #[arg(long)]
        dry_run: bool,
        /// Rate for bookings whose salesperson has no stored rate.
        #[arg(long, default_value = "10.0")]
        commission_rate: Decimal,
    },
    /// Create missing operator payments for booking tours.
    SyncOperatorPayments {
        /// Report what would be created without committing anything.
        #[arg(long)]
        dry_run: bool,
        /// Cover tours of any operator type, not just bought-in ones.
        #[arg(long)]
        all_operators: bool,
        /// Share of the tour subtotal recorded as estimated cost.
        #[arg(long, default_value = "70.0")]
        cost_percentage: Decimal,
    },
}

fn print_summary(job: &str, report: &SyncReport) {
    if report.dry_run {
        println!("[dry run] no changes were committed");
    }
    println!(
        "{}: examined {} candidates, created {} rows",
        job, report.examined, report.created
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = FinanceConfig::from_env().map_err(|e| anyhow::anyhow!("{}", e))?;
    // Jobs log to stdout only; no OTLP pipeline.
    init_tracing("finance-jobs", &config.log_level, None);

    let db = Database::new(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
    )
    .await
    .map_err(|e| anyhow::anyhow!("{}", e))?;

    let events = LedgerEvents::new(
        db.clone(),
        config.ledger.default_commission_rate,
        config.ledger.operator_cost_percentage,
    );
    let sync = SyncService::new(db, events);

    match cli.command {
        Command::SyncCommissions {
            dry_run,
            commission_rate,
        } => {
            println!(
                "Syncing commissions (rate {}%{})...",
                commission_rate,
                if dry_run { ", dry run" } else { "" }
            );
            let report = sync
                .sync_commissions(&CommissionSyncOptions {
                    dry_run,
                    commission_rate,
                })
                .await
                .map_err(|e| anyhow::anyhow!("{}", e))?;
            print_summary("sync-commissions", &report);
        }
        Command::SyncOperatorPayments {
            dry_run,
            all_operators,
            cost_percentage,
        } => {
            println!(
                "Syncing operator payments (cost {}%{}{})...",
                cost_percentage,
                if all_operators { ", all operators" } else { "" },
                if dry_run { ", dry run" } else { "" }
            );
            let report = sync
                .sync_operator_payments(&OperatorSyncOptions {
                    dry_run,
                    all_operators,
                    cost_percentage,
                })
                .await
                .map_err(|e| anyhow::anyhow!("{}", e))?;
            print_summary("sync-operator-payments", &report);
        }
    }

    Ok(())
}
