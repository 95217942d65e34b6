//! Backfill job semantics: dry-run isolation and idempotency.

mod common;

use common::{test_config, TestApp};
use finance_service::services::{
    CommissionSyncOptions, LedgerEvents, OperatorSyncOptions, SyncService,
};
use rust_decimal_macros::dec;
use serial_test::serial;

fn sync_service(app: &TestApp) -> SyncService {
    let config = test_config();
    let events = LedgerEvents::new(
        app.db.clone(),
        config.ledger.default_commission_rate,
        config.ledger.operator_cost_percentage,
    );
    SyncService::new(app.db.clone(), events)
}

#[tokio::test]
#[serial]
async fn commission_sync_dry_run_commits_nothing() {
    let app = TestApp::spawn().await;
    let sync = sync_service(&app);

    let (salesperson, _) = app.seed_user(false, None).await;
    let customer = app.seed_customer("Sync Customer").await;
    let tour = app.seed_tour("Sync Tour").await;
    let booking = app.seed_booking(customer, Some(salesperson), "CLP").await;
    app.seed_booking_tour(booking, tour, dec!(2000), "third-party", "Andes Trips", "confirmed")
        .await;

    let report = sync
        .sync_commissions(&CommissionSyncOptions {
            dry_run: true,
            commission_rate: dec!(12),
        })
        .await
        .expect("dry run failed");
    assert!(report.dry_run);
    assert!(report.created >= 1);
    assert!(
        app.commission_row(booking).await.is_none(),
        "dry run must not persist anything"
    );

    let report = sync
        .sync_commissions(&CommissionSyncOptions {
            dry_run: false,
            commission_rate: dec!(12),
        })
        .await
        .expect("sync failed");
    assert!(!report.dry_run);
    assert!(report.created >= 1);

    // The override rate applies, and the third-party tour got its
    // payment backfilled, so costs are already folded in (70% of 2000).
    let (costs, net, amount, _) = app
        .commission_row(booking)
        .await
        .expect("commission missing after sync");
    assert_eq!(costs, dec!(1400));
    assert_eq!(net, dec!(600));
    assert_eq!(amount, dec!(72));

    let payment_count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM operator_payments op
        JOIN booking_tours bt ON bt.id = op.booking_tour_id
        WHERE bt.booking_id = $1
        "#,
    )
    .bind(booking)
    .fetch_one(app.db.pool())
    .await
    .unwrap();
    assert_eq!(payment_count, 1);

    // A second run leaves the booking untouched.
    sync.sync_commissions(&CommissionSyncOptions {
        dry_run: false,
        commission_rate: dec!(12),
    })
    .await
    .expect("second sync failed");
    let commission_count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM commissions WHERE booking_id = $1")
            .bind(booking)
            .fetch_one(app.db.pool())
            .await
            .unwrap();
    assert_eq!(commission_count, 1);
}

#[tokio::test]
#[serial]
async fn operator_sync_covers_own_operations_only_when_asked() {
    let app = TestApp::spawn().await;
    let sync = sync_service(&app);

    let (salesperson, _) = app.seed_user(false, None).await;
    let customer = app.seed_customer("Operator Sync Customer").await;
    let tour = app.seed_tour("Fallback Name Tour").await;
    let booking = app.seed_booking(customer, Some(salesperson), "CLP").await;
    let booking_tour = app
        .seed_booking_tour(booking, tour, dec!(1000), "own-operation", "", "confirmed")
        .await;

    // Default scope skips own-operation tours.
    sync.sync_operator_payments(&OperatorSyncOptions {
        dry_run: false,
        all_operators: false,
        cost_percentage: dec!(70),
    })
    .await
    .expect("sync failed");
    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM operator_payments WHERE booking_tour_id = $1",
    )
    .bind(booking_tour)
    .fetch_one(app.db.pool())
    .await
    .unwrap();
    assert_eq!(exists, 0);

    // With --all-operators the tour gets an own-operation row, named
    // after the tour since the operator field is blank.
    sync.sync_operator_payments(&OperatorSyncOptions {
        dry_run: false,
        all_operators: true,
        cost_percentage: dec!(50),
    })
    .await
    .expect("sync failed");

    let (operator_name, operation_type, cost_amount) =
        sqlx::query_as::<_, (String, String, rust_decimal::Decimal)>(
            r#"
            SELECT operator_name, operation_type, cost_amount
            FROM operator_payments WHERE booking_tour_id = $1
            "#,
        )
        .bind(booking_tour)
        .fetch_one(app.db.pool())
        .await
        .expect("payment missing");
    assert_eq!(operator_name, "Fallback Name Tour");
    assert_eq!(operation_type, "own-operation");
    assert_eq!(cost_amount, dec!(500));
}
