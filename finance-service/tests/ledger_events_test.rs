//! Ledger derivation through the reservation event endpoints.

mod common;

use common::TestApp;
use rust_decimal_macros::dec;

#[tokio::test]
async fn booking_event_creates_commission_once() {
    let app = TestApp::spawn().await;
    let (salesperson, token) = app.seed_user(false, Some(dec!(15))).await;
    let customer = app.seed_customer("Elena Diaz").await;
    let tour = app.seed_tour("Valle Nevado Day Trip").await;
    let booking = app.seed_booking(customer, Some(salesperson), "CLP").await;
    app.seed_booking_tour(booking, tour, dec!(1000), "own-operation", "", "confirmed")
        .await;

    let created = app.fire_booking_event(&token, booking).await;
    assert!(created.is_some(), "first event should create the commission");

    // No operator payments yet, so the whole gross is commissionable.
    let (costs, net, amount, is_closed) = app
        .commission_row(booking)
        .await
        .expect("commission missing");
    assert_eq!(costs, dec!(0));
    assert_eq!(net, dec!(1000));
    assert_eq!(amount, dec!(150));
    assert!(!is_closed);

    // Replaying the event must not create a second row.
    let replayed = app.fire_booking_event(&token, booking).await;
    assert!(replayed.is_none());

    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM commissions WHERE booking_id = $1",
    )
    .bind(booking)
    .fetch_one(app.db.pool())
    .await
    .expect("count failed");
    assert_eq!(count, 1);
}

#[tokio::test]
async fn booking_without_tours_gets_no_commission() {
    let app = TestApp::spawn().await;
    let (salesperson, token) = app.seed_user(false, None).await;
    let customer = app.seed_customer("Empty Booking Co").await;
    let booking = app.seed_booking(customer, Some(salesperson), "CLP").await;

    let created = app.fire_booking_event(&token, booking).await;
    assert!(created.is_none());
    assert!(app.commission_row(booking).await.is_none());
}

#[tokio::test]
async fn third_party_tour_event_creates_payment_and_refreshes_costs() {
    let app = TestApp::spawn().await;
    let (salesperson, token) = app.seed_user(false, Some(dec!(10))).await;
    let customer = app.seed_customer("Marco Rossi").await;
    let tour = app.seed_tour("Atacama Stargazing").await;
    let booking = app.seed_booking(customer, Some(salesperson), "CLP").await;
    let booking_tour = app
        .seed_booking_tour(booking, tour, dec!(2000), "third-party", "Andes Trips", "confirmed")
        .await;

    app.fire_booking_event(&token, booking).await;

    let payment = app.fire_booking_tour_event(&token, booking_tour).await;
    assert!(payment.is_some(), "third-party tour should get a payment");

    // Default cost percentage is 70%, so 1400 of the 2000 subtotal.
    let (cost_amount, logistic_status) = sqlx::query_as::<_, (rust_decimal::Decimal, String)>(
        "SELECT cost_amount, logistic_status FROM operator_payments WHERE booking_tour_id = $1",
    )
    .bind(booking_tour)
    .fetch_one(app.db.pool())
    .await
    .expect("payment missing");
    assert_eq!(cost_amount, dec!(1400));
    assert_eq!(logistic_status, "confirmed");

    // The parent commission re-derives from the new costs.
    let (costs, net, amount, _) = app
        .commission_row(booking)
        .await
        .expect("commission missing");
    assert_eq!(costs, dec!(1400));
    assert_eq!(net, dec!(600));
    assert_eq!(amount, dec!(60));

    // Replay is a no-op.
    let replayed = app.fire_booking_tour_event(&token, booking_tour).await;
    assert!(replayed.is_none());
}

#[tokio::test]
async fn own_operation_tour_event_creates_no_payment() {
    let app = TestApp::spawn().await;
    let (salesperson, token) = app.seed_user(false, None).await;
    let customer = app.seed_customer("Sofia Alvarez").await;
    let tour = app.seed_tour("City Walking Tour").await;
    let booking = app.seed_booking(customer, Some(salesperson), "CLP").await;
    let booking_tour = app
        .seed_booking_tour(booking, tour, dec!(500), "own-operation", "", "confirmed")
        .await;

    app.fire_booking_event(&token, booking).await;
    let payment = app.fire_booking_tour_event(&token, booking_tour).await;
    assert!(payment.is_none());
}
