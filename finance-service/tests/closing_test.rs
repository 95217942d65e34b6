//! Close and undo over both ledgers.

mod common;

use common::{as_decimal, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

async fn commission_for_new_booking(app: &TestApp, token: &str, subtotal: rust_decimal::Decimal) -> (Uuid, Uuid) {
    let (salesperson, _) = app.seed_user(false, Some(dec!(10))).await;
    let customer = app.seed_customer("Closing Test Customer").await;
    let tour = app.seed_tour("Closing Test Tour").await;
    let booking = app.seed_booking(customer, Some(salesperson), "CLP").await;
    app.seed_booking_tour(booking, tour, subtotal, "own-operation", "", "confirmed")
        .await;
    let commission = app
        .fire_booking_event(token, booking)
        .await
        .expect("commission not created");
    (booking, commission)
}

#[tokio::test]
async fn close_and_undo_commissions_round_trip() {
    let app = TestApp::spawn().await;
    let (_staff, token) = app.seed_user(true, None).await;

    let (booking_a, commission_a) = commission_for_new_booking(&app, &token, dec!(1000)).await;
    let (_booking_b, commission_b) = commission_for_new_booking(&app, &token, dec!(2000)).await;

    let response = app
        .client
        .post(app.url("/api/commissions/close/"))
        .bearer_auth(&token)
        .json(&json!({
            "commission_ids": [commission_a, commission_b],
            "closing_type": "salesperson",
            "recipient_name": "Test Salesperson",
            "period_start": "2026-06-01",
            "period_end": "2026-06-30",
            "currency": "CLP"
        }))
        .send()
        .await
        .expect("Close request failed");
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.expect("Invalid close body");

    let closing = &body["closing"];
    // 10% of 1000 + 10% of 2000.
    assert_eq!(as_decimal(&closing["total_amount"]), dec!(300));
    assert_eq!(closing["item_count"], 2);
    let invoice = closing["invoice_number"].as_str().expect("no invoice");
    assert!(invoice.starts_with("COM-"), "got invoice {}", invoice);
    let closing_id = Uuid::parse_str(closing["id"].as_str().unwrap()).unwrap();
    let expense_id = Uuid::parse_str(body["expenseId"].as_str().unwrap()).unwrap();

    // Items are stamped and the backing expense exists.
    let (_, _, _, is_closed) = app.commission_row(booking_a).await.unwrap();
    assert!(is_closed);
    let (category, status) = sqlx::query_as::<_, (String, String)>(
        "SELECT category, payment_status FROM expenses WHERE id = $1",
    )
    .bind(expense_id)
    .fetch_one(app.db.pool())
    .await
    .expect("expense missing");
    assert_eq!(category, "commission");
    assert_eq!(status, "pending");

    // Closed rows silently fall out of a second batch; alone they make
    // the effective set empty.
    let response = app
        .client
        .post(app.url("/api/commissions/close/"))
        .bearer_auth(&token)
        .json(&json!({
            "commission_ids": [commission_a],
            "closing_type": "salesperson",
            "recipient_name": "Test Salesperson",
            "period_start": "2026-06-01",
            "period_end": "2026-06-30",
            "currency": "CLP"
        }))
        .send()
        .await
        .expect("Close request failed");
    assert_eq!(response.status(), 400);

    // Undo restores everything.
    let response = app
        .client
        .post(app.url(&format!("/api/commissions/closings/{}/undo/", closing_id)))
        .bearer_auth(&token)
        .json(&json!({"reason": "wrong period"}))
        .send()
        .await
        .expect("Undo request failed");
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("Invalid undo body");
    assert_eq!(body["reopenedCount"], 2);

    let (_, _, _, is_closed) = app.commission_row(booking_a).await.unwrap();
    assert!(!is_closed);
    let expense_gone = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM expenses WHERE id = $1")
        .bind(expense_id)
        .fetch_one(app.db.pool())
        .await
        .unwrap();
    assert_eq!(expense_gone, 0);

    // An undone closing reads as gone.
    let response = app
        .client
        .post(app.url(&format!("/api/commissions/closings/{}/undo/", closing_id)))
        .bearer_auth(&token)
        .json(&json!({"reason": "again"}))
        .send()
        .await
        .expect("Undo request failed");
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn adjustments_require_staff() {
    let app = TestApp::spawn().await;
    let (_user, token) = app.seed_user(false, None).await;
    let (_booking, commission) = commission_for_new_booking(&app, &token, dec!(1000)).await;

    let response = app
        .client
        .post(app.url("/api/commissions/close/"))
        .bearer_auth(&token)
        .json(&json!({
            "commission_ids": [commission],
            "closing_type": "salesperson",
            "recipient_name": "Someone",
            "period_start": "2026-06-01",
            "period_end": "2026-06-30",
            "currency": "CLP",
            "adjustments": { (commission.to_string()): "120" }
        }))
        .send()
        .await
        .expect("Close request failed");
    assert_eq!(response.status(), 403);

    // Nothing was mutated.
    let (_, _, amount, is_closed) = app.commission_row(_booking).await.unwrap();
    assert_eq!(amount, dec!(100));
    assert!(!is_closed);
}

#[tokio::test]
async fn undo_requires_staff() {
    let app = TestApp::spawn().await;
    let (_staff, staff_token) = app.seed_user(true, None).await;
    let (_user, user_token) = app.seed_user(false, None).await;
    let (_booking, commission) = commission_for_new_booking(&app, &staff_token, dec!(1000)).await;

    let response = app
        .client
        .post(app.url("/api/commissions/close/"))
        .bearer_auth(&staff_token)
        .json(&json!({
            "commission_ids": [commission],
            "closing_type": "salesperson",
            "recipient_name": "Someone",
            "period_start": "2026-06-01",
            "period_end": "2026-06-30",
            "currency": "CLP"
        }))
        .send()
        .await
        .expect("Close request failed");
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    let closing_id = body["closing"]["id"].as_str().unwrap().to_string();

    let response = app
        .client
        .post(app.url(&format!("/api/commissions/closings/{}/undo/", closing_id)))
        .bearer_auth(&user_token)
        .json(&json!({"reason": "not allowed"}))
        .send()
        .await
        .expect("Undo request failed");
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn pending_operator_payment_blocks_the_whole_close() {
    let app = TestApp::spawn().await;
    let (salesperson, token) = app.seed_user(true, None).await;
    let customer = app.seed_customer("Operator Close Customer").await;
    let tour = app.seed_tour("Operator Close Tour").await;
    let booking = app.seed_booking(customer, Some(salesperson), "CLP").await;
    let tour_ok = app
        .seed_booking_tour(booking, tour, dec!(1000), "third-party", "Andes Trips", "confirmed")
        .await;
    let tour_pending = app
        .seed_booking_tour(booking, tour, dec!(500), "third-party", "Andes Trips", "pending")
        .await;

    let payment_ok = app
        .fire_booking_tour_event(&token, tour_ok)
        .await
        .expect("payment not created");
    let payment_pending = app
        .fire_booking_tour_event(&token, tour_pending)
        .await
        .expect("payment not created");

    let close_body = |ids: Vec<Uuid>| {
        json!({
            "operator_payment_ids": ids,
            "closing_type": "operator",
            "recipient_name": "Andes Trips",
            "period_start": "2026-06-01",
            "period_end": "2026-06-30",
            "currency": "CLP"
        })
    };

    let response = app
        .client
        .post(app.url("/api/operators/close/"))
        .bearer_auth(&token)
        .json(&close_body(vec![payment_ok, payment_pending]))
        .send()
        .await
        .expect("Close request failed");
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    let blocked: Vec<String> = body["non_closable_ids"]
        .as_array()
        .expect("missing non_closable_ids")
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(blocked, vec![payment_pending.to_string()]);

    // Neither row was touched.
    let closed_count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM operator_payments WHERE id = ANY($1) AND is_closed",
    )
    .bind(vec![payment_ok, payment_pending])
    .fetch_one(app.db.pool())
    .await
    .unwrap();
    assert_eq!(closed_count, 0);

    // Without the pending row the close goes through with an OPR invoice.
    let response = app
        .client
        .post(app.url("/api/operators/close/"))
        .bearer_auth(&token)
        .json(&close_body(vec![payment_ok]))
        .send()
        .await
        .expect("Close request failed");
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    let invoice = body["closing"]["invoice_number"].as_str().unwrap();
    assert!(invoice.starts_with("OPR-"), "got invoice {}", invoice);
    // 70% of the 1000 subtotal.
    assert_eq!(as_decimal(&body["closing"]["total_amount"]), dec!(700));

    // Operator closings back an 'other' expense.
    let expense_id = body["expenseId"].as_str().unwrap();
    let category = sqlx::query_scalar::<_, String>("SELECT category FROM expenses WHERE id = $1::uuid")
        .bind(expense_id)
        .fetch_one(app.db.pool())
        .await
        .unwrap();
    assert_eq!(category, "other");
}

#[tokio::test]
async fn closing_detail_lists_members_and_audit_trail() {
    let app = TestApp::spawn().await;
    let (_staff, token) = app.seed_user(true, None).await;
    let (_booking, commission) = commission_for_new_booking(&app, &token, dec!(1000)).await;

    let response = app
        .client
        .post(app.url("/api/commissions/close/"))
        .bearer_auth(&token)
        .json(&json!({
            "commission_ids": [commission],
            "closing_type": "agency",
            "recipient_name": "Patagonia Travel",
            "period_start": "2026-06-01",
            "period_end": "2026-06-30",
            "currency": "CLP"
        }))
        .send()
        .await
        .expect("Close request failed");
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    let closing_id = body["closing"]["id"].as_str().unwrap().to_string();
    assert!(body["closing"]["invoice_number"]
        .as_str()
        .unwrap()
        .starts_with("AGY-"));

    let response = app
        .client
        .get(app.url(&format!("/api/commissions/closings/{}/", closing_id)))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Detail request failed");
    assert_eq!(response.status(), 200);
    let detail: serde_json::Value = response.json().await.unwrap();

    let members = detail["commissions"].as_array().expect("no members");
    assert_eq!(members.len(), 1);
    assert_eq!(members[0]["id"].as_str().unwrap(), commission.to_string());

    // One 'close' row per item plus one for the closing itself.
    let audit = detail["auditLog"].as_array().expect("no audit log");
    assert!(audit.len() >= 2, "expected close audit rows, got {}", audit.len());
}
