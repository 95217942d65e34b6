//! Financial report endpoints.

mod common;

use chrono::Utc;
use common::{as_decimal, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn dashboard_reports_current_state() {
    let app = TestApp::spawn().await;
    let (salesperson, token) = app.seed_user(false, None).await;
    let customer = app.seed_customer("Dashboard Customer").await;
    let tour = app.seed_tour("Dashboard Tour").await;
    let booking = app.seed_booking(customer, Some(salesperson), "CLP").await;
    app.seed_booking_tour(booking, tour, dec!(1000), "own-operation", "", "confirmed")
        .await;
    app.seed_booking_payment(booking, Utc::now(), "bank transfer", dec!(1000), "paid")
        .await;

    let response = app
        .client
        .get(app.url("/api/financial/dashboard/?currency=CLP"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Dashboard request failed");
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("Invalid dashboard body");

    assert_eq!(body["currency"], "CLP");
    assert!(body["alerts"]["overduePayments"]["count"].is_number());
    assert!(as_decimal(&body["metrics"]["totalRevenue"]["current"]) >= dec!(1000));
    assert!(body["metrics"]["activeReservations"]["current"].as_i64().unwrap() >= 1);
    assert!(body["monthlyTrends"].is_array());
}

#[tokio::test]
async fn income_statement_identity_holds() {
    let app = TestApp::spawn().await;
    let (salesperson, token) = app.seed_user(false, Some(dec!(10))).await;
    let customer = app.seed_customer("Income Customer").await;
    let tour = app.seed_tour("Income Tour").await;
    let booking = app.seed_booking(customer, Some(salesperson), "CLP").await;
    app.seed_booking_tour(booking, tour, dec!(5000), "own-operation", "", "confirmed")
        .await;
    app.seed_booking_payment(booking, Utc::now(), "cash", dec!(5000), "paid")
        .await;
    app.fire_booking_event(&token, booking).await;

    // One plain expense inside the window.
    let today = Utc::now().date_naive();
    let response = app
        .client
        .post(app.url("/api/financial/expenses/"))
        .bearer_auth(&token)
        .json(&json!({
            "name": "Fuel for vans",
            "expense_type": "variable",
            "category": "transportation",
            "amount": "300",
            "currency": "CLP",
            "payment_status": "paid",
            "payment_date": today,
            "due_date": today
        }))
        .send()
        .await
        .expect("Expense create failed");
    assert_eq!(response.status(), 201);

    let start = today - chrono::Duration::days(30);
    let end = today + chrono::Duration::days(1);
    let response = app
        .client
        .get(app.url(&format!(
            "/api/financial/income-statement/?startDate={}&endDate={}&periodType=monthly&basis=cash&currency=CLP",
            start, end
        )))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Income statement request failed");
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("Invalid body");

    let totals = &body["totals"];
    let revenue = as_decimal(&totals["revenue"]);
    let total_expenses = as_decimal(&totals["totalExpenses"]);
    let commissions = as_decimal(&totals["commissions"]);
    let net_income = as_decimal(&totals["netIncome"]);
    let gross_profit = as_decimal(&totals["grossProfit"]);
    let direct = as_decimal(&totals["directVariableCosts"]);

    assert!(revenue >= dec!(5000));
    assert!(direct >= dec!(300));
    assert_eq!(net_income, revenue - total_expenses - commissions);
    assert_eq!(gross_profit, revenue - direct);

    // The per-period rows cover the requested window.
    assert!(!body["periods"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn cash_flow_carries_running_balance() {
    let app = TestApp::spawn().await;
    let (salesperson, token) = app.seed_user(false, None).await;
    let customer = app.seed_customer("Cashflow Customer").await;
    let tour = app.seed_tour("Cashflow Tour").await;
    let booking = app.seed_booking(customer, Some(salesperson), "CLP").await;
    app.seed_booking_tour(booking, tour, dec!(800), "own-operation", "", "confirmed")
        .await;
    app.seed_booking_payment(booking, Utc::now(), "cash", dec!(800), "paid")
        .await;

    let today = Utc::now().date_naive();
    let start = today - chrono::Duration::days(7);
    let response = app
        .client
        .get(app.url(&format!(
            "/api/financial/cash-flow/?startDate={}&endDate={}&periodType=daily&currency=CLP",
            start, today
        )))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Cash flow request failed");
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("Invalid body");

    let periods = body["periods"].as_array().expect("no periods");
    assert!(periods.len() >= 7, "expected daily buckets, got {}", periods.len());

    // Running balance in each period equals the prior balance plus the
    // period's net flow.
    let mut balance = as_decimal(&body["openingBalance"]);
    for period in periods {
        balance += as_decimal(&period["netFlow"]);
        assert_eq!(as_decimal(&period["runningBalance"]), balance);
    }

    let summary = &body["summary"];
    assert_eq!(
        as_decimal(&summary["netChange"]),
        as_decimal(&summary["totalInflows"]) - as_decimal(&summary["totalOutflows"])
    );
}

#[tokio::test]
async fn bank_statement_includes_transfer_legs() {
    let app = TestApp::spawn().await;
    let (_user, token) = app.seed_user(false, None).await;

    let create_account = |name: &str| {
        let body = json!({"name": name, "account_type": "checking", "currency": "CLP", "initial_balance": "10000"});
        let url = app.url("/api/financial/accounts/");
        let client = app.client.clone();
        let token = token.clone();
        async move {
            let response = client
                .post(url)
                .bearer_auth(&token)
                .json(&body)
                .send()
                .await
                .expect("Account create failed");
            assert_eq!(response.status(), 201);
            let body: serde_json::Value = response.json().await.unwrap();
            body["id"].as_str().unwrap().to_string()
        }
    };

    let from_account = create_account("Statement Checking A").await;
    let to_account = create_account("Statement Checking B").await;

    let today = Utc::now().date_naive();
    let response = app
        .client
        .post(app.url("/api/financial/transfers/"))
        .bearer_auth(&token)
        .json(&json!({
            "from_account_id": from_account,
            "to_account_id": to_account,
            "amount": "2500",
            "transfer_date": today
        }))
        .send()
        .await
        .expect("Transfer failed");
    assert_eq!(response.status(), 201);

    // Both balances moved.
    let balance = |id: String| {
        let pool = app.db.pool().clone();
        async move {
            sqlx::query_scalar::<_, rust_decimal::Decimal>(
                "SELECT current_balance FROM financial_accounts WHERE id = $1::uuid",
            )
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap()
        }
    };
    assert_eq!(balance(from_account.clone()).await, dec!(7500));
    assert_eq!(balance(to_account.clone()).await, dec!(12500));

    let response = app
        .client
        .get(app.url(&format!(
            "/api/financial/bank-statement/?accountId={}&startDate={}&endDate={}",
            from_account,
            today - chrono::Duration::days(1),
            today
        )))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Statement request failed");
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("Invalid body");

    let lines = body["transactions"].as_array().expect("no lines");
    assert!(
        lines
            .iter()
            .any(|line| line["entryType"] == "transfer-out" && as_decimal(&line["amount"]) == dec!(2500)),
        "transfer-out leg missing from statement"
    );

    let totals = &body["totals"];
    assert_eq!(
        as_decimal(&totals["net"]),
        as_decimal(&totals["totalIn"]) - as_decimal(&totals["totalOut"])
    );
}

#[tokio::test]
async fn receivables_and_payables_list_open_items() {
    let app = TestApp::spawn().await;
    let (salesperson, token) = app.seed_user(false, Some(dec!(10))).await;
    let customer = app.seed_customer("Receivable Customer").await;
    let tour = app.seed_tour("Receivable Tour").await;
    let booking = app.seed_booking(customer, Some(salesperson), "CLP").await;
    app.seed_booking_tour(booking, tour, dec!(1200), "own-operation", "", "confirmed")
        .await;
    let payment = app
        .seed_booking_payment(booking, Utc::now(), "cash", dec!(1200), "pending")
        .await;
    let commission = app
        .fire_booking_event(&token, booking)
        .await
        .expect("commission not created");

    let response = app
        .client
        .get(app.url("/api/financial/receivables/"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Receivables request failed");
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .any(|item| item["id"].as_str() == Some(&payment.to_string())));

    let response = app
        .client
        .get(app.url("/api/financial/payables/"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Payables request failed");
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["commissions"]
        .as_array()
        .unwrap()
        .iter()
        .any(|item| item["id"].as_str() == Some(&commission.to_string())));
}
