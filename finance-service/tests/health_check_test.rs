mod common;

use common::TestApp;

#[tokio::test]
async fn health_endpoints_respond() {
    let app = TestApp::spawn().await;

    let health = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .expect("Health request failed");
    assert!(health.status().is_success());
    let body: serde_json::Value = health.json().await.expect("Invalid health body");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "finance-service");

    let ready = app
        .client
        .get(app.url("/ready"))
        .send()
        .await
        .expect("Ready request failed");
    assert!(ready.status().is_success());

    let metrics = app
        .client
        .get(app.url("/metrics"))
        .send()
        .await
        .expect("Metrics request failed");
    assert!(metrics.status().is_success());
}

#[tokio::test]
async fn api_requires_bearer_token() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(app.url("/api/commissions/"))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), 401);

    let response = app
        .client
        .get(app.url("/api/commissions/"))
        .bearer_auth("not-a-real-token")
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), 401);
}
