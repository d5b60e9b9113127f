//! Credit balance, history and grant integration tests.

mod common;

use common::TestHarness;
use serde_json::json;

// ============================================================================
// Balance
// ============================================================================

#[tokio::test]
async fn get_balance_for_new_user_is_zero() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["available"], 0);
    assert_eq!(body["total"], 0);
    assert_eq!(body["used"], 0);
}

#[tokio::test]
async fn get_balance_without_auth_fails() {
    let harness = TestHarness::new();

    let response = harness.server.get("/v1/credits/balance").await;

    response.assert_status_unauthorized();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn get_balance_with_malformed_token_fails() {
    let harness = TestHarness::new();

    harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", "Bearer test-token:not-a-uuid")
        .await
        .assert_status_unauthorized();
}

// ============================================================================
// Grants
// ============================================================================

#[tokio::test]
async fn grant_credits_success() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/credits/grant")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": 500,
            "category": "purchase",
            "reference_id": "order-1"
        }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["already_processed"], false);
    assert_eq!(body["transaction"]["type"], "credit");
    assert_eq!(body["transaction"]["amount"], 500);
    assert_eq!(body["balance"]["available"], 500);

    let response = harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", harness.user_auth_header())
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["available"], 500);
    assert_eq!(body["total"], 500);
}

#[tokio::test]
async fn grant_credits_is_idempotent_on_reference() {
    let harness = TestHarness::new();
    let grant = json!({
        "user_id": harness.test_user_id.to_string(),
        "amount": 100,
        "reference_id": "order-7"
    });

    harness
        .server
        .post("/v1/credits/grant")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&grant)
        .await
        .assert_status_ok();

    let response = harness
        .server
        .post("/v1/credits/grant")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&grant)
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["already_processed"], true);
    assert_eq!(body["balance"]["available"], 100);
}

#[tokio::test]
async fn grant_reference_of_other_user_conflicts() {
    let harness = TestHarness::new();

    harness
        .server
        .post("/v1/credits/grant")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": 100,
            "reference_id": "order-7"
        }))
        .await
        .assert_status_ok();

    let response = harness
        .server
        .post("/v1/credits/grant")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "user_id": credit_ledger_core::UserId::generate().to_string(),
            "amount": 100,
            "reference_id": "order-7"
        }))
        .await;

    response.assert_status(axum::http::StatusCode::CONFLICT);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "already_processed");
}

#[tokio::test]
async fn grant_credits_rejects_bad_input() {
    let harness = TestHarness::new();
    let user_id = harness.test_user_id.to_string();

    for body in [
        json!({ "user_id": user_id, "amount": 0 }),
        json!({ "user_id": user_id, "amount": -5 }),
        json!({ "user_id": "nope", "amount": 5 }),
        json!({ "user_id": user_id, "amount": 5, "category": "trade" }),
    ] {
        harness
            .server
            .post("/v1/credits/grant")
            .add_header("x-api-key", harness.service_api_key.clone())
            .json(&body)
            .await
            .assert_status_bad_request();
    }
}

#[tokio::test]
async fn grant_credits_requires_service_key() {
    let harness = TestHarness::new();

    harness
        .server
        .post("/v1/credits/grant")
        .add_header("x-api-key", "wrong-key")
        .json(&json!({ "user_id": harness.test_user_id.to_string(), "amount": 5 }))
        .await
        .assert_status_unauthorized();

    harness
        .server
        .post("/v1/credits/grant")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "user_id": harness.test_user_id.to_string(), "amount": 5 }))
        .await
        .assert_status_unauthorized();
}

// ============================================================================
// Transactions & Summary
// ============================================================================

async fn grant(harness: &TestHarness, amount: i64) {
    harness
        .server
        .post("/v1/credits/grant")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": amount,
            "category": "bonus"
        }))
        .await
        .assert_status_ok();
    // Distinct ULID milliseconds keep ordering deterministic.
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
}

#[tokio::test]
async fn list_transactions_empty() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/credits/transactions")
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert!(body["transactions"].as_array().unwrap().is_empty());
    assert_eq!(body["total"], 0);
    assert_eq!(body["page"], 1);
    assert_eq!(body["limit"], 20);
}

#[tokio::test]
async fn list_transactions_pages_newest_first() {
    let harness = TestHarness::new();
    for amount in [10, 20, 30] {
        grant(&harness, amount).await;
    }

    let response = harness
        .server
        .get("/v1/credits/transactions?page=1&limit=2")
        .add_header("authorization", harness.user_auth_header())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["total"], 3);
    let txs = body["transactions"].as_array().unwrap();
    assert_eq!(txs.len(), 2);
    assert_eq!(txs[0]["amount"], 30);
    assert_eq!(txs[1]["amount"], 20);

    let response = harness
        .server
        .get("/v1/credits/transactions?page=2&limit=2")
        .add_header("authorization", harness.user_auth_header())
        .await;
    let body: serde_json::Value = response.json();
    let txs = body["transactions"].as_array().unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0]["amount"], 10);
}

#[tokio::test]
async fn list_transactions_clamps_limit() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/credits/transactions?limit=1000")
        .add_header("authorization", harness.user_auth_header())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["limit"], 100);
}

#[tokio::test]
async fn transactions_are_isolated_per_user() {
    let harness = TestHarness::new();
    grant(&harness, 10).await;

    let response = harness
        .server
        .get("/v1/credits/transactions")
        .add_header("authorization", TestHarness::other_user_auth_header())
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn summary_counts_transactions() {
    let harness = TestHarness::new();
    grant(&harness, 10).await;
    grant(&harness, 5).await;

    let response = harness
        .server
        .get("/v1/credits/summary")
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["total"], 15);
    assert_eq!(body["available"], 15);
    assert_eq!(body["used"], 0);
    assert_eq!(body["transaction_count"], 2);
}
