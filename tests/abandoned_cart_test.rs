//! Abandoned-cart lifecycle: debounced one-shot creation, recovery on
//! payment, and merchant follow-up.

mod common;

use std::time::Duration;

use axum::http::Method;
use common::{response_json, TestApp};
use pixcheckout_api::config::CheckoutConfig;
use pixcheckout_api::gateway::PaymentStatus;
use serde_json::json;

async fn cart_count(app: &TestApp) -> usize {
    let response = app
        .request_authenticated(Method::GET, "/api/v1/abandoned-carts", None)
        .await;
    assert_eq!(response.status(), 200);
    response_json(response).await["data"]
        .as_array()
        .unwrap()
        .len()
}

async fn carts(app: &TestApp) -> serde_json::Value {
    let response = app
        .request_authenticated(Method::GET, "/api/v1/abandoned-carts", None)
        .await;
    assert_eq!(response.status(), 200);
    response_json(response).await
}

#[tokio::test]
async fn cart_is_created_once_after_the_inactivity_delay() {
    let app = TestApp::with_checkout_config(CheckoutConfig {
        poll_interval_ms: 25,
        poll_timeout_ms: 500,
        abandoned_cart_delay_ms: 150,
    })
    .await;
    app.seed_product("curso-pix", 5000).await;

    let session = app.open_session("curso-pix", "utm_source=ig").await;
    let session_id = session["data"]["session_id"].as_str().unwrap().to_string();
    app.fill_buyer(&session_id).await;

    assert_eq!(cart_count(&app).await, 0);

    tokio::time::sleep(Duration::from_millis(400)).await;
    let listing = carts(&app).await;
    let carts = listing["data"].as_array().unwrap();
    assert_eq!(carts.len(), 1);
    assert_eq!(carts[0]["status"], "not_contacted");
    assert_eq!(carts[0]["potential_value_cents"], 5000);
    assert_eq!(carts[0]["customer_email"], "maria@example.com");

    // Further buyer edits never create a second record for the session.
    app.fill_buyer(&session_id).await;
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(cart_count(&app).await, 1);
}

#[tokio::test]
async fn every_keystroke_rearms_the_debounce() {
    let app = TestApp::with_checkout_config(CheckoutConfig {
        poll_interval_ms: 25,
        poll_timeout_ms: 500,
        abandoned_cart_delay_ms: 400,
    })
    .await;
    app.seed_product("curso-pix", 5000).await;

    let session = app.open_session("curso-pix", "").await;
    let session_id = session["data"]["session_id"].as_str().unwrap().to_string();

    app.fill_buyer(&session_id).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    // Second edit at ~200ms pushes the deadline to ~600ms.
    app.fill_buyer(&session_id).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    // ~500ms: the original deadline passed, the re-armed one did not.
    assert_eq!(cart_count(&app).await, 0);

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(cart_count(&app).await, 1);
}

#[tokio::test]
async fn no_email_means_no_cart() {
    let app = TestApp::with_checkout_config(CheckoutConfig {
        poll_interval_ms: 25,
        poll_timeout_ms: 500,
        abandoned_cart_delay_ms: 100,
    })
    .await;
    app.seed_product("curso-pix", 5000).await;

    let session = app.open_session("curso-pix", "").await;
    let session_id = session["data"]["session_id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/checkout/sessions/{}/buyer", session_id),
            Some(json!({"name": "Maria Souza", "whatsapp_number": "11999990000"})),
        )
        .await;
    assert_eq!(response.status(), 200);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(cart_count(&app).await, 0);
}

#[tokio::test]
async fn cart_flips_to_recovered_when_the_sale_completes() {
    let app = TestApp::with_checkout_config(CheckoutConfig {
        poll_interval_ms: 25,
        poll_timeout_ms: 500,
        abandoned_cart_delay_ms: 100,
    })
    .await;
    app.seed_product("curso-pix", 5000).await;

    let session = app.open_session("curso-pix", "").await;
    let session_id = session["data"]["session_id"].as_str().unwrap().to_string();
    app.fill_buyer(&session_id).await;

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(cart_count(&app).await, 1);

    app.gateway.push_status(PaymentStatus::Paid);
    app.request(
        Method::POST,
        &format!("/api/v1/checkout/sessions/{}/submit", session_id),
        None,
    )
    .await;
    app.wait_for_phase(&session_id, "PAID", Duration::from_secs(3))
        .await;

    let listing = carts(&app).await;
    assert_eq!(listing["data"][0]["status"], "recovered");
}

#[tokio::test]
async fn payment_completed_before_the_delay_suppresses_the_cart() {
    let app = TestApp::with_checkout_config(CheckoutConfig {
        poll_interval_ms: 25,
        poll_timeout_ms: 500,
        abandoned_cart_delay_ms: 300,
    })
    .await;
    app.seed_product("curso-pix", 5000).await;

    let session = app.open_session("curso-pix", "").await;
    let session_id = session["data"]["session_id"].as_str().unwrap().to_string();
    app.fill_buyer(&session_id).await;

    app.gateway.push_status(PaymentStatus::Paid);
    app.request(
        Method::POST,
        &format!("/api/v1/checkout/sessions/{}/submit", session_id),
        None,
    )
    .await;
    app.wait_for_phase(&session_id, "PAID", Duration::from_secs(3))
        .await;

    // The debounce fires after the payment completed; the guard skips it.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(cart_count(&app).await, 0);
}

#[tokio::test]
async fn merchant_follow_up_transitions() {
    let app = TestApp::with_checkout_config(CheckoutConfig {
        poll_interval_ms: 25,
        poll_timeout_ms: 500,
        abandoned_cart_delay_ms: 100,
    })
    .await;
    app.seed_product("curso-pix", 5000).await;

    let session = app.open_session("curso-pix", "").await;
    let session_id = session["data"]["session_id"].as_str().unwrap().to_string();
    app.fill_buyer(&session_id).await;
    tokio::time::sleep(Duration::from_millis(250)).await;

    let listing = carts(&app).await;
    let cart_id = listing["data"][0]["id"].as_str().unwrap().to_string();

    let updated = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/abandoned-carts/{}/status", cart_id),
            Some(json!({"status": "email_sent"})),
        )
        .await;
    assert_eq!(updated.status(), 200);
    assert_eq!(response_json(updated).await["data"]["status"], "email_sent");

    // `recovered` is reserved for the sale-completion path.
    let forbidden = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/abandoned-carts/{}/status", cart_id),
            Some(json!({"status": "recovered"})),
        )
        .await;
    assert_eq!(forbidden.status(), 400);
}

#[tokio::test]
async fn cart_listing_requires_a_bearer_token() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::GET, "/api/v1/abandoned-carts", None)
        .await;
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn teardown_cancels_a_pending_debounce() {
    let app = TestApp::with_checkout_config(CheckoutConfig {
        poll_interval_ms: 25,
        poll_timeout_ms: 500,
        abandoned_cart_delay_ms: 200,
    })
    .await;
    app.seed_product("curso-pix", 5000).await;

    let session = app.open_session("curso-pix", "").await;
    let session_id = session["data"]["session_id"].as_str().unwrap().to_string();
    app.fill_buyer(&session_id).await;

    app.request(
        Method::DELETE,
        &format!("/api/v1/checkout/sessions/{}", session_id),
        None,
    )
    .await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(cart_count(&app).await, 0);
}
