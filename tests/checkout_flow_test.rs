//! End-to-end checkout flow: charge creation, status polling, terminal
//! reconciliation, sale recording and retry semantics.

mod common;

use std::time::Duration;

use axum::http::Method;
use common::{response_json, TestApp};
use pixcheckout_api::gateway::PaymentStatus;
use serde_json::json;

#[tokio::test]
async fn pending_then_paid_records_sale_with_full_amount() {
    let app = TestApp::new().await;
    app.seed_product("curso-pix", 5000).await;

    let session = app.open_session("curso-pix", "utm_source=ig&utm_campaign=lancamento").await;
    let session_id = session["data"]["session_id"].as_str().unwrap().to_string();
    app.fill_buyer(&session_id).await;

    app.gateway.push_status(PaymentStatus::WaitingPayment);
    app.gateway.push_status(PaymentStatus::Paid);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/sessions/{}/submit", session_id),
            None,
        )
        .await;
    assert_eq!(response.status(), 200);
    let submitted = response_json(response).await;
    assert_eq!(submitted["data"]["phase"], "AWAITING_PAYMENT");
    assert!(submitted["data"]["charge"]["qr_code"]
        .as_str()
        .unwrap()
        .starts_with("00020126"));

    let create = app.gateway.last_create_request().unwrap();
    assert_eq!(create.amount_cents, 5000);
    assert_eq!(create.original_amount_cents, 5000);
    assert!(!create.is_upsell);
    assert_eq!(
        create.tracking_params.get("utm_source").map(String::as_str),
        Some("ig")
    );
    assert_eq!(create.buyer.whatsapp, "+5511999990000");

    let paid = app
        .wait_for_phase(&session_id, "PAID", Duration::from_secs(3))
        .await;
    assert_eq!(paid["data"]["payment_status"], "PAID");
    assert!(app.gateway.polls() >= 2);

    let charge_id = paid["data"]["charge"]["charge_id"].as_str().unwrap();
    let confirmation = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/confirmation/{}", charge_id),
            None,
        )
        .await;
    assert_eq!(confirmation.status(), 200);
    let confirmation = response_json(confirmation).await;
    assert_eq!(confirmation["data"]["total_cents"], 5000);
    assert_eq!(confirmation["data"]["discount_cents"], 0);
    assert_eq!(confirmation["data"]["status"], "PAID");
    assert_eq!(confirmation["data"]["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn coupon_survives_expiry_and_retry_creates_fresh_discounted_charge() {
    let app = TestApp::new().await;
    let product = app.seed_product("curso-pix", 5000).await;
    app.seed_coupon(
        product.id,
        "PROMO10",
        pixcheckout_api::entities::coupon::CouponKind::Percentage,
        10,
        false,
    )
    .await;

    let session = app.open_session("curso-pix", "").await;
    let session_id = session["data"]["session_id"].as_str().unwrap().to_string();
    app.fill_buyer(&session_id).await;

    // Case-insensitive application.
    let applied = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/sessions/{}/coupon", session_id),
            Some(json!({"code": "promo10"})),
        )
        .await;
    assert_eq!(applied.status(), 200);
    let applied = response_json(applied).await;
    assert_eq!(applied["data"]["quote"]["final_price_cents"], 4500);
    assert_eq!(applied["data"]["quote"]["discount_cents"], 500);

    // First attempt: gateway reports the charge expired before payment.
    app.gateway.push_status(PaymentStatus::Expired);
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/sessions/{}/submit", session_id),
            None,
        )
        .await;
    assert_eq!(response.status(), 200);

    let expired = app
        .wait_for_phase(&session_id, "EXPIRED", Duration::from_secs(3))
        .await;
    assert!(expired["data"]["error"]
        .as_str()
        .unwrap()
        .contains("expired"));

    // No sale was recorded for the dead charge.
    let first_create = app.gateway.last_create_request().unwrap();
    assert_eq!(first_create.amount_cents, 4500);
    let confirmation = app
        .request(Method::GET, "/api/v1/orders/confirmation/ch_test_0", None)
        .await;
    assert_eq!(confirmation.status(), 404);

    // Retry: a brand-new charge, coupon still applied.
    app.gateway.push_status(PaymentStatus::Paid);
    let retry = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/sessions/{}/submit", session_id),
            None,
        )
        .await;
    assert_eq!(retry.status(), 200);
    assert_eq!(app.gateway.creates(), 2);

    let second_create = app.gateway.last_create_request().unwrap();
    assert_eq!(second_create.amount_cents, 4500);
    assert_eq!(second_create.coupon_code.as_deref(), Some("PROMO10"));

    let paid = app
        .wait_for_phase(&session_id, "PAID", Duration::from_secs(3))
        .await;
    let charge_id = paid["data"]["charge"]["charge_id"].as_str().unwrap();
    let confirmation = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/confirmation/{}", charge_id),
            None,
        )
        .await;
    assert_eq!(confirmation.status(), 200);
    let confirmation = response_json(confirmation).await;
    assert_eq!(confirmation["data"]["total_cents"], 4500);
    assert_eq!(confirmation["data"]["discount_cents"], 500);
    assert_eq!(confirmation["data"]["coupon_code"], "PROMO10");
}

#[tokio::test]
async fn failed_charge_creation_returns_to_form_without_polling() {
    let app = TestApp::new().await;
    app.seed_product("curso-pix", 5000).await;

    let session = app.open_session("curso-pix", "").await;
    let session_id = session["data"]["session_id"].as_str().unwrap().to_string();
    app.fill_buyer(&session_id).await;

    app.gateway.push_create_failure("merchant document rejected");
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/sessions/{}/submit", session_id),
            None,
        )
        .await;
    assert_eq!(response.status(), 502);

    let view = app.session_view(&session_id).await;
    assert_eq!(view["data"]["phase"], "FORM");
    assert!(view["data"]["error"]
        .as_str()
        .unwrap()
        .contains("merchant document rejected"));

    // No interval or deadline was ever scheduled for the failed creation.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(app.gateway.polls(), 0);
}

#[tokio::test]
async fn missing_buyer_fields_never_reach_the_gateway() {
    let app = TestApp::new().await;
    app.seed_product("curso-pix", 5000).await;

    let session = app.open_session("curso-pix", "").await;
    let session_id = session["data"]["session_id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/sessions/{}/submit", session_id),
            None,
        )
        .await;
    assert_eq!(response.status(), 400);
    assert_eq!(app.gateway.creates(), 0);

    let view = app.session_view(&session_id).await;
    assert_eq!(view["data"]["phase"], "FORM");
    assert!(view["data"]["error"].as_str().unwrap().contains("required"));
}

#[tokio::test]
async fn terminal_cancelled_state_stops_all_polling() {
    let app = TestApp::new().await;
    app.seed_product("curso-pix", 5000).await;

    let session = app.open_session("curso-pix", "").await;
    let session_id = session["data"]["session_id"].as_str().unwrap().to_string();
    app.fill_buyer(&session_id).await;

    app.gateway.push_status(PaymentStatus::WaitingPayment);
    app.gateway.push_status(PaymentStatus::Cancelled);
    app.request(
        Method::POST,
        &format!("/api/v1/checkout/sessions/{}/submit", session_id),
        None,
    )
    .await;

    let cancelled = app
        .wait_for_phase(&session_id, "CANCELLED", Duration::from_secs(3))
        .await;
    assert!(cancelled["data"]["error"]
        .as_str()
        .unwrap()
        .contains("cancelled"));

    let polls_at_terminal = app.gateway.polls();
    // Several poll intervals worth of waiting; the counter must not move.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(app.gateway.polls(), polls_at_terminal);

    let view = app.session_view(&session_id).await;
    assert_eq!(view["data"]["phase"], "CANCELLED");
}

#[tokio::test]
async fn poll_error_moves_to_failed_without_retrying_the_poll() {
    let app = TestApp::new().await;
    app.seed_product("curso-pix", 5000).await;

    let session = app.open_session("curso-pix", "").await;
    let session_id = session["data"]["session_id"].as_str().unwrap().to_string();
    app.fill_buyer(&session_id).await;

    app.gateway.push_status(PaymentStatus::WaitingPayment);
    app.gateway.push_status_failure("gateway unreachable");
    app.request(
        Method::POST,
        &format!("/api/v1/checkout/sessions/{}/submit", session_id),
        None,
    )
    .await;

    let failed = app
        .wait_for_phase(&session_id, "FAILED", Duration::from_secs(3))
        .await;
    assert!(failed["data"]["error"]
        .as_str()
        .unwrap()
        .contains("gateway unreachable"));

    let polls_at_failure = app.gateway.polls();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(app.gateway.polls(), polls_at_failure);
}

#[tokio::test]
async fn poll_deadline_expires_with_timeout_specific_message() {
    let app = TestApp::new().await;
    app.seed_product("curso-pix", 5000).await;

    let session = app.open_session("curso-pix", "").await;
    let session_id = session["data"]["session_id"].as_str().unwrap().to_string();
    app.fill_buyer(&session_id).await;

    // The status queue stays empty: every poll answers WAITING_PAYMENT.
    app.request(
        Method::POST,
        &format!("/api/v1/checkout/sessions/{}/submit", session_id),
        None,
    )
    .await;

    let expired = app
        .wait_for_phase(&session_id, "EXPIRED", Duration::from_secs(3))
        .await;
    assert!(expired["data"]["error"]
        .as_str()
        .unwrap()
        .contains("timed out"));

    // Both timers are inert afterwards.
    let polls_at_timeout = app.gateway.polls();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(app.gateway.polls(), polls_at_timeout);
    let view = app.session_view(&session_id).await;
    assert_eq!(view["data"]["phase"], "EXPIRED");
}

#[tokio::test]
async fn automatic_coupon_is_preselected_and_replaceable() {
    let app = TestApp::new().await;
    let product = app.seed_product("curso-pix", 10_000).await;
    app.seed_coupon(
        product.id,
        "AUTO5",
        pixcheckout_api::entities::coupon::CouponKind::Percentage,
        5,
        true,
    )
    .await;
    app.seed_coupon(
        product.id,
        "MEGA20",
        pixcheckout_api::entities::coupon::CouponKind::Percentage,
        20,
        false,
    )
    .await;

    let session = app.open_session("curso-pix", "").await;
    assert_eq!(session["data"]["coupon_code"], "AUTO5");
    assert_eq!(session["data"]["quote"]["final_price_cents"], 9500);

    let session_id = session["data"]["session_id"].as_str().unwrap().to_string();
    let replaced = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/sessions/{}/coupon", session_id),
            Some(json!({"code": "MEGA20"})),
        )
        .await;
    let replaced = response_json(replaced).await;
    assert_eq!(replaced["data"]["coupon_code"], "MEGA20");
    assert_eq!(replaced["data"]["quote"]["final_price_cents"], 8000);

    let invalid = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/sessions/{}/coupon", session_id),
            Some(json!({"code": "NOPE"})),
        )
        .await;
    assert_eq!(invalid.status(), 400);
}

#[tokio::test]
async fn order_bump_is_charged_but_never_discounted() {
    let app = TestApp::new().await;
    let product = app.seed_product("curso-pix", 10_000).await;
    let extra = app.seed_product("planilha-bonus", 3000).await;
    app.attach_bump(product.id, extra.id, Some(2500)).await;
    app.seed_coupon(
        product.id,
        "PROMO10",
        pixcheckout_api::entities::coupon::CouponKind::Percentage,
        10,
        false,
    )
    .await;

    let session = app.open_session("curso-pix", "").await;
    let session_id = session["data"]["session_id"].as_str().unwrap().to_string();
    assert_eq!(session["data"]["bump_offer"]["price_cents"], 2500);

    app.fill_buyer(&session_id).await;
    app.request(
        Method::POST,
        &format!("/api/v1/checkout/sessions/{}/coupon", session_id),
        Some(json!({"code": "PROMO10"})),
    )
    .await;
    let with_bump = app
        .request(
            Method::PUT,
            &format!("/api/v1/checkout/sessions/{}/bump", session_id),
            Some(json!({"include": true})),
        )
        .await;
    let with_bump = response_json(with_bump).await;
    assert_eq!(with_bump["data"]["quote"]["original_price_cents"], 12_500);
    assert_eq!(with_bump["data"]["quote"]["discount_cents"], 1000);
    assert_eq!(with_bump["data"]["quote"]["final_price_cents"], 11_500);

    app.gateway.push_status(PaymentStatus::Paid);
    app.request(
        Method::POST,
        &format!("/api/v1/checkout/sessions/{}/submit", session_id),
        None,
    )
    .await;

    let create = app.gateway.last_create_request().unwrap();
    assert_eq!(create.amount_cents, 11_500);
    assert_eq!(create.line_items.len(), 2);
    assert!(create.line_items[1].is_order_bump);
    assert_eq!(create.line_items[1].unit_price_cents, 2500);

    let paid = app
        .wait_for_phase(&session_id, "PAID", Duration::from_secs(3))
        .await;
    let charge_id = paid["data"]["charge"]["charge_id"].as_str().unwrap();
    let confirmation = response_json(
        app.request(
            Method::GET,
            &format!("/api/v1/orders/confirmation/{}", charge_id),
            None,
        )
        .await,
    )
    .await;
    let items = confirmation["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().any(|i| i["is_order_bump"] == true));
}

#[tokio::test]
async fn teardown_cancels_polling_and_forgets_the_session() {
    let app = TestApp::new().await;
    app.seed_product("curso-pix", 5000).await;

    let session = app.open_session("curso-pix", "").await;
    let session_id = session["data"]["session_id"].as_str().unwrap().to_string();
    app.fill_buyer(&session_id).await;

    // Status queue empty: the cycle would poll forever.
    app.request(
        Method::POST,
        &format!("/api/v1/checkout/sessions/{}/submit", session_id),
        None,
    )
    .await;

    // Let at least one poll happen, then navigate away.
    tokio::time::sleep(Duration::from_millis(60)).await;
    let closed = app
        .request(
            Method::DELETE,
            &format!("/api/v1/checkout/sessions/{}", session_id),
            None,
        )
        .await;
    assert_eq!(closed.status(), 200);

    let polls_at_teardown = app.gateway.polls();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(app.gateway.polls(), polls_at_teardown);

    let gone = app
        .request(
            Method::GET,
            &format!("/api/v1/checkout/sessions/{}", session_id),
            None,
        )
        .await;
    assert_eq!(gone.status(), 404);
}

#[tokio::test]
async fn draft_is_hydrated_on_open_and_cleared_after_purchase() {
    let app = TestApp::new().await;
    app.seed_product("curso-pix", 5000).await;

    let first = app.open_session("curso-pix", "").await;
    let first_id = first["data"]["session_id"].as_str().unwrap().to_string();
    app.fill_buyer(&first_id).await;

    // A new visit to the same slug hydrates the stored draft.
    let second = app.open_session("curso-pix", "").await;
    assert_eq!(second["data"]["buyer"]["name"], "Maria Souza");
    assert_eq!(second["data"]["buyer"]["email"], "maria@example.com");

    let second_id = second["data"]["session_id"].as_str().unwrap().to_string();
    app.gateway.push_status(PaymentStatus::Paid);
    app.request(
        Method::POST,
        &format!("/api/v1/checkout/sessions/{}/submit", second_id),
        None,
    )
    .await;
    app.wait_for_phase(&second_id, "PAID", Duration::from_secs(3))
        .await;

    // Successful purchase clears the draft.
    let page = response_json(
        app.request(Method::GET, "/api/v1/checkout/curso-pix", None)
            .await,
    )
    .await;
    assert!(page["data"]["draft"].is_null());
}
