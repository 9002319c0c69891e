//! Checkout wizard and card payments through the HTTP API.

use axum::http::{Method, StatusCode};
use serde_json::{Value, json};

use mercato_core::PaymentStatus;
use mercato_integration_tests::{TestApp, unix_now};

/// Log in, put two of product 7 at 25.00 in the cart and walk to the payment step.
async fn at_payment_step(app: &mut TestApp, email: &str, method: &str) {
    app.signup(email).await;
    fill_and_walk_to_payment(app, method).await;
}

async fn fill_and_walk_to_payment(app: &mut TestApp, method: &str) {
    app.add_to_cart(7, 25.0, 2).await;
    app.post("/api/checkout/address", &json!({ "address": "221B Baker Street" }))
        .await;
    app.post("/api/checkout/payment-method", &json!({ "method": method }))
        .await;
    assert_eq!(app.post("/api/checkout/next", &json!({})).await.body["step"], json!(2));
    assert_eq!(app.post("/api/checkout/next", &json!({})).await.body["step"], json!(3));
}

async fn create_intent(app: &mut TestApp, amount: Value) -> String {
    let response = app
        .post("/api/create-payment-intent", &json!({ "amount": amount }))
        .await;
    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    assert!(response.body["clientSecret"].is_string());
    response.body["paymentIntentId"]
        .as_str()
        .expect("paymentIntentId")
        .to_string()
}

#[tokio::test]
async fn cannot_leave_cart_step_with_empty_cart() {
    let mut app = TestApp::new();
    app.signup("empty-checkout@example.com").await;

    let response = app.post("/api/checkout/next", &json!({})).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.message(), "Your cart is empty");
    assert_eq!(app.get("/api/checkout").await.body["step"], json!(1));
}

#[tokio::test]
async fn cannot_leave_address_step_with_blank_address() {
    let mut app = TestApp::new();
    app.signup("blank@example.com").await;
    app.add_to_cart(1, 5.0, 1).await;

    assert_eq!(app.post("/api/checkout/next", &json!({})).await.body["step"], json!(2));
    app.post("/api/checkout/address", &json!({ "address": "   " }))
        .await;

    let response = app.post("/api/checkout/next", &json!({})).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.message(), "Please enter a delivery address");
}

#[tokio::test]
async fn back_navigation() {
    let mut app = TestApp::new();
    app.signup("back@example.com").await;

    let at_first = app.post("/api/checkout/back", &json!({})).await;
    assert_eq!(at_first.status, StatusCode::BAD_REQUEST);

    app.add_to_cart(1, 5.0, 1).await;
    app.post("/api/checkout/next", &json!({})).await;
    let back = app.post("/api/checkout/back", &json!({})).await;
    assert_eq!(back.status, StatusCode::OK);
    assert_eq!(back.body["step"], json!(1));
}

#[tokio::test]
async fn checkout_state_includes_cart_summary() {
    let mut app = TestApp::new();
    app.signup("summary@example.com").await;
    app.add_to_cart(1, 2.5, 2).await;
    app.add_to_cart(2, 10.0, 1).await;

    let state = app.get("/api/checkout").await;

    assert_eq!(state.status, StatusCode::OK);
    assert_eq!(state.body["itemCount"], json!(3));
    assert_eq!(state.body["subtotal"], json!(15.0));
}

#[tokio::test]
async fn confirm_requires_payment_step() {
    let mut app = TestApp::new();
    app.signup("early@example.com").await;
    app.add_to_cart(1, 5.0, 1).await;

    let response = app.post("/api/checkout/confirm", &json!({})).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.message(), "Checkout is not at the payment step");
}

#[tokio::test]
async fn cash_on_delivery_order() {
    let mut app = TestApp::new();
    at_payment_step(&mut app, "cod@example.com", "COD").await;

    let skip = app.post("/api/checkout/next", &json!({})).await;
    assert_eq!(skip.status, StatusCode::BAD_REQUEST);

    let response = app.post("/api/checkout/confirm", &json!({})).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["step"], json!(4));
    assert_eq!(response.body["paymentMethod"], json!("COD"));

    let cart = app.post("/api/cart/get", &json!({})).await;
    assert_eq!(cart.body["items"], json!([]));
    assert_eq!(app.get("/api/checkout").await.body["step"], json!(1));
}

#[tokio::test]
async fn payment_intent_amount_must_match_cart() {
    let mut app = TestApp::new();
    app.signup("amount@example.com").await;
    app.add_to_cart(7, 25.0, 2).await;

    let missing = app.post("/api/create-payment-intent", &json!({})).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.message(), "Amount is required");

    let zero = app
        .post("/api/create-payment-intent", &json!({ "amount": 0 }))
        .await;
    assert_eq!(zero.message(), "Amount is required");

    let low = app
        .post("/api/create-payment-intent", &json!({ "amount": 1.0 }))
        .await;
    assert_eq!(low.status, StatusCode::BAD_REQUEST);

    create_intent(&mut app, json!(50.0)).await;
}

#[tokio::test]
async fn card_confirmation_needs_succeeded_intent() {
    let mut app = TestApp::new();
    at_payment_step(&mut app, "card@example.com", "Stripe").await;
    let intent_id = create_intent(&mut app, json!(50.0)).await;

    let missing = app.post("/api/checkout/confirm", &json!({})).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);

    let pending = app
        .post(
            "/api/checkout/confirm",
            &json!({ "paymentIntentId": intent_id }),
        )
        .await;
    assert_eq!(pending.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        pending.message(),
        "Payment has not succeeded (status: requires_payment_method)"
    );
    let cart = app.post("/api/cart/get", &json!({})).await;
    assert_eq!(cart.body["items"].as_array().map(Vec::len), Some(1));

    app.gateway.set_status(&intent_id, PaymentStatus::Succeeded);

    let confirmed = app
        .post(
            "/api/checkout/confirm",
            &json!({ "paymentIntentId": intent_id }),
        )
        .await;
    assert_eq!(confirmed.status, StatusCode::OK, "{:?}", confirmed.body);
    assert_eq!(confirmed.body["step"], json!(4));
    assert_eq!(confirmed.body["paymentMethod"], json!("Stripe"));
}

#[tokio::test]
async fn webhook_marks_intent_succeeded() {
    let mut app = TestApp::new();
    at_payment_step(&mut app, "hook@example.com", "Stripe").await;
    let intent_id = create_intent(&mut app, json!(50.0)).await;
    let intent = app.gateway.intent(&intent_id);

    let delivered = app
        .deliver_webhook(&json!({
            "id": "evt_test_1",
            "type": "payment_intent.succeeded",
            "data": {
                "object": {
                    "id": intent_id,
                    "amount": intent.amount,
                    "currency": intent.currency,
                    "status": "succeeded",
                    "metadata": intent.metadata,
                }
            }
        }))
        .await;
    assert_eq!(delivered.status, StatusCode::OK);
    assert_eq!(delivered.body["received"], json!(true));

    // The processor lookup still says pending; the signed webhook decides
    let confirmed = app
        .post(
            "/api/checkout/confirm",
            &json!({ "paymentIntentId": intent_id }),
        )
        .await;
    assert_eq!(confirmed.status, StatusCode::OK, "{:?}", confirmed.body);
}

fn intent_event(app: &TestApp, intent_id: &str, kind: &str, status: &str) -> Value {
    let intent = app.gateway.intent(intent_id);
    json!({
        "id": format!("evt_{kind}_{intent_id}"),
        "type": kind,
        "data": {
            "object": {
                "id": intent_id,
                "amount": intent.amount,
                "currency": intent.currency,
                "status": status,
                "metadata": intent.metadata,
            }
        }
    })
}

#[tokio::test]
async fn succeeded_intent_pays_for_one_order_only() {
    let mut app = TestApp::new();
    at_payment_step(&mut app, "replay@example.com", "Stripe").await;
    let intent_id = create_intent(&mut app, json!(50.0)).await;
    app.gateway.set_status(&intent_id, PaymentStatus::Succeeded);

    let first = app
        .post(
            "/api/checkout/confirm",
            &json!({ "paymentIntentId": intent_id }),
        )
        .await;
    assert_eq!(first.status, StatusCode::OK, "{:?}", first.body);

    fill_and_walk_to_payment(&mut app, "Stripe").await;
    let second = app
        .post(
            "/api/checkout/confirm",
            &json!({ "paymentIntentId": intent_id }),
        )
        .await;

    assert_eq!(second.status, StatusCode::BAD_REQUEST);
    assert_eq!(second.message(), "Payment already used");
    let cart = app.post("/api/cart/get", &json!({})).await;
    assert_eq!(cart.body["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(app.get("/api/checkout").await.body["step"], json!(3));
}

#[tokio::test]
async fn stale_webhook_is_rejected() {
    let mut app = TestApp::new();
    at_payment_step(&mut app, "stale@example.com", "Stripe").await;
    let intent_id = create_intent(&mut app, json!(50.0)).await;
    let event = intent_event(&app, &intent_id, "payment_intent.succeeded", "succeeded");

    let response = app.deliver_webhook_at(&event, unix_now() - 3600).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.message(), "Invalid webhook signature");

    // Nothing was recorded, and the processor still reports it unpaid
    let confirm = app
        .post(
            "/api/checkout/confirm",
            &json!({ "paymentIntentId": intent_id }),
        )
        .await;
    assert_eq!(confirm.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        confirm.message(),
        "Payment has not succeeded (status: requires_payment_method)"
    );
}

#[tokio::test]
async fn later_webhook_does_not_undo_success() {
    let mut app = TestApp::new();
    at_payment_step(&mut app, "late@example.com", "Stripe").await;
    let intent_id = create_intent(&mut app, json!(50.0)).await;

    let succeeded = intent_event(&app, &intent_id, "payment_intent.succeeded", "succeeded");
    assert_eq!(app.deliver_webhook(&succeeded).await.status, StatusCode::OK);
    let processing = intent_event(&app, &intent_id, "payment_intent.processing", "processing");
    assert_eq!(app.deliver_webhook(&processing).await.status, StatusCode::OK);

    let confirmed = app
        .post(
            "/api/checkout/confirm",
            &json!({ "paymentIntentId": intent_id }),
        )
        .await;
    assert_eq!(confirmed.status, StatusCode::OK, "{:?}", confirmed.body);
}

#[tokio::test]
async fn confirm_accepts_empty_body() {
    let mut app = TestApp::new();
    at_payment_step(&mut app, "bodyless@example.com", "COD").await;

    let response = app
        .send(Method::POST, "/api/checkout/confirm", Vec::new(), &[])
        .await;

    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    assert_eq!(response.body["step"], json!(4));
}

#[tokio::test]
async fn unsigned_webhook_is_rejected() {
    let mut app = TestApp::new();

    let response = app
        .send(
            Method::POST,
            "/api/payments/webhook",
            br#"{"id":"evt_forged","type":"payment_intent.succeeded","data":{"object":{}}}"#
                .to_vec(),
            &[("stripe-signature", "t=1700000000,v1=deadbeef")],
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.message(), "Invalid webhook signature");
}

#[tokio::test]
async fn cannot_confirm_with_someone_elses_intent() {
    let mut alice = TestApp::new();
    at_payment_step(&mut alice, "alice@example.com", "Stripe").await;
    let alice_intent = create_intent(&mut alice, json!(50.0)).await;
    alice
        .gateway
        .set_status(&alice_intent, PaymentStatus::Succeeded);

    let mut mallory = alice.new_browser();
    at_payment_step(&mut mallory, "mallory@example.com", "Stripe").await;

    let response = mallory
        .post(
            "/api/checkout/confirm",
            &json!({ "paymentIntentId": alice_intent }),
        )
        .await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    let cart = mallory.post("/api/cart/get", &json!({})).await;
    assert_eq!(cart.body["items"].as_array().map(Vec::len), Some(1));
}
