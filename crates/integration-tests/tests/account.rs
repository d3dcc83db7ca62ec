//! Sign-in, account pages, orders and addresses.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use cornershop_integration_tests::{ALICE_TOKEN, BOB_TOKEN, TestApp, alice, bob};

#[tokio::test]
async fn test_account_redirects_anonymous_visitor() {
    let mut app = TestApp::new().await;

    let response = app.get("/account/orders").await;

    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/sign-in?next=%2Faccount%2Forders"));
}

#[tokio::test]
async fn test_htmx_fragment_redirects_from_current_page() {
    let mut app = TestApp::new().await;

    let response = app
        .htmx_get("/account/orders/list", "http://localhost:3000/account/orders")
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.header("hx-redirect"),
        Some("/sign-in?next=%2Faccount%2Forders")
    );
}

#[tokio::test]
async fn test_sign_in_callback_starts_session() {
    let mut app = TestApp::new().await;

    let response = app.sign_in(ALICE_TOKEN).await;
    assert_eq!(response.location(), Some("/account"));

    let account = app.get("/account").await;
    assert_eq!(account.status, StatusCode::OK);
    assert!(account.body.contains("Hello, Alice Liddell"));
    assert!(account.body.contains("alice@example.com"));
}

#[tokio::test]
async fn test_callback_rejects_unknown_token() {
    let mut app = TestApp::new().await;

    let response = app.get("/auth/callback?access_token=expired").await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(response.body.contains("Your sign-in link has expired."));
    assert_eq!(app.get("/account").await.status, StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_callback_without_token_forwards_fragment() {
    let mut app = TestApp::new().await;

    let response = app.get("/auth/callback?next=/cart").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("window.location.hash"));
}

#[tokio::test]
async fn test_callback_ignores_offsite_next() {
    let mut app = TestApp::new().await;

    let response = app
        .get(&format!(
            "/auth/callback?access_token={ALICE_TOKEN}&next=https://evil.example"
        ))
        .await;

    assert_eq!(response.location(), Some("/account"));
}

#[tokio::test]
async fn test_callback_ignores_next_with_tab_or_newline() {
    for next in ["%2F%09%2Fevil.example", "%2Fa%0Ab"] {
        let mut app = TestApp::new().await;

        let response = app
            .get(&format!("/auth/callback?access_token={ALICE_TOKEN}&next={next}"))
            .await;

        assert_eq!(response.status, StatusCode::SEE_OTHER, "next={next}");
        assert_eq!(response.location(), Some("/account"), "next={next}");
    }
}

#[tokio::test]
async fn test_sign_out_ends_session() {
    let mut app = TestApp::new().await;
    app.sign_in(ALICE_TOKEN).await;

    let response = app.post_form("/auth/sign-out", &[]).await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/"));

    assert_eq!(app.get("/account").await.status, StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_orders_list_only_shows_own_orders() {
    let mut app = TestApp::new().await;
    let own = app.insert_order(alice().id, "paid", 1, 2, "12.50").await;
    let other = app.insert_order(bob().id, "paid", 2, 1, "8.00").await;
    app.sign_in(ALICE_TOKEN).await;

    let response = app.get("/account/orders/list").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains(&format!("/account/orders/{own}")));
    assert!(!response.body.contains(&format!("/account/orders/{other}")));
    assert!(response.body.contains("$25.00"));
}

#[tokio::test]
async fn test_no_orders_renders_empty_state() {
    let mut app = TestApp::new().await;
    app.sign_in(BOB_TOKEN).await;

    let response = app.get("/account/orders/list").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("placed any orders yet."));
}

#[tokio::test]
async fn test_someone_elses_order_is_not_found() {
    let mut app = TestApp::new().await;
    let other = app.insert_order(bob().id, "paid", 2, 1, "8.00").await;
    app.sign_in(ALICE_TOKEN).await;

    let response = app.get(&format!("/account/orders/{other}")).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_pending_order() {
    let mut app = TestApp::new().await;
    let order = app.insert_order(alice().id, "pending", 1, 1, "12.50").await;
    app.sign_in(ALICE_TOKEN).await;

    // Warm the cache so the cancel has something to invalidate.
    let before = app.get(&format!("/account/orders/{order}")).await;
    assert!(before.body.contains("Cancel order"));

    let response = app
        .post_form(&format!("/account/orders/{order}/cancel"), &[])
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert!(response.hx_trigger().unwrap().get("orders-updated").is_some());

    let after = app.get(&format!("/account/orders/{order}")).await;
    assert!(after.body.contains("Cancelled"));
    assert!(!after.body.contains("Cancel order"));
}

#[tokio::test]
async fn test_paid_order_cannot_be_cancelled() {
    let mut app = TestApp::new().await;
    let order = app.insert_order(alice().id, "paid", 1, 1, "12.50").await;
    app.sign_in(ALICE_TOKEN).await;

    let response = app
        .post_form(&format!("/account/orders/{order}/cancel"), &[])
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.hx_trigger().unwrap()["toast"]["level"], "error");
}

fn address<'a>(full_name: &'a str, default: bool) -> Vec<(&'a str, &'a str)> {
    let mut fields = vec![
        ("full_name", full_name),
        ("line1", "1 Main St"),
        ("city", "Springfield"),
        ("postal_code", "12345"),
        ("country", "US"),
    ];
    if default {
        fields.push(("is_default", "on"));
    }
    fields
}

#[tokio::test]
async fn test_address_book_keeps_single_default() {
    let mut app = TestApp::new().await;
    app.sign_in(ALICE_TOKEN).await;

    let first = app
        .post_form("/account/addresses", &address("Alice Home", true))
        .await;
    assert_eq!(first.status, StatusCode::NO_CONTENT);
    assert!(first.hx_trigger().unwrap().get("addresses-updated").is_some());

    app.post_form("/account/addresses", &address("Alice Work", true))
        .await;

    let list = app.get("/account/addresses/list").await;
    assert!(list.body.contains("Alice Home"));
    assert!(list.body.contains("Alice Work"));
    assert_eq!(list.body.matches("address-default").count(), 1);
    assert_eq!(list.body.matches("Make default").count(), 1);
}

#[tokio::test]
async fn test_address_delete_is_scoped_to_owner() {
    let mut app = TestApp::new().await;
    app.sign_in(ALICE_TOKEN).await;
    app.post_form("/account/addresses", &address("Alice Home", false))
        .await;
    let list = app.get("/account/addresses/list").await;
    let id = list
        .body
        .split("/account/addresses/")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .unwrap()
        .to_string();

    app.sign_in(BOB_TOKEN).await;
    let response = app
        .post_form(&format!("/account/addresses/{id}/delete"), &[])
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    app.sign_in(ALICE_TOKEN).await;
    let list = app.get("/account/addresses/list").await;
    assert!(list.body.contains("Alice Home"));
}

#[tokio::test]
async fn test_invalid_address_is_rejected() {
    let mut app = TestApp::new().await;
    app.sign_in(ALICE_TOKEN).await;

    let response = app
        .post_form("/account/addresses", &address("   ", false))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}
