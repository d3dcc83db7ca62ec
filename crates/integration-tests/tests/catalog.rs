//! Catalog pages: home, listing, product detail, categories.

use axum::http::StatusCode;
use cornershop_integration_tests::{ALICE_TOKEN, TestApp};

#[tokio::test]
async fn test_home_lists_featured_products_and_categories() {
    let mut app = TestApp::new().await;

    let response = app.get("/").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Dark Roast"));
    assert!(response.body.contains("$12.50"));
    assert!(response.body.contains("/categories/3"));
}

#[tokio::test]
async fn test_search_filters_listing() {
    let mut app = TestApp::new().await;

    let response = app.get("/products?q=roast").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Dark Roast"));
    assert!(!response.body.contains("Green Tea</h3>"));
}

#[tokio::test]
async fn test_category_filter_marks_selected_option() {
    let mut app = TestApp::new().await;

    let response = app.get("/products?category=2").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains(r#"<option value="2" selected>Tea</option>"#));
    assert!(response.body.contains(r#"<option value="1">Coffee</option>"#));
    assert!(response.body.contains("Green Tea"));
    assert!(!response.body.contains("Dark Roast"));
}

#[tokio::test]
async fn test_search_without_matches_renders_empty_state() {
    let mut app = TestApp::new().await;

    let response = app.get("/products?q=nothing-like-this").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("No products match your search."));
}

#[tokio::test]
async fn test_product_detail_renders_add_to_cart() {
    let mut app = TestApp::new().await;

    let response = app.get("/products/1").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Dark Roast"));
    assert!(response.body.contains("hx-post=\"/cart/add\""));
    assert!(response.body.contains("hx-get=\"/products/1/reviews\""));
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let mut app = TestApp::new().await;

    let response = app.get("/products/999").await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_members_only_category_redirects_anonymous_visitor() {
    let mut app = TestApp::new().await;

    let response = app.get("/categories/3").await;

    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/sign-in?next=%2Fcategories%2F3"));
}

#[tokio::test]
async fn test_members_only_product_and_filter_redirect_anonymous_visitor() {
    let mut app = TestApp::new().await;

    let product = app.get("/products/3").await;
    assert_eq!(product.status, StatusCode::SEE_OTHER);
    assert_eq!(product.location(), Some("/sign-in?next=%2Fproducts%2F3"));

    let listing = app.get("/products?category=3").await;
    assert_eq!(listing.status, StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_members_only_category_visible_after_sign_in() {
    let mut app = TestApp::new().await;
    app.sign_in(ALICE_TOKEN).await;

    let response = app.get("/categories/3").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Reserve Blend"));
}

#[tokio::test]
async fn test_public_category_lists_its_products() {
    let mut app = TestApp::new().await;

    let response = app.get("/categories/2").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Green Tea"));
    assert!(!response.body.contains("Dark Roast"));
}

#[tokio::test]
async fn test_store_outage_renders_error_with_retry() {
    let mut app = TestApp::new().await;
    app.db.set_unavailable(true);

    let response = app.get("/products").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("state-error"));
    assert!(response.body.contains("Try again"));
}

#[tokio::test]
async fn test_health_and_readiness() {
    let mut app = TestApp::new().await;

    assert_eq!(app.get("/health").await.status, StatusCode::OK);
    assert_eq!(app.get("/health/ready").await.status, StatusCode::OK);

    app.db.set_unavailable(true);
    assert_eq!(
        app.get("/health/ready").await.status,
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let mut app = TestApp::new().await;

    let response = app.get("/health").await;

    assert!(response.header("x-request-id").is_some());
}
