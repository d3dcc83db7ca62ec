//! Product reviews fragment and mutations.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use cornershop_integration_tests::{ALICE_TOKEN, BOB_TOKEN, TestApp};

fn review_id(body: &str) -> String {
    body.split("hx-post=\"/reviews/")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_reviews_fragment_prompts_anonymous_visitor_to_sign_in() {
    let mut app = TestApp::new().await;

    let response = app.get("/products/1/reviews").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("No ratings yet"));
    assert!(response.body.contains("to write a review"));
}

#[tokio::test]
async fn test_posting_review_requires_sign_in() {
    let mut app = TestApp::new().await;

    let response = app
        .post_form("/products/1/reviews", &[("rating", "5")])
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(response.header("hx-redirect").is_some());
}

#[tokio::test]
async fn test_posted_review_appears_with_summary() {
    let mut app = TestApp::new().await;
    app.sign_in(ALICE_TOKEN).await;
    // Cache the empty list first; posting must invalidate it.
    app.get("/products/1/reviews").await;

    let response = app
        .post_form(
            "/products/1/reviews",
            &[("rating", "4"), ("comment", "Lovely and smooth")],
        )
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert!(response.hx_trigger().unwrap().get("reviews-updated").is_some());

    let fragment = app.get("/products/1/reviews").await;
    assert!(fragment.body.contains("Lovely and smooth"));
    assert!(fragment.body.contains("Alice Liddell"));
    assert!(fragment.body.contains("★★★★☆"));
    assert!(fragment.body.contains("4.0 / 5"));
    assert!(fragment.body.contains("review-edit"));
}

#[tokio::test]
async fn test_out_of_range_rating_is_rejected() {
    let mut app = TestApp::new().await;
    app.sign_in(ALICE_TOKEN).await;

    let response = app
        .post_form("/products/1/reviews", &[("rating", "6")])
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.hx_trigger().unwrap()["toast"]["level"], "error");
}

#[tokio::test]
async fn test_review_edit_and_delete_by_author() {
    let mut app = TestApp::new().await;
    app.sign_in(ALICE_TOKEN).await;
    app.post_form("/products/2/reviews", &[("rating", "2"), ("comment", "Meh")])
        .await;
    let id = review_id(&app.get("/products/2/reviews").await.body);

    let updated = app
        .post_form(
            &format!("/reviews/{id}"),
            &[("rating", "5"), ("comment", "Grew on me")],
        )
        .await;
    assert_eq!(updated.status, StatusCode::NO_CONTENT);
    let fragment = app.get("/products/2/reviews").await;
    assert!(fragment.body.contains("Grew on me"));
    assert!(fragment.body.contains("★★★★★"));

    let deleted = app.post_form(&format!("/reviews/{id}/delete"), &[]).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    let fragment = app.get("/products/2/reviews").await;
    assert!(!fragment.body.contains("Grew on me"));
}

#[tokio::test]
async fn test_other_users_cannot_edit_or_delete_review() {
    let mut app = TestApp::new().await;
    app.sign_in(ALICE_TOKEN).await;
    app.post_form("/products/1/reviews", &[("rating", "5"), ("comment", "Mine")])
        .await;
    let id = review_id(&app.get("/products/1/reviews").await.body);

    app.sign_in(BOB_TOKEN).await;
    let fragment = app.get("/products/1/reviews").await;
    assert!(!fragment.body.contains("review-edit"));

    let edit = app
        .post_form(&format!("/reviews/{id}"), &[("comment", "Not mine")])
        .await;
    assert_eq!(edit.status, StatusCode::NOT_FOUND);

    app.post_form(&format!("/reviews/{id}/delete"), &[]).await;
    let fragment = app.get("/products/1/reviews").await;
    assert!(fragment.body.contains("Mine"));
}
