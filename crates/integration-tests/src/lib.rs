//! Integration tests for Corner Shop.
//!
//! Tests drive the full storefront router in-process with
//! `tower::ServiceExt::oneshot`, backed by the in-memory persistence
//! client, an in-memory session store and fake auth and billing clients.
//! No database or network is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cornershop-integration-tests
//! ```

#![allow(clippy::expect_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;
use tower_sessions::MemoryStore;
use uuid::Uuid;

use cornershop_core::{OrderId, UserId};
use cornershop_storefront::config::StorefrontConfig;
use cornershop_storefront::db::{Insert, MemoryPersistence, Persistence, Table, query::row};
use cornershop_storefront::middleware::session::SESSION_COOKIE_NAME;
use cornershop_storefront::models::CurrentUser;
use cornershop_storefront::services::auth::{AuthError, AuthProvider};
use cornershop_storefront::services::billing::{
    BillingError, CheckoutGateway, CheckoutRequest, CheckoutSession,
};
use cornershop_storefront::state::AppState;

pub const ALICE_TOKEN: &str = "alice-token";
pub const BOB_TOKEN: &str = "bob-token";

/// Hosted checkout page returned by [`FakeCheckout`].
pub const CHECKOUT_URL: &str = "https://pay.example.test/checkout/pref-1";

#[must_use]
pub fn alice() -> CurrentUser {
    CurrentUser {
        id: UserId::new(Uuid::from_u128(0xA11CE)),
        email: "alice@example.com".to_string(),
        full_name: Some("Alice Liddell".to_string()),
    }
}

#[must_use]
pub fn bob() -> CurrentUser {
    CurrentUser {
        id: UserId::new(Uuid::from_u128(0xB0B)),
        email: "bob@example.com".to_string(),
        full_name: None,
    }
}

/// Auth provider that knows a fixed set of tokens.
#[derive(Debug, Default)]
pub struct FakeAuth {
    users: HashMap<String, CurrentUser>,
}

impl FakeAuth {
    #[must_use]
    pub fn with_test_users() -> Self {
        let users = [(ALICE_TOKEN, alice()), (BOB_TOKEN, bob())]
            .into_iter()
            .map(|(token, user)| (token.to_string(), user))
            .collect();
        Self { users }
    }
}

#[async_trait]
impl AuthProvider for FakeAuth {
    async fn current_user(&self, access_token: &str) -> Result<Option<CurrentUser>, AuthError> {
        Ok(self.users.get(access_token).cloned())
    }

    fn sign_in_url(&self, redirect_to: &str) -> String {
        format!("https://auth.example.test/sign-in?redirect_to={redirect_to}")
    }
}

/// Checkout gateway that records requests and always succeeds.
#[derive(Debug, Default)]
pub struct FakeCheckout {
    pub requests: Mutex<Vec<CheckoutRequest>>,
}

#[async_trait]
impl CheckoutGateway for FakeCheckout {
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, BillingError> {
        self.requests
            .lock()
            .expect("checkout lock poisoned")
            .push(request.clone());
        Ok(CheckoutSession {
            preference_id: "pref-1".to_string(),
            redirect_url: CHECKOUT_URL.to_string(),
        })
    }
}

/// A response with its body read into a string.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.header(header::LOCATION.as_str())
    }

    /// Parsed `HX-Trigger` header, if any.
    #[must_use]
    pub fn hx_trigger(&self) -> Option<Value> {
        self.header("hx-trigger")
            .map(|raw| serde_json::from_str(raw).expect("HX-Trigger is JSON"))
    }
}

/// The storefront router plus a cookie jar holding one session.
pub struct TestApp {
    pub db: Arc<MemoryPersistence>,
    pub checkout: Arc<FakeCheckout>,
    router: Router,
    session_cookie: Option<String>,
}

impl TestApp {
    /// Seeded catalog with auth and billing configured.
    pub async fn new() -> Self {
        Self::build(true, true).await
    }

    /// Auth configured, billing not.
    pub async fn without_billing() -> Self {
        Self::build(true, false).await
    }

    /// Seeded catalog with neither auth nor billing configured.
    pub async fn without_integrations() -> Self {
        Self::build(false, false).await
    }

    async fn build(with_auth: bool, with_billing: bool) -> Self {
        let db = Arc::new(MemoryPersistence::new());
        seed_catalog(db.as_ref()).await;

        let checkout = Arc::new(FakeCheckout::default());
        let config = StorefrontConfig::from_source(|_| None).expect("default config");
        let auth: Option<Arc<dyn AuthProvider>> =
            with_auth.then(|| Arc::new(FakeAuth::with_test_users()) as Arc<dyn AuthProvider>);
        let billing: Option<Arc<dyn CheckoutGateway>> =
            with_billing.then(|| checkout.clone() as Arc<dyn CheckoutGateway>);

        let state = AppState::from_parts(config, db.clone(), auth, billing);
        let router = cornershop_storefront::app(state, MemoryStore::default());

        Self {
            db,
            checkout,
            router,
            session_cookie: None,
        }
    }

    /// Send a request with the current session cookie and remember any new one.
    pub async fn send(&mut self, mut request: Request<Body>) -> TestResponse {
        if let Some(cookie) = &self.session_cookie {
            request.headers_mut().insert(
                header::COOKIE,
                cookie.parse().expect("cookie header value"),
            );
        }

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let prefix = format!("{SESSION_COOKIE_NAME}=");
        for value in response.headers().get_all(header::SET_COOKIE) {
            let value = value.to_str().expect("ascii cookie");
            if let Some(pair) = value.split(';').next()
                && pair.starts_with(&prefix)
            {
                self.session_cookie = Some(pair.to_string());
            }
        }

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body collects");
        TestResponse {
            status,
            headers,
            body: String::from_utf8(bytes.to_vec()).expect("utf-8 body"),
        }
    }

    pub async fn get(&mut self, uri: &str) -> TestResponse {
        let request = Request::get(uri).body(Body::empty()).expect("request");
        self.send(request).await
    }

    /// GET as HTMX would send it from `current_url`.
    pub async fn htmx_get(&mut self, uri: &str, current_url: &str) -> TestResponse {
        let request = Request::get(uri)
            .header("hx-request", "true")
            .header("hx-current-url", current_url)
            .body(Body::empty())
            .expect("request");
        self.send(request).await
    }

    pub async fn post_form(&mut self, uri: &str, fields: &[(&str, &str)]) -> TestResponse {
        let body = fields
            .iter()
            .map(|(k, v)| format!("{k}={}", encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let request = Request::post(uri)
            .header("hx-request", "true")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .expect("request");
        self.send(request).await
    }

    /// Complete the hosted sign-in callback with `token`.
    pub async fn sign_in(&mut self, token: &str) -> TestResponse {
        let response = self
            .get(&format!("/auth/callback?access_token={token}&next=/account"))
            .await;
        assert_eq!(response.status, StatusCode::SEE_OTHER, "{}", response.body);
        response
    }

    /// Insert an order with one line of `product_id`.
    pub async fn insert_order(
        &self,
        user: UserId,
        status: &str,
        product_id: i32,
        quantity: i32,
        unit_price: &str,
    ) -> OrderId {
        let total = unit_price.parse::<f64>().expect("price") * f64::from(quantity);
        let orders = self
            .db
            .insert(&Insert::one(
                Table::Orders,
                row([
                    ("user_id", json!(user)),
                    ("status", json!(status)),
                    ("total", json!(format!("{total:.2}"))),
                ]),
            ))
            .await
            .expect("insert order");
        let id = orders
            .first()
            .and_then(|o| o.get("id"))
            .and_then(Value::as_i64)
            .and_then(|id| i32::try_from(id).ok())
            .expect("order id");

        self.db
            .insert(&Insert::one(
                Table::OrderItems,
                row([
                    ("order_id", json!(id)),
                    ("product_id", json!(product_id)),
                    ("quantity", json!(quantity)),
                    ("unit_price", json!(unit_price)),
                ]),
            ))
            .await
            .expect("insert order item");

        OrderId::new(id)
    }
}

/// Minimal form encoding for test values.
fn encode(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                char::from(b).to_string()
            }
            b' ' => "+".to_string(),
            _ => format!("%{b:02X}"),
        })
        .collect()
}

/// Categories 1 Coffee, 2 Tea, 3 Members Reserve (members only).
/// Products 1 Dark Roast, 2 Green Tea, 3 Reserve Blend.
async fn seed_catalog(db: &MemoryPersistence) {
    db.insert(&Insert {
        table: Table::Categories,
        rows: vec![
            row([("name", json!("Coffee"))]),
            row([("name", json!("Tea"))]),
            row([
                ("name", json!("Members Reserve")),
                ("members_only", json!(true)),
            ]),
        ],
    })
    .await
    .expect("seed categories");

    let product = |title: &str, price: &str, sku: &str, category: i32| {
        row([
            ("title", json!(title)),
            ("description", json!(format!("{title} from the corner shop."))),
            ("price", json!(price)),
            ("sku", json!(sku)),
            ("category_id", json!(category)),
        ])
    };
    db.insert(&Insert {
        table: Table::Products,
        rows: vec![
            product("Dark Roast", "12.50", "COF-DARK", 1),
            product("Green Tea", "8.00", "TEA-GREEN", 2),
            product("Reserve Blend", "24.00", "RES-BLEND", 3),
        ],
    })
    .await
    .expect("seed products");
}
