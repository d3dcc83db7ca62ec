//! Session-related types.
//!
//! Types stored in the session for authentication and cart state.

use serde::{Deserialize, Serialize};

use cornershop_core::UserId;

/// Session-stored user identity, resolved from the auth service at sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// ID issued by the auth service.
    pub id: UserId,
    pub email: String,
    pub full_name: Option<String>,
}

impl CurrentUser {
    /// Name to greet the user with.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.email)
    }
}

/// Session keys.
pub mod keys {
    /// Key for storing the current signed-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the auth service access token (used for checkout payer info).
    pub const ACCESS_TOKEN: &str = "access_token";

    /// Key for storing the cart ID.
    pub const CART_ID: &str = "cart_id";
}
