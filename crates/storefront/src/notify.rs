//! Toast notifications and client-side events over `HX-Trigger`.
//!
//! Mutating routes answer with an `HX-Trigger` header. HTMX dispatches each
//! top-level key as a DOM event on the requesting element; `base.html`
//! listens for `toast` and renders the notification, and fragments listen
//! for domain events such as `cart-updated` to refresh themselves.
//!
//! ```text
//! HX-Trigger: {"toast":{"level":"success","message":"Added to cart"},"cart-updated":true}
//! ```

use std::convert::Infallible;

use axum::http::HeaderValue;
use axum::response::{IntoResponseParts, ResponseParts};
use serde::Serialize;
use serde_json::{Map, Value};

/// HTMX response header that dispatches client-side events.
pub const HX_TRIGGER: &str = "hx-trigger";

/// Cart contents changed.
pub const CART_UPDATED: &str = "cart-updated";

/// Address book changed.
pub const ADDRESSES_UPDATED: &str = "addresses-updated";

/// A review was added or removed.
pub const REVIEWS_UPDATED: &str = "reviews-updated";

/// An order changed status.
pub const ORDERS_UPDATED: &str = "orders-updated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    Success,
    Info,
    Error,
}

/// A transient user notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
}

impl Toast {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Success,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Info,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Error,
            message: message.into(),
        }
    }
}

/// `HX-Trigger` response part carrying an optional toast and events.
///
/// ```rust,ignore
/// Ok((HxTrigger::toast(Toast::success("Added to cart")).event(CART_UPDATED), fragment))
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HxTrigger {
    toast: Option<Toast>,
    events: Vec<&'static str>,
}

impl HxTrigger {
    #[must_use]
    pub fn toast(toast: Toast) -> Self {
        Self {
            toast: Some(toast),
            events: Vec::new(),
        }
    }

    #[must_use]
    pub fn event(mut self, name: &'static str) -> Self {
        if !self.events.contains(&name) {
            self.events.push(name);
        }
        self
    }

    /// JSON header value.
    ///
    /// Non-ASCII characters are written as `\u` escapes so the result is a
    /// valid header value.
    #[must_use]
    pub fn header_value(&self) -> String {
        let mut payload = Map::new();
        if let Some(toast) = &self.toast {
            payload.insert(
                "toast".to_string(),
                serde_json::to_value(toast).unwrap_or(Value::Null),
            );
        }
        for event in &self.events {
            payload.insert((*event).to_string(), Value::Bool(true));
        }
        escape_non_ascii(&Value::Object(payload).to_string())
    }
}

fn escape_non_ascii(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() && !c.is_ascii_control() {
            out.push(c);
        } else {
            let mut units = [0_u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    out
}

impl IntoResponseParts for HxTrigger {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        if self.toast.is_none() && self.events.is_empty() {
            return Ok(res);
        }
        if let Ok(value) = HeaderValue::from_str(&self.header_value()) {
            res.headers_mut().insert(HX_TRIGGER, value);
        }
        Ok(res)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn test_header_value_shape() {
        let trigger = HxTrigger::toast(Toast::success("Added to cart")).event(CART_UPDATED);
        let parsed: Value = serde_json::from_str(&trigger.header_value()).unwrap();
        assert_eq!(parsed["toast"]["level"], "success");
        assert_eq!(parsed["toast"]["message"], "Added to cart");
        assert_eq!(parsed[CART_UPDATED], true);
    }

    #[test]
    fn test_events_are_deduplicated() {
        let trigger = HxTrigger::default().event(CART_UPDATED).event(CART_UPDATED);
        assert_eq!(trigger.header_value(), r#"{"cart-updated":true}"#);
    }

    #[test]
    fn test_non_ascii_is_escaped() {
        let value = HxTrigger::toast(Toast::info("Café added")).header_value();
        assert!(value.is_ascii());
        let parsed: Value = serde_json::from_str(&value).unwrap();
        assert_eq!(parsed["toast"]["message"], "Café added");
    }

    #[test]
    fn test_header_is_set_on_response() {
        let response = (HxTrigger::toast(Toast::error("Nope")), "body").into_response();
        let header = response.headers().get(HX_TRIGGER).unwrap();
        assert!(header.to_str().unwrap().contains("\"error\""));
    }

    #[test]
    fn test_empty_trigger_sets_no_header() {
        let response = (HxTrigger::default(), "body").into_response();
        assert!(response.headers().get(HX_TRIGGER).is_none());
    }
}
