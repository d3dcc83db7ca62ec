//! Hierarchical cache keys.
//!
//! Every entity has the same key shape:
//!
//! ```text
//! all()       ["orders"]
//! lists()     ["orders", "list"]
//! list(x)     ["orders", "list", x]
//! details()   ["orders", "detail"]
//! detail(id)  ["orders", "detail", id]
//! ```
//!
//! Invalidating a key also invalidates every key nested under it, so
//! `orders::all()` drops all order lists and details at once.

use std::fmt;

/// A path of key segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    #[must_use]
    pub fn root(segment: &str) -> Self {
        Self(vec![segment.to_string()])
    }

    /// Append a segment.
    #[must_use]
    pub fn push(mut self, segment: impl fmt::Display) -> Self {
        self.0.push(segment.to_string());
        self
    }

    /// Whether `prefix` is this key or one of its ancestors.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

macro_rules! entity_keys {
    ($(#[$meta:meta])* $module:ident, $root:literal) => {
        $(#[$meta])*
        pub mod $module {
            use super::QueryKey;

            #[must_use]
            pub fn all() -> QueryKey {
                QueryKey::root($root)
            }

            #[must_use]
            pub fn lists() -> QueryKey {
                all().push("list")
            }

            #[must_use]
            pub fn list(scope: impl ::std::fmt::Display) -> QueryKey {
                lists().push(scope)
            }

            #[must_use]
            pub fn details() -> QueryKey {
                all().push("detail")
            }

            #[must_use]
            pub fn detail(id: impl ::std::fmt::Display) -> QueryKey {
                details().push(id)
            }
        }
    };
}

entity_keys!(
    /// Address lists are scoped by user.
    addresses,
    "addresses"
);
entity_keys!(
    /// Cart item lists are scoped by cart; `count(cart)` holds the badge total.
    cart,
    "cart"
);
entity_keys!(categories, "categories");
entity_keys!(
    /// Order lists are scoped by user.
    orders,
    "orders"
);
entity_keys!(
    /// Product lists are scoped by the listing filter.
    products,
    "products"
);
entity_keys!(
    /// Review lists are scoped by product.
    reviews,
    "reviews"
);

/// Key for a cart's item count badge.
#[must_use]
pub fn cart_count(cart: impl fmt::Display) -> QueryKey {
    cart::all().push("count").push(cart)
}
