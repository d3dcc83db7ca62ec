//! Fixtures shared by service tests.

use serde_json::json;
use uuid::Uuid;

use cornershop_core::UserId;

use crate::db::{Insert, MemoryPersistence, Persistence, Table, query::row};

pub const ALICE: UserId = UserId::new(Uuid::from_u128(0xA11CE));
pub const BOB: UserId = UserId::new(Uuid::from_u128(0xB0B));

/// Three categories (the third members-only) and four products.
#[allow(clippy::unwrap_used)]
pub async fn seeded_store() -> MemoryPersistence {
    let store = MemoryPersistence::new();
    store
        .insert(&Insert {
            table: Table::Categories,
            rows: vec![
                row([("name", json!("Coffee"))]),
                row([("name", json!("Tea"))]),
                row([("name", json!("Members Reserve")), ("members_only", json!(true))]),
            ],
        })
        .await
        .unwrap();

    let product = |title: &str, price: &str, sku: &str, category: i32| {
        row([
            ("title", json!(title)),
            ("description", json!(format!("{title} from the corner shop."))),
            ("price", json!(price)),
            ("sku", json!(sku)),
            ("category_id", json!(category)),
        ])
    };
    store
        .insert(&Insert {
            table: Table::Products,
            rows: vec![
                product("Dark Roast", "12.50", "COF-DARK", 1),
                product("Green Tea", "8.00", "TEA-GREEN", 2),
                product("Light Roast", "11.00", "COF-LIGHT", 1),
                product("Reserve Blend", "24.00", "RES-BLEND", 3),
            ],
        })
        .await
        .unwrap();
    store
}
