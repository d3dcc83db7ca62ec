//! In-process persistence backend.
//!
//! Interprets the same query descriptions as [`PgPersistence`](super::PgPersistence)
//! against tables held in memory. Used by tests and by local runs without a
//! configured database. Data is lost when the process exits.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use super::{
    Delete, Embed, Filter, FilterOp, Insert, Link, Persistence, RepositoryError, Row, Select,
    Table, Update, require_filters,
};

#[derive(Debug, Default)]
struct TableData {
    rows: Vec<Row>,
    next_id: i64,
}

#[derive(Debug, Default)]
struct Tables {
    tables: HashMap<Table, TableData>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Tables {
    fn rows(&self, table: Table) -> &[Row] {
        self.tables.get(&table).map_or(&[], |t| t.rows.as_slice())
    }

    /// Strictly increasing timestamps so `created_at` ordering is deterministic.
    fn next_timestamp(&mut self) -> String {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

/// Column defaults applied on insert, mirroring the migration's `DEFAULT`s.
fn column_defaults(table: Table) -> Vec<(&'static str, Value)> {
    match table {
        Table::Categories => vec![
            ("description", Value::Null),
            ("members_only", Value::Bool(false)),
        ],
        Table::Products => vec![
            ("description", Value::Null),
            ("image_url", Value::Null),
            ("category_id", Value::Null),
        ],
        Table::Carts => vec![("user_id", Value::Null)],
        Table::CartItems => vec![("quantity", Value::from(1))],
        Table::Orders => vec![("status", Value::from("pending"))],
        Table::Addresses => vec![
            ("line2", Value::Null),
            ("region", Value::Null),
            ("phone", Value::Null),
            ("is_default", Value::Bool(false)),
        ],
        Table::Reviews => vec![("comment", Value::Null), ("author_name", Value::Null)],
        Table::OrderItems => Vec::new(),
    }
}

/// In-memory implementation of [`Persistence`].
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    state: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl MemoryPersistence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `RepositoryError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    /// Number of rows currently stored in `table`.
    pub async fn count(&self, table: Table) -> usize {
        self.state.read().await.rows(table).len()
    }

    fn check_available(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(AtomicOrdering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "memory store switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn select(&self, query: &Select) -> Result<Vec<Row>, RepositoryError> {
        self.check_available()?;
        let state = self.state.read().await;

        let mut rows: Vec<Row> = state
            .rows(query.table)
            .iter()
            .filter(|row| matches_all(row, &query.filters))
            .cloned()
            .collect();

        // Sort by the last key first; stable sorts preserve earlier keys.
        for order in query.order.iter().rev() {
            rows.sort_by(|a, b| {
                let ord = compare_for_sort(a.get(order.column), b.get(order.column));
                if order.descending { ord.reverse() } else { ord }
            });
        }

        if let Some(limit) = query.limit {
            rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        for row in &mut rows {
            resolve_embeds(&state, row, &query.embeds);
        }

        Ok(rows)
    }

    async fn insert(&self, query: &Insert) -> Result<Vec<Row>, RepositoryError> {
        self.check_available()?;
        let mut state = self.state.write().await;

        let mut prepared = Vec::with_capacity(query.rows.len());
        for input in &query.rows {
            let mut row = input.clone();
            for (column, default) in column_defaults(query.table) {
                row.entry(column.to_string()).or_insert(default);
            }
            if query.table.has_created_at() && !row.contains_key("created_at") {
                let ts = state.next_timestamp();
                row.insert("created_at".to_string(), Value::String(ts));
            }
            check_foreign_keys(&state, query.table, &row)?;
            prepared.push(row);
        }

        let data = state.tables.entry(query.table).or_default();

        // Ids for the whole batch are settled before anything is stored, so
        // a conflict leaves the table untouched.
        let mut next_id = data.next_id;
        let mut ids = Vec::with_capacity(prepared.len());
        let mut batch = HashSet::new();
        for row in &prepared {
            let id = match row.get("id").and_then(Value::as_i64) {
                Some(id) => {
                    next_id = next_id.max(id);
                    id
                }
                None => {
                    next_id += 1;
                    next_id
                }
            };
            let taken = data.rows.iter().any(|r| r.get("id").and_then(Value::as_i64) == Some(id));
            if taken || !batch.insert(id) {
                return Err(RepositoryError::Conflict(format!(
                    "duplicate key {id} in {}",
                    query.table
                )));
            }
            ids.push(id);
        }
        data.next_id = next_id;

        let mut inserted = Vec::with_capacity(prepared.len());
        for (mut row, id) in prepared.into_iter().zip(ids) {
            row.insert("id".to_string(), Value::from(id));
            data.rows.push(row.clone());
            inserted.push(row);
        }

        Ok(inserted)
    }

    async fn update(&self, query: &Update) -> Result<Vec<Row>, RepositoryError> {
        self.check_available()?;
        require_filters(query.table, &query.filters, "update")?;
        let mut state = self.state.write().await;

        let Some(data) = state.tables.get_mut(&query.table) else {
            return Ok(Vec::new());
        };

        let mut updated = Vec::new();
        for row in data.rows.iter_mut().filter(|r| matches_all(r, &query.filters)) {
            for (column, value) in &query.patch {
                if column != "id" {
                    row.insert(column.clone(), value.clone());
                }
            }
            updated.push(row.clone());
        }

        Ok(updated)
    }

    async fn delete(&self, query: &Delete) -> Result<u64, RepositoryError> {
        self.check_available()?;
        require_filters(query.table, &query.filters, "delete")?;
        let mut state = self.state.write().await;

        let removed_ids: Vec<Value> = state
            .rows(query.table)
            .iter()
            .filter(|r| matches_all(r, &query.filters))
            .filter_map(|r| r.get("id").cloned())
            .collect();
        if removed_ids.is_empty() {
            return Ok(0);
        }

        if let Some(data) = state.tables.get_mut(&query.table) {
            data.rows.retain(|r| !matches_all(r, &query.filters));
        }
        cascade(&mut state, query.table, &removed_ids);

        Ok(removed_ids.len() as u64)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        self.check_available()
    }
}

/// `ON DELETE CASCADE` children, as declared in the migration.
const fn cascading_children(table: Table) -> &'static [(Table, &'static str)] {
    match table {
        Table::Carts => &[(Table::CartItems, "cart_id")],
        Table::Orders => &[(Table::OrderItems, "order_id")],
        Table::Products => &[(Table::CartItems, "product_id"), (Table::Reviews, "product_id")],
        _ => &[],
    }
}

fn cascade(state: &mut Tables, table: Table, removed_ids: &[Value]) {
    for (child, foreign_key) in cascading_children(table) {
        if let Some(data) = state.tables.get_mut(child) {
            data.rows.retain(|r| {
                r.get(*foreign_key)
                    .is_none_or(|fk| !removed_ids.iter().any(|id| values_equal(fk, id)))
            });
        }
    }
}

/// Foreign keys that must reference an existing row.
const fn foreign_keys(table: Table) -> &'static [(&'static str, Table)] {
    match table {
        Table::Products => &[("category_id", Table::Categories)],
        Table::CartItems => &[("cart_id", Table::Carts), ("product_id", Table::Products)],
        Table::OrderItems => &[("order_id", Table::Orders), ("product_id", Table::Products)],
        Table::Reviews => &[("product_id", Table::Products)],
        _ => &[],
    }
}

fn check_foreign_keys(state: &Tables, table: Table, row: &Row) -> Result<(), RepositoryError> {
    for (column, parent) in foreign_keys(table) {
        let Some(value) = row.get(*column).filter(|v| !v.is_null()) else {
            continue;
        };
        let exists = state
            .rows(*parent)
            .iter()
            .any(|r| r.get("id").is_some_and(|id| values_equal(id, value)));
        if !exists {
            return Err(RepositoryError::Conflict(format!(
                "{table}.{column} references missing {parent} row {value}"
            )));
        }
    }
    Ok(())
}

fn resolve_embeds(state: &Tables, row: &mut Row, embeds: &[Embed]) {
    for embed in embeds {
        let value = match embed.link {
            Link::BelongsTo { foreign_key } => row
                .get(foreign_key)
                .filter(|fk| !fk.is_null())
                .and_then(|fk| {
                    state
                        .rows(embed.table)
                        .iter()
                        .find(|r| r.get("id").is_some_and(|id| values_equal(id, fk)))
                })
                .map_or(Value::Null, |child| {
                    let mut child = child.clone();
                    resolve_embeds(state, &mut child, &embed.embeds);
                    Value::Object(child)
                }),
            Link::HasMany { foreign_key } => {
                let parent_id = row.get("id").cloned().unwrap_or(Value::Null);
                let mut children: Vec<Row> = state
                    .rows(embed.table)
                    .iter()
                    .filter(|r| r.get(foreign_key).is_some_and(|fk| values_equal(fk, &parent_id)))
                    .cloned()
                    .collect();
                children.sort_by(|a, b| compare_for_sort(a.get("id"), b.get("id")));
                Value::Array(
                    children
                        .into_iter()
                        .map(|mut child| {
                            resolve_embeds(state, &mut child, &embed.embeds);
                            Value::Object(child)
                        })
                        .collect(),
                )
            }
        };
        row.insert(embed.name.to_string(), value);
    }
}

fn matches_all(row: &Row, filters: &[Filter]) -> bool {
    filters.iter().all(|f| matches(row, f))
}

fn matches(row: &Row, filter: &Filter) -> bool {
    let actual = row.get(filter.column).unwrap_or(&Value::Null);
    match filter.op {
        FilterOp::IsNull => actual.is_null() == filter.value.as_bool().unwrap_or(true),
        FilterOp::ILike => match (actual, filter.value.as_str()) {
            (Value::Null, _) | (_, None) => false,
            (Value::String(s), Some(pattern)) => ilike(s, pattern),
            (other, Some(pattern)) => ilike(&other.to_string(), pattern),
        },
        op => {
            // SQL comparisons with NULL are never true.
            if actual.is_null() || filter.value.is_null() {
                return false;
            }
            let Some(ord) = compare_values(actual, &filter.value) else {
                return op == FilterOp::Neq;
            };
            match op {
                FilterOp::Eq => ord == Ordering::Equal,
                FilterOp::Neq => ord != Ordering::Equal,
                FilterOp::Gt => ord == Ordering::Greater,
                FilterOp::Gte => ord != Ordering::Less,
                FilterOp::Lt => ord == Ordering::Less,
                FilterOp::Lte => ord != Ordering::Greater,
                FilterOp::ILike | FilterOp::IsNull => false,
            }
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

/// Compare two JSON scalars. Numbers (including numeric strings such as
/// serialized decimals) compare numerically, strings lexically.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            as_number(a).zip(as_number(b)).and_then(|(x, y)| x.partial_cmp(&y))
        }
        _ => (a == b).then_some(Ordering::Equal),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Some(Ordering::Equal)
}

/// Sort order with `NULL`s last, as `PostgreSQL` does for ascending sorts.
fn compare_for_sort(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LikeToken {
    AnyRun,
    AnyOne,
    Literal(char),
}

/// Split a `LIKE` pattern into tokens; `\` escapes the next character.
fn like_tokens(pattern: &str) -> Vec<LikeToken> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => LikeToken::AnyRun,
            '_' => LikeToken::AnyOne,
            '\\' => LikeToken::Literal(chars.next().unwrap_or('\\')),
            c => LikeToken::Literal(c),
        });
    }
    tokens
}

/// Case-insensitive SQL `LIKE` matching with `%`, `_` and `\` escapes.
fn ilike(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern = like_tokens(&pattern.to_lowercase());

    // Classic wildcard matching with backtracking on the last `%`.
    let (mut t, mut p) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some(LikeToken::AnyRun) => {
                star = Some((p, t));
                p += 1;
            }
            Some(LikeToken::AnyOne) => {
                t += 1;
                p += 1;
            }
            Some(LikeToken::Literal(c)) if text.get(t) == Some(c) => {
                t += 1;
                p += 1;
            }
            _ => match star {
                Some((sp, st)) => {
                    p = sp + 1;
                    t = st + 1;
                    star = Some((sp, st + 1));
                }
                None => return false,
            },
        }
    }
    pattern
        .get(p..)
        .is_some_and(|rest| rest.iter().all(|&tok| tok == LikeToken::AnyRun))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::query::row;
    use serde_json::json;

    async fn seeded() -> MemoryPersistence {
        let store = MemoryPersistence::new();
        store
            .insert(&Insert {
                table: Table::Categories,
                rows: vec![row([("name", "Coffee")]), row([("name", "Tea")])],
            })
            .await
            .unwrap();
        store
            .insert(&Insert {
                table: Table::Products,
                rows: vec![
                    row([("name", json!("Dark Roast")), ("price", json!("12.50")), ("category_id", json!(1))]),
                    row([("name", json!("Green Tea")), ("price", json!("8.00")), ("category_id", json!(2))]),
                    row([("name", json!("Light Roast")), ("price", json!("11.00")), ("category_id", json!(1))]),
                ],
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_insert_assigns_ids_and_defaults() {
        let store = seeded().await;
        let rows = store.select(&Select::new(Table::Categories)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], json!(1));
        assert_eq!(rows[1]["id"], json!(2));
        assert_eq!(rows[0]["members_only"], json!(false));
        assert!(rows[0]["created_at"].is_string());
    }

    #[tokio::test]
    async fn test_conflicting_batch_inserts_nothing() {
        let store = seeded().await;

        let err = store
            .insert(&Insert {
                table: Table::Categories,
                rows: vec![
                    row([("name", json!("Cocoa"))]),
                    row([("id", json!(7)), ("name", json!("Spices"))]),
                    row([("id", json!(2)), ("name", json!("Duplicate"))]),
                ],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        let rows = store.select(&Select::new(Table::Categories)).await.unwrap();
        assert_eq!(rows.len(), 2);

        // The failed batch consumed no ids.
        let inserted = store
            .insert(&Insert::one(Table::Categories, row([("name", json!("Cocoa"))])))
            .await
            .unwrap();
        assert_eq!(inserted[0]["id"], json!(3));
    }

    #[tokio::test]
    async fn test_batch_id_colliding_with_assigned_id_is_rejected() {
        let store = MemoryPersistence::new();
        let err = store
            .insert(&Insert {
                table: Table::Categories,
                rows: vec![row([("name", json!("Coffee"))]), row([("id", json!(1)), ("name", json!("Tea"))])],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert!(store.select(&Select::new(Table::Categories)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_filters_and_ordering() {
        let store = seeded().await;
        let rows = store
            .select(&Select::new(Table::Products).eq("category_id", 1).order_by_desc("name"))
            .await
            .unwrap();
        let names: Vec<_> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Light Roast", "Dark Roast"]);

        let cheap = store
            .select(&Select::new(Table::Products).filter(Filter::new("price", FilterOp::Lt, 11.5)))
            .await
            .unwrap();
        assert_eq!(cheap.len(), 2);
    }

    #[tokio::test]
    async fn test_ilike_search() {
        let store = seeded().await;
        let rows = store
            .select(&Select::new(Table::Products).filter(Filter::ilike("name", "%ROAST%")))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(ilike("Green Tea", "gr__n%"));
        assert!(!ilike("Green Tea", "tea"));
        assert!(ilike("50% off", "50\\%%"));
        assert!(!ilike("501 blend", "50\\%%"));
        assert!(ilike("a_b", "a\\_b"));
        assert!(!ilike("axb", "a\\_b"));
    }

    #[tokio::test]
    async fn test_limit() {
        let store = seeded().await;
        let rows = store
            .select(&Select::new(Table::Products).order_by("id").limit(2))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_nested_embeds() {
        let store = seeded().await;
        store
            .insert(&Insert::one(Table::Carts, Row::new()))
            .await
            .unwrap();
        store
            .insert(&Insert::one(
                Table::CartItems,
                row([("cart_id", 1), ("product_id", 3), ("quantity", 2)]),
            ))
            .await
            .unwrap();

        let carts = store
            .select(
                &Select::new(Table::Carts).embed(
                    Embed::has_many("items", Table::CartItems, "cart_id").with(
                        Embed::belongs_to("product", Table::Products, "product_id").with(
                            Embed::belongs_to("category", Table::Categories, "category_id"),
                        ),
                    ),
                ),
            )
            .await
            .unwrap();

        let item = &carts[0]["items"][0];
        assert_eq!(item["quantity"], json!(2));
        assert_eq!(item["product"]["name"], json!("Light Roast"));
        assert_eq!(item["product"]["category"]["name"], json!("Coffee"));
    }

    #[tokio::test]
    async fn test_missing_foreign_key_is_conflict() {
        let store = seeded().await;
        let err = store
            .insert(&Insert::one(
                Table::CartItems,
                row([("cart_id", 99), ("product_id", 1)]),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_and_delete_with_cascade() {
        let store = seeded().await;
        store.insert(&Insert::one(Table::Carts, Row::new())).await.unwrap();
        store
            .insert(&Insert::one(Table::CartItems, row([("cart_id", 1), ("product_id", 1)])))
            .await
            .unwrap();

        let updated = store
            .update(&Update::new(Table::CartItems, row([("quantity", 5)])).eq("cart_id", 1))
            .await
            .unwrap();
        assert_eq!(updated[0]["quantity"], json!(5));

        let deleted = store.delete(&Delete::new(Table::Carts).eq("id", 1)).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count(Table::CartItems).await, 0);

        let none = store.delete(&Delete::new(Table::Carts).eq("id", 1)).await.unwrap();
        assert_eq!(none, 0);
    }

    #[tokio::test]
    async fn test_null_filters() {
        let store = seeded().await;
        store.insert(&Insert::one(Table::Carts, Row::new())).await.unwrap();
        let anonymous = store
            .select(&Select::new(Table::Carts).filter(Filter::is_null("user_id")))
            .await
            .unwrap();
        assert_eq!(anonymous.len(), 1);
        let owned = store
            .select(&Select::new(Table::Carts).eq("user_id", "x"))
            .await
            .unwrap();
        assert!(owned.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_switch() {
        let store = seeded().await;
        store.set_unavailable(true);
        let err = store.select(&Select::new(Table::Products)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Unavailable(_)));
        assert!(store.ping().await.is_err());

        store.set_unavailable(false);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_timestamps_strictly_increase() {
        let store = MemoryPersistence::new();
        let rows = store
            .insert(&Insert {
                table: Table::Categories,
                rows: vec![row([("name", "a")]), row([("name", "b")]), row([("name", "c")])],
            })
            .await
            .unwrap();
        let stamps: Vec<_> = rows.iter().map(|r| r["created_at"].as_str().unwrap()).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }
}
