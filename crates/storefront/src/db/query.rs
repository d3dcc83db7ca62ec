//! Table-oriented query descriptions.
//!
//! Queries are plain data: a table, filter predicates, ordering, a limit,
//! and embedded related tables. Both persistence backends interpret the same
//! description, so service code never builds SQL itself.
//!
//! ```rust,ignore
//! let query = Select::new(Table::Orders)
//!     .eq("user_id", user_id)
//!     .order_by_desc("created_at")
//!     .embed(Embed::has_many("items", Table::OrderItems, "order_id")
//!         .with(Embed::belongs_to("product", Table::Products, "product_id")));
//! ```

use serde_json::Value;

/// A database row as a JSON object keyed by column name.
pub type Row = serde_json::Map<String, Value>;

/// Tables the storefront reads and writes.
///
/// Table names are a closed set so they can be interpolated into SQL safely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Categories,
    Products,
    Carts,
    CartItems,
    Orders,
    OrderItems,
    Addresses,
    Reviews,
}

impl Table {
    /// Every table, in dependency order.
    pub const ALL: [Self; 8] = [
        Self::Categories,
        Self::Products,
        Self::Carts,
        Self::CartItems,
        Self::Orders,
        Self::OrderItems,
        Self::Addresses,
        Self::Reviews,
    ];

    /// SQL table name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Categories => "categories",
            Self::Products => "products",
            Self::Carts => "carts",
            Self::CartItems => "cart_items",
            Self::Orders => "orders",
            Self::OrderItems => "order_items",
            Self::Addresses => "addresses",
            Self::Reviews => "reviews",
        }
    }

    /// Whether rows carry a `created_at` timestamp.
    #[must_use]
    pub const fn has_created_at(self) -> bool {
        !matches!(self, Self::OrderItems)
    }
}

impl core::fmt::Display for Table {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator of a filter predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Case-insensitive SQL `LIKE` pattern (`%` and `_` wildcards).
    ILike,
    /// `value` is a boolean: `true` means `IS NULL`, `false` means `IS NOT NULL`.
    IsNull,
}

/// A single `column <op> value` predicate. Filters on a query are AND-ed.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: &'static str,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    #[must_use]
    pub fn new(column: &'static str, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            column,
            op,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Eq, value)
    }

    #[must_use]
    pub fn neq(column: &'static str, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Neq, value)
    }

    #[must_use]
    pub fn ilike(column: &'static str, pattern: impl Into<String>) -> Self {
        Self::new(column, FilterOp::ILike, Value::String(pattern.into()))
    }

    #[must_use]
    pub fn is_null(column: &'static str) -> Self {
        Self::new(column, FilterOp::IsNull, true)
    }
}

/// Sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub column: &'static str,
    pub descending: bool,
}

/// How an embedded table relates to its parent row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    /// Parent holds `foreign_key` pointing at the child's `id` (one object).
    BelongsTo { foreign_key: &'static str },
    /// Child holds `foreign_key` pointing at the parent's `id` (array).
    HasMany { foreign_key: &'static str },
}

/// A related table joined into each result row under `name`.
#[derive(Debug, Clone, PartialEq)]
pub struct Embed {
    pub name: &'static str,
    pub table: Table,
    pub link: Link,
    pub embeds: Vec<Self>,
}

impl Embed {
    #[must_use]
    pub const fn belongs_to(name: &'static str, table: Table, foreign_key: &'static str) -> Self {
        Self {
            name,
            table,
            link: Link::BelongsTo { foreign_key },
            embeds: Vec::new(),
        }
    }

    #[must_use]
    pub const fn has_many(name: &'static str, table: Table, foreign_key: &'static str) -> Self {
        Self {
            name,
            table,
            link: Link::HasMany { foreign_key },
            embeds: Vec::new(),
        }
    }

    /// Nest another embed inside this one.
    #[must_use]
    pub fn with(mut self, embed: Self) -> Self {
        self.embeds.push(embed);
        self
    }
}

/// `SELECT` description.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: Table,
    pub filters: Vec<Filter>,
    pub order: Vec<OrderBy>,
    pub limit: Option<u32>,
    pub embeds: Vec<Embed>,
}

impl Select {
    #[must_use]
    pub const fn new(table: Table) -> Self {
        Self {
            table,
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            embeds: Vec::new(),
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn eq(self, column: &'static str, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(column, value))
    }

    #[must_use]
    pub fn order_by(mut self, column: &'static str) -> Self {
        self.order.push(OrderBy {
            column,
            descending: false,
        });
        self
    }

    #[must_use]
    pub fn order_by_desc(mut self, column: &'static str) -> Self {
        self.order.push(OrderBy {
            column,
            descending: true,
        });
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }
}

/// `INSERT` description. Backends return the inserted rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: Table,
    pub rows: Vec<Row>,
}

impl Insert {
    #[must_use]
    pub fn one(table: Table, row: Row) -> Self {
        Self {
            table,
            rows: vec![row],
        }
    }
}

/// `UPDATE` description. Backends return the updated rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: Table,
    pub filters: Vec<Filter>,
    pub patch: Row,
}

impl Update {
    #[must_use]
    pub const fn new(table: Table, patch: Row) -> Self {
        Self {
            table,
            filters: Vec::new(),
            patch,
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn eq(self, column: &'static str, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(column, value))
    }
}

/// `DELETE` description. Backends return the number of deleted rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: Table,
    pub filters: Vec<Filter>,
}

impl Delete {
    #[must_use]
    pub const fn new(table: Table) -> Self {
        Self {
            table,
            filters: Vec::new(),
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn eq(self, column: &'static str, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(column, value))
    }
}

/// Build a [`Row`] from `(column, value)` pairs.
#[must_use]
pub fn row<I, V>(pairs: I) -> Row
where
    I: IntoIterator<Item = (&'static str, V)>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(column, value)| (column.to_string(), value.into()))
        .collect()
}

/// Whether `name` is safe to quote as a SQL identifier.
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_builder_accumulates() {
        let query = Select::new(Table::Orders)
            .eq("user_id", "abc")
            .order_by_desc("created_at")
            .limit(5)
            .embed(Embed::has_many("items", Table::OrderItems, "order_id"));

        assert_eq!(query.filters.len(), 1);
        assert_eq!(query.order.len(), 1);
        assert!(query.order.first().is_some_and(|o| o.descending));
        assert_eq!(query.limit, Some(5));
        assert_eq!(query.embeds.len(), 1);
    }

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_identifier("user_id"));
        assert!(is_valid_identifier("_x1"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("name; drop table"));
        assert!(!is_valid_identifier("Name"));
    }

    #[test]
    fn test_row_helper() {
        let r = row([("quantity", 2)]);
        assert_eq!(r.get("quantity"), Some(&Value::from(2)));
    }
}
