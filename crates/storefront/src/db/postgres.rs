//! `PostgreSQL` persistence backend.
//!
//! Query descriptions are rendered with `sqlx::QueryBuilder`. Every row comes
//! back as `jsonb` (`to_jsonb(t.*)`), embeds are correlated sub-selects
//! merged into the parent object, and every filter value is bound as a
//! parameter. Only identifiers known at compile time (table names, filter
//! columns) or validated with [`is_valid_identifier`] are interpolated.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, instrument};

use super::query::is_valid_identifier;
use super::{
    Delete, Embed, Filter, FilterOp, Insert, Link, Persistence, RepositoryError, Row, Select,
    Table, Update, require_filters,
};

/// Persistence client backed by a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PgPersistence {
    pool: PgPool,
}

impl PgPersistence {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map driver errors, turning constraint violations into `Conflict`.
fn map_db_error(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && (db_err.is_unique_violation() || db_err.is_foreign_key_violation())
    {
        return RepositoryError::Conflict(db_err.message().to_owned());
    }
    RepositoryError::Database(e)
}

fn push_ident(qb: &mut QueryBuilder<'_, Postgres>, name: &str) {
    qb.push("\"").push(name).push("\"");
}

fn checked_columns(row: &Row) -> Result<Vec<&str>, RepositoryError> {
    row.keys()
        .map(|key| {
            if is_valid_identifier(key) {
                Ok(key.as_str())
            } else {
                Err(RepositoryError::InvalidQuery(format!(
                    "invalid column name: {key:?}"
                )))
            }
        })
        .collect()
}

/// Push `to_jsonb(alias.*) || jsonb_build_object(...)` for a row and its embeds.
fn push_row_expr(
    qb: &mut QueryBuilder<'_, Postgres>,
    alias: &str,
    embeds: &[Embed],
    depth: usize,
) {
    qb.push("to_jsonb(").push(alias).push(".*)");
    if embeds.is_empty() {
        return;
    }

    qb.push(" || jsonb_build_object(");
    for (i, embed) in embeds.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push("'").push(embed.name).push("', ");
        push_embed(qb, alias, embed, depth + 1, i);
    }
    qb.push(")");
}

fn push_embed(
    qb: &mut QueryBuilder<'_, Postgres>,
    parent: &str,
    embed: &Embed,
    depth: usize,
    index: usize,
) {
    let alias = format!("e{depth}_{index}");
    match embed.link {
        Link::BelongsTo { foreign_key } => {
            qb.push("(SELECT ");
            push_row_expr(qb, &alias, &embed.embeds, depth);
            qb.push(" FROM ");
            push_ident(qb, embed.table.as_str());
            qb.push(" ").push(&alias).push(" WHERE ").push(&alias).push(".\"id\" = ");
            qb.push(parent).push(".");
            push_ident(qb, foreign_key);
            qb.push(")");
        }
        Link::HasMany { foreign_key } => {
            qb.push("(SELECT coalesce(jsonb_agg(");
            push_row_expr(qb, &alias, &embed.embeds, depth);
            qb.push(" ORDER BY ").push(&alias).push(".\"id\"), '[]'::jsonb) FROM ");
            push_ident(qb, embed.table.as_str());
            qb.push(" ").push(&alias).push(" WHERE ").push(&alias).push(".");
            push_ident(qb, foreign_key);
            qb.push(" = ").push(parent).push(".\"id\")");
        }
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, alias: &str, filters: &[Filter]) {
    for (i, filter) in filters.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        match filter.op {
            FilterOp::IsNull => {
                qb.push(alias).push(".");
                push_ident(qb, filter.column);
                qb.push(if filter.value.as_bool().unwrap_or(true) {
                    " IS NULL"
                } else {
                    " IS NOT NULL"
                });
            }
            FilterOp::ILike => {
                let pattern = filter.value.as_str().unwrap_or_default().to_owned();
                qb.push(alias).push(".");
                push_ident(qb, filter.column);
                qb.push("::text ILIKE ").push_bind(pattern).push(" ESCAPE '\\'");
            }
            op => {
                let operator = match op {
                    FilterOp::Neq => " <> ",
                    FilterOp::Gt => " > ",
                    FilterOp::Gte => " >= ",
                    FilterOp::Lt => " < ",
                    FilterOp::Lte => " <= ",
                    _ => " = ",
                };
                qb.push("(to_jsonb(").push(alias).push(".*) -> ");
                qb.push_bind(filter.column);
                qb.push(")").push(operator).push_bind(Json(filter.value.clone()));
            }
        }
    }
}

fn rows_from_json(values: Vec<Json<Value>>, table: Table) -> Result<Vec<Row>, RepositoryError> {
    values
        .into_iter()
        .map(|Json(value)| match value {
            Value::Object(row) => Ok(row),
            other => Err(RepositoryError::DataCorruption(format!(
                "expected {table} row object, got {other}"
            ))),
        })
        .collect()
}

#[async_trait]
impl Persistence for PgPersistence {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    #[instrument(skip(self, query), fields(table = %query.table))]
    async fn select(&self, query: &Select) -> Result<Vec<Row>, RepositoryError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        push_row_expr(&mut qb, "t0", &query.embeds, 0);
        qb.push(" FROM ");
        push_ident(&mut qb, query.table.as_str());
        qb.push(" t0");
        push_filters(&mut qb, "t0", &query.filters);

        for (i, order) in query.order.iter().enumerate() {
            qb.push(if i == 0 { " ORDER BY t0." } else { ", t0." });
            push_ident(&mut qb, order.column);
            qb.push(if order.descending { " DESC" } else { " ASC" });
        }
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(i64::from(limit));
        }

        debug!(sql = qb.sql(), "select");
        let values = qb
            .build_query_scalar::<Json<Value>>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;

        rows_from_json(values, query.table)
    }

    #[instrument(skip(self, query), fields(table = %query.table, rows = query.rows.len()))]
    async fn insert(&self, query: &Insert) -> Result<Vec<Row>, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        let mut inserted = Vec::with_capacity(query.rows.len());

        for row in &query.rows {
            let columns = checked_columns(row)?;
            if columns.is_empty() {
                return Err(RepositoryError::InvalidQuery(format!(
                    "empty insert into {}",
                    query.table
                )));
            }

            let mut qb = QueryBuilder::<Postgres>::new("INSERT INTO ");
            push_ident(&mut qb, query.table.as_str());
            qb.push(" AS t0 (");
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_ident(&mut qb, column);
            }
            qb.push(") SELECT ");
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                qb.push("p.");
                push_ident(&mut qb, column);
            }
            qb.push(" FROM jsonb_populate_record(NULL::");
            push_ident(&mut qb, query.table.as_str());
            qb.push(", ")
                .push_bind(Json(Value::Object(row.clone())))
                .push(") p RETURNING to_jsonb(t0.*)");

            let Json(value) = qb
                .build_query_scalar::<Json<Value>>()
                .fetch_one(&mut *tx)
                .await
                .map_err(map_db_error)?;
            inserted.push(Json(value));
        }

        tx.commit().await.map_err(map_db_error)?;
        rows_from_json(inserted, query.table)
    }

    #[instrument(skip(self, query), fields(table = %query.table))]
    async fn update(&self, query: &Update) -> Result<Vec<Row>, RepositoryError> {
        require_filters(query.table, &query.filters, "update")?;
        let columns = checked_columns(&query.patch)?;
        if columns.is_empty() {
            return Err(RepositoryError::InvalidQuery(format!(
                "empty update of {}",
                query.table
            )));
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE ");
        push_ident(&mut qb, query.table.as_str());
        qb.push(" AS t0 SET (");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            push_ident(&mut qb, column);
        }
        qb.push(") = (SELECT ");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push("p.");
            push_ident(&mut qb, column);
        }
        qb.push(" FROM jsonb_populate_record(NULL::");
        push_ident(&mut qb, query.table.as_str());
        qb.push(", ")
            .push_bind(Json(Value::Object(query.patch.clone())))
            .push(") p)");
        push_filters(&mut qb, "t0", &query.filters);
        qb.push(" RETURNING to_jsonb(t0.*)");

        let values = qb
            .build_query_scalar::<Json<Value>>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;

        rows_from_json(values, query.table)
    }

    #[instrument(skip(self, query), fields(table = %query.table))]
    async fn delete(&self, query: &Delete) -> Result<u64, RepositoryError> {
        require_filters(query.table, &query.filters, "delete")?;

        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM ");
        push_ident(&mut qb, query.table.as_str());
        qb.push(" AS t0");
        push_filters(&mut qb, "t0", &query.filters);

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Unavailable(e.to_string()))?;
        Ok(())
    }
}
