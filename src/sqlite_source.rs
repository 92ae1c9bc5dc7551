//! SQLite implementations of the engine's data-source traits.
//!
//! Metadata comes from `sqlite_master` and the `pragma_*` table-valued
//! functions. Result values are decoded by their runtime storage class,
//! since expression columns such as `COUNT(*)` carry no declared type.

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};

use askdb_core::models::{ResultSet, SqlValue};
use askdb_core::sql::quote_ident;
use askdb_core::store::{Introspector, RawColumn, RawForeignKey, SqlExecutor};
use askdb_core::{Error, Result};

/// A connected SQLite database. Cloning shares the pool.
#[derive(Clone)]
pub struct SqliteSource {
    pool: SqlitePool,
}

impl SqliteSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn introspection(e: sqlx::Error) -> Error {
    Error::introspection(e.to_string())
}

#[async_trait]
impl Introspector for SqliteSource {
    async fn tables(&self) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(introspection)
    }

    async fn columns(&self, table: &str) -> Result<Vec<RawColumn>> {
        let unique: Vec<String> = sqlx::query_scalar(
            "SELECT ii.name FROM pragma_index_list(?1) AS il \
             JOIN pragma_index_info(il.name) AS ii \
             WHERE il.\"unique\" = 1 \
             GROUP BY il.name HAVING COUNT(*) = 1",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(introspection)?;

        let rows = sqlx::query(
            "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(introspection)?;

        if rows.is_empty() {
            return Err(Error::introspection(format!("no such table: {}", table)));
        }

        rows.iter()
            .map(|row| {
                let name: String = row.try_get("name").map_err(introspection)?;
                let data_type: String = row.try_get("type").map_err(introspection)?;
                let not_null: i64 = row.try_get("notnull").map_err(introspection)?;
                let pk: i64 = row.try_get("pk").map_err(introspection)?;
                Ok(RawColumn {
                    unique: unique.iter().any(|u| u == &name),
                    name,
                    data_type,
                    nullable: not_null == 0 && pk == 0,
                    primary_key: pk > 0,
                })
            })
            .collect()
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<RawForeignKey>> {
        let rows = sqlx::query(
            "SELECT \"from\", \"table\", \"to\" FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(introspection)?;

        rows.iter()
            .map(|row| {
                Ok(RawForeignKey {
                    from_column: row.try_get("from").map_err(introspection)?,
                    to_table: row.try_get("table").map_err(introspection)?,
                    to_column: row.try_get("to").map_err(introspection)?,
                })
            })
            .collect()
    }

    async fn distinct_values(
        &self,
        table: &str,
        column: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let column = quote_ident(column);
        let sql = format!(
            "SELECT DISTINCT CAST({col} AS TEXT) FROM {table} \
             WHERE {col} IS NOT NULL ORDER BY 1 LIMIT ?1",
            col = column,
            table = quote_ident(table)
        );
        sqlx::query_scalar(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(introspection)
    }
}

#[async_trait]
impl SqlExecutor for SqliteSource {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<ResultSet> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                SqlValue::Null => query.bind(None::<String>),
                SqlValue::Integer(i) => query.bind(*i),
                SqlValue::Real(f) => query.bind(*f),
                SqlValue::Text(s) => query.bind(s.clone()),
            };
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::sql(e.to_string()))?;

        let columns = rows
            .first()
            .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows = rows
            .iter()
            .map(decode_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(ResultSet { columns, rows })
    }
}

fn decode_row(row: &SqliteRow) -> Result<Vec<SqlValue>> {
    (0..row.len()).map(|i| decode_value(row, i)).collect()
}

fn decode_value(row: &SqliteRow, i: usize) -> Result<SqlValue> {
    let decode_err = |e: sqlx::Error| Error::sql(e.to_string());
    let raw = row.try_get_raw(i).map_err(decode_err)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let kind = raw.type_info().name().to_ascii_uppercase();
    let value = match kind.as_str() {
        "INTEGER" | "BOOLEAN" => SqlValue::Integer(row.try_get_unchecked::<i64, _>(i).map_err(decode_err)?),
        "REAL" | "NUMERIC" => SqlValue::Real(row.try_get_unchecked::<f64, _>(i).map_err(decode_err)?),
        "BLOB" => {
            let bytes: Vec<u8> = row.try_get_unchecked(i).map_err(decode_err)?;
            SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => SqlValue::Text(row.try_get_unchecked::<String, _>(i).map_err(decode_err)?),
    };
    Ok(value)
}
