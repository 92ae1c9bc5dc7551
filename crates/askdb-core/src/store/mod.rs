//! Collaborator abstractions consumed by the engine.
//!
//! The engine never talks to a database driver directly. It is handed a
//! raw-SQL execution capability, a metadata introspector for the same data
//! source, and a document store. Implementations must be `Send + Sync` so
//! one instance can serve concurrent requests.
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`SqlExecutor`] | Execute a parameterized read-only statement |
//! | [`Introspector`] | Read tables, columns, keys, and sample values |
//! | [`DocumentStore`] | Persist and list ingested documents |

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{DocumentRecord, ResultSet, SqlValue};

/// Raw-SQL execution against a connected data source.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Execute `sql` with positional `params` bound to its `?` placeholders.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<ResultSet>;
}

/// Column metadata as reported by the data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    /// Covered by a single-column unique index.
    pub unique: bool,
}

/// A declared foreign key. `to_column` is `None` when the key refers to the
/// target table's primary key implicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawForeignKey {
    pub from_column: String,
    pub to_table: String,
    pub to_column: Option<String>,
}

/// Read access to a data source's metadata.
#[async_trait]
pub trait Introspector: Send + Sync {
    /// User tables in declaration order.
    async fn tables(&self) -> Result<Vec<String>>;

    /// Columns of `table` in declaration order.
    async fn columns(&self, table: &str) -> Result<Vec<RawColumn>>;

    /// Declared foreign keys of `table`.
    async fn foreign_keys(&self, table: &str) -> Result<Vec<RawForeignKey>>;

    /// Up to `limit` distinct non-null values of `table.column`, as text.
    async fn distinct_values(&self, table: &str, column: &str, limit: usize)
        -> Result<Vec<String>>;
}

/// Persistence for ingested documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_documents(&self) -> Result<Vec<DocumentRecord>>;

    async fn store_document(&self, doc: &DocumentRecord) -> Result<()>;
}
