//! In-memory collaborator implementations for tests and embedding.
//!
//! [`MemoryCatalog`] describes a schema (and its sample values) without a
//! database; [`MemoryDocumentStore`] keeps documents in a `Vec`.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::models::DocumentRecord;

use super::{DocumentStore, Introspector, RawColumn, RawForeignKey};

#[derive(Debug, Clone, Default)]
struct CatalogTable {
    name: String,
    columns: Vec<RawColumn>,
    foreign_keys: Vec<RawForeignKey>,
    values: HashMap<String, Vec<String>>,
}

/// A hand-described schema implementing [`Introspector`].
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    tables: Vec<CatalogTable>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table. Columns are `(name, type)`; the first column named `id`
    /// becomes the primary key.
    pub fn table(mut self, name: &str, columns: &[(&str, &str)]) -> Self {
        let columns = columns
            .iter()
            .map(|(col, ty)| RawColumn {
                name: col.to_string(),
                data_type: ty.to_string(),
                nullable: *col != "id",
                primary_key: *col == "id",
                unique: *col == "id",
            })
            .collect();
        self.tables.push(CatalogTable {
            name: name.to_string(),
            columns,
            ..Default::default()
        });
        self
    }

    /// Declare `table.column → to_table(to_column)`.
    pub fn foreign_key(mut self, table: &str, column: &str, to_table: &str, to_column: &str) -> Self {
        if let Some(t) = self.tables.iter_mut().find(|t| t.name == table) {
            t.foreign_keys.push(RawForeignKey {
                from_column: column.to_string(),
                to_table: to_table.to_string(),
                to_column: Some(to_column.to_string()),
            });
        }
        self
    }

    /// Set the distinct values reported for `table.column`.
    pub fn values(mut self, table: &str, column: &str, values: &[&str]) -> Self {
        if let Some(t) = self.tables.iter_mut().find(|t| t.name == table) {
            t.values.insert(
                column.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            );
        }
        self
    }

    fn find(&self, table: &str) -> Result<&CatalogTable> {
        self.tables
            .iter()
            .find(|t| t.name == table)
            .ok_or_else(|| Error::introspection(format!("no such table: {}", table)))
    }
}

#[async_trait]
impl Introspector for MemoryCatalog {
    async fn tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.iter().map(|t| t.name.clone()).collect())
    }

    async fn columns(&self, table: &str) -> Result<Vec<RawColumn>> {
        Ok(self.find(table)?.columns.clone())
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<RawForeignKey>> {
        Ok(self.find(table)?.foreign_keys.clone())
    }

    async fn distinct_values(
        &self,
        table: &str,
        column: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let mut values = self
            .find(table)?
            .values
            .get(column)
            .cloned()
            .unwrap_or_default();
        values.truncate(limit);
        Ok(values)
    }
}

/// In-memory [`DocumentStore`].
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: RwLock<Vec<DocumentRecord>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        Ok(self.docs.read().clone())
    }

    async fn store_document(&self, doc: &DocumentRecord) -> Result<()> {
        let mut docs = self.docs.write();
        docs.retain(|d| d.id != doc.id);
        docs.push(doc.clone());
        Ok(())
    }
}
