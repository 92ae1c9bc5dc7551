//! SQLite-backed [`DocumentStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use askdb_core::models::{DocumentFormat, DocumentRecord};
use askdb_core::store::DocumentStore;
use askdb_core::{Error, Result};

pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn store_error(e: impl std::fmt::Display) -> Error {
    Error::document_store(e.to_string())
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query(
            "SELECT id, filename, format, text, ingested_at FROM documents \
             ORDER BY ingested_at, id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter()
            .map(|row| {
                let format: String = row.try_get("format").map_err(store_error)?;
                let ingested_at: String = row.try_get("ingested_at").map_err(store_error)?;
                Ok(DocumentRecord {
                    id: row.try_get("id").map_err(store_error)?,
                    filename: row.try_get("filename").map_err(store_error)?,
                    format: DocumentFormat::parse(&format)
                        .ok_or_else(|| store_error(format!("unknown format '{}'", format)))?,
                    text: row.try_get("text").map_err(store_error)?,
                    ingested_at: DateTime::parse_from_rfc3339(&ingested_at)
                        .map_err(store_error)?
                        .with_timezone(&Utc),
                })
            })
            .collect()
    }

    async fn store_document(&self, doc: &DocumentRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO documents (id, filename, format, text, ingested_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
             filename = excluded.filename, format = excluded.format, \
             text = excluded.text, ingested_at = excluded.ingested_at",
        )
        .bind(&doc.id)
        .bind(&doc.filename)
        .bind(doc.format.as_str())
        .bind(&doc.text)
        .bind(doc.ingested_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    use crate::config::parse_config;
    use crate::db;

    async fn store(tmp: &TempDir) -> SqliteDocumentStore {
        let toml = format!(
            "[documents]\npath = \"{}\"\n",
            tmp.path().join("docs.db").display()
        );
        let config = parse_config(&toml).unwrap();
        SqliteDocumentStore::new(db::connect_documents(&config).await.unwrap())
    }

    fn doc(id: &str, text: &str) -> DocumentRecord {
        DocumentRecord {
            id: id.into(),
            filename: format!("{id}.txt"),
            format: DocumentFormat::Txt,
            text: text.into(),
            ingested_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn stores_and_lists_documents() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        store.store_document(&doc("a", "first")).await.unwrap();
        store.store_document(&doc("b", "second")).await.unwrap();
        store.store_document(&doc("a", "replaced")).await.unwrap();

        let docs = store.list_documents().await.unwrap();
        assert_eq!(docs.len(), 2);
        let a = docs.iter().find(|d| d.id == "a").unwrap();
        assert_eq!(a.text, "replaced");
        assert_eq!(a.format, DocumentFormat::Txt);
    }

    #[tokio::test]
    async fn missing_table_is_a_store_error() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let err = SqliteDocumentStore::new(pool).list_documents().await.unwrap_err();
        assert!(matches!(err, Error::DocumentStore { .. }));
    }
}
