//! The application service shared by the CLI and the HTTP server.
//!
//! [`AskDb`] owns the query engine, the document store and the ingestion
//! registry, and knows how to turn a connection string into a live SQLite
//! data source.

use anyhow::Context;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use askdb_core::engine::{EngineMetrics, QueryEngine, ResultPage};
use askdb_core::export::{export, ExportFormat};
use askdb_core::metrics::HistoryEntry;
use askdb_core::models::{SchemaGraph, SchemaSummary};
use askdb_core::{Error, Result};

use crate::config::Config;
use crate::db;
use crate::doc_store::SqliteDocumentStore;
use crate::ingest::{IngestionJob, IngestionRegistry};
use crate::sqlite_source::SqliteSource;

/// The discovered schema plus the size of the document corpus.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaView {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaGraph>,
    pub documents: usize,
}

pub struct AskDb {
    config: Config,
    engine: Arc<QueryEngine>,
    jobs: IngestionRegistry,
}

impl AskDb {
    /// Open the document store, build the search index from it, and connect
    /// to `[database].url` when one is configured.
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        let pool = db::connect_documents(&config).await?;
        let engine = Arc::new(QueryEngine::new(
            Arc::new(SqliteDocumentStore::new(pool)),
            config.engine_config(),
        ));
        engine
            .load_documents()
            .await
            .context("Failed to load documents")?;

        let service = Self {
            config,
            engine,
            jobs: IngestionRegistry::new(),
        };
        if let Some(url) = service.config.database.url.clone() {
            service
                .connect(&url)
                .await
                .with_context(|| format!("Failed to connect to {}", url))?;
        }
        Ok(service)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &Arc<QueryEngine> {
        &self.engine
    }

    /// Connect to the SQLite database at `url` and discover its schema.
    pub async fn connect(&self, url: &str) -> Result<SchemaSummary> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::InvalidInput("connection string must not be empty".into()));
        }
        let pool = db::connect_data_source(url, &self.config.database)
            .await
            .map_err(|e| Error::connection(format!("{:#}", e)))?;
        let source = SqliteSource::new(pool);
        let summary = self.engine.connect(Arc::new(source.clone()), &source).await?;
        info!(url, "connected");
        Ok(summary)
    }

    pub fn schema(&self) -> SchemaView {
        let schema = self.engine.schema();
        SchemaView {
            connected: schema.is_some(),
            schema: schema.map(|s| s.as_ref().clone()),
            documents: self.engine.document_count(),
        }
    }

    /// Start ingesting `paths` in the background and return the job id.
    pub fn ingest(&self, paths: Vec<PathBuf>) -> Result<String> {
        if paths.is_empty() {
            return Err(Error::InvalidInput("no files to ingest".into()));
        }
        Ok(self.jobs.start(self.engine.clone(), paths))
    }

    pub fn ingestion_status(&self, job_id: &str) -> Result<IngestionJob> {
        self.jobs.status(job_id)
    }

    pub async fn wait_for_ingestion(&self, job_id: &str) -> Result<IngestionJob> {
        self.jobs.wait(job_id).await
    }

    /// Answer `text`. Page defaults to 1 and page size to
    /// `[query].default_page_size`.
    pub async fn query(
        &self,
        text: &str,
        page: Option<usize>,
        page_size: Option<usize>,
        use_cache: bool,
    ) -> Result<ResultPage> {
        let page = page.unwrap_or(1);
        let page_size = page_size.unwrap_or(self.config.query.default_page_size);
        self.engine.execute(text, page, page_size, use_cache).await
    }

    pub fn history(&self, limit: Option<usize>) -> Vec<HistoryEntry> {
        self.engine
            .history(limit.unwrap_or(self.config.query.history_size))
    }

    pub fn metrics(&self) -> EngineMetrics {
        self.engine.metrics()
    }

    /// The full structured result of `text` rendered in `format`.
    pub async fn export(&self, text: &str, format: ExportFormat) -> Result<Vec<u8>> {
        let result = self.engine.full_result(text).await?;
        export(&result, format)
    }
}
