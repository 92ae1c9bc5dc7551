//! The query orchestrator.
//!
//! [`QueryEngine`] ties the classifier, translator, TF-IDF index, result
//! cache and metrics sink into one request/response cycle:
//!
//! ```text
//! normalize ─▶ cache lookup ─┬─ hit ───────────────────────────────┐
//!                            └─ miss ─▶ classify ─┬─ structured ─┐  │
//!                                                 ├─ document ───┤  ├─▶ paginate
//!                                                 └─ hybrid ─────┴─▶ cache full result
//! ```
//!
//! The full, unpaginated result is cached under the normalized query text,
//! so turning pages never recomputes. The connected data source (executor,
//! schema graph, classifier) is one `Arc` swapped atomically on reconnect;
//! a request clones it once and works against that snapshot throughout.
//!
//! Reconnects and document publishes bump a generation counter after
//! swapping their snapshot. A result computed under an older generation is
//! returned to its caller but never cached.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::ResultCache;
use crate::classify::{Classifier, QueryClass};
use crate::error::{Error, Result};
use crate::metrics::{HistoryEntry, Metrics, MetricsSnapshot};
use crate::models::{DocumentRecord, QueryPlan, ResultRow, SchemaGraph, SchemaSummary};
use crate::schema;
use crate::sql;
use crate::store::{DocumentStore, Introspector, SqlExecutor};
use crate::text::normalize_query;
use crate::tfidf::{query_terms, DocumentIndex};
use crate::translate::{TranslateOptions, Translator};

/// Column names reported for document rows.
pub const DOCUMENT_COLUMNS: &[&str] = &[
    "document_id",
    "filename",
    "format",
    "score",
    "snippet",
    "ingested_at",
];

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub history_size: usize,
    /// Maximum document hits per query.
    pub document_top_k: usize,
    pub translate: TranslateOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 1000,
            default_page_size: 25,
            max_page_size: 1000,
            history_size: 100,
            document_top_k: 100,
            translate: TranslateOptions::default(),
        }
    }
}

/// A connected data source and everything derived from its schema.
struct DataSource {
    executor: Arc<dyn SqlExecutor>,
    schema: Arc<SchemaGraph>,
    classifier: Classifier,
}

/// A complete query result as stored in the cache.
#[derive(Debug, Clone)]
pub struct FullResult {
    pub source: QueryClass,
    pub columns: Vec<String>,
    pub rows: Vec<ResultRow>,
    /// Rendered SQL for structured and hybrid queries.
    pub sql: Option<String>,
    pub plan: Option<QueryPlan>,
}

impl FullResult {
    /// Structured rows only, in their original order.
    pub fn structured_rows(&self) -> impl Iterator<Item = &ResultRow> {
        self.rows.iter().filter(|r| r.is_structured())
    }
}

/// One page of a query result.
#[derive(Debug, Clone, Serialize)]
pub struct ResultPage {
    pub rows: Vec<ResultRow>,
    pub columns: Vec<String>,
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub source: QueryClass,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<QueryPlan>,
    pub duration_ms: f64,
}

/// Engine-wide counters for the metrics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EngineMetrics {
    #[serde(flatten)]
    pub counters: MetricsSnapshot,
    pub cached_entries: usize,
    pub schema_tables: usize,
    pub schema_columns: usize,
    pub indexed_documents: usize,
}

pub struct QueryEngine {
    source: RwLock<Option<Arc<DataSource>>>,
    documents: Arc<dyn DocumentStore>,
    index: DocumentIndex,
    cache: ResultCache<Arc<FullResult>>,
    /// Bumped together with `invalidate_all`; held for reading across the
    /// staleness check and the cache insert.
    generation: RwLock<u64>,
    metrics: Metrics,
    config: EngineConfig,
}

impl QueryEngine {
    pub fn new(documents: Arc<dyn DocumentStore>, config: EngineConfig) -> Self {
        Self {
            source: RwLock::new(None),
            documents,
            index: DocumentIndex::new(),
            cache: ResultCache::new(config.cache_capacity, config.cache_ttl),
            generation: RwLock::new(0),
            metrics: Metrics::new(config.history_size),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Discover the schema behind `introspector` and make `executor` the
    /// live data source. The previous source stays in service until the
    /// new schema is fully built.
    pub async fn connect(
        &self,
        executor: Arc<dyn SqlExecutor>,
        introspector: &dyn Introspector,
    ) -> Result<SchemaSummary> {
        let schema = schema::discover(introspector).await?;
        let summary = schema.summary();
        let classifier = Classifier::with_schema(&schema);
        let next = Arc::new(DataSource {
            executor,
            schema: Arc::new(schema),
            classifier,
        });
        *self.source.write() = Some(next);
        self.invalidate();
        info!(
            tables = summary.total_tables,
            columns = summary.total_columns,
            "data source connected"
        );
        Ok(summary)
    }

    pub fn is_connected(&self) -> bool {
        self.source.read().is_some()
    }

    /// The current schema snapshot, if a data source is connected.
    pub fn schema(&self) -> Option<Arc<SchemaGraph>> {
        self.source.read().as_ref().map(|s| s.schema.clone())
    }

    /// Rebuild the document index from the document store.
    pub async fn load_documents(&self) -> Result<usize> {
        let docs = self.documents.list_documents().await?;
        self.index.rebuild(&docs);
        self.invalidate();
        info!(documents = docs.len(), "document index built");
        Ok(docs.len())
    }

    /// Persist one document. It becomes searchable once published.
    pub async fn store_document(&self, doc: &DocumentRecord) -> Result<()> {
        self.documents.store_document(doc).await
    }

    /// Make stored documents searchable and drop cached results that
    /// predate them.
    pub fn publish_documents(&self, docs: &[DocumentRecord]) {
        if docs.is_empty() {
            return;
        }
        self.index.merge(docs);
        self.invalidate();
        debug!(documents = docs.len(), "documents published to index");
    }

    pub fn document_count(&self) -> usize {
        self.index.len()
    }

    /// Answer `text`, returning page `page` (1-based) of `page_size` rows.
    ///
    /// Every call is recorded in the history, failures included.
    pub async fn execute(
        &self,
        text: &str,
        page: usize,
        page_size: usize,
        use_cache: bool,
    ) -> Result<ResultPage> {
        let started = Instant::now();
        let outcome = match self.check_paging(page, page_size) {
            Ok(()) => self.resolve(text, use_cache).await,
            Err(e) => Err(e),
        };
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        let mut entry = HistoryEntry {
            query: text.to_string(),
            timestamp: Utc::now(),
            duration_ms,
            source: None,
            from_cache: false,
            row_count: 0,
            error: None,
        };
        match outcome {
            Ok((result, from_cache)) => {
                entry.source = Some(result.source);
                entry.from_cache = from_cache;
                entry.row_count = result.rows.len();
                self.metrics.record(entry);
                info!(
                    query = text,
                    source = result.source.as_str(),
                    rows = result.rows.len(),
                    from_cache,
                    duration_ms,
                    "query completed"
                );
                Ok(paginate(&result, page, page_size, from_cache, duration_ms))
            }
            Err(e) => {
                entry.error = Some(e.to_string());
                self.metrics.record(entry);
                warn!(query = text, error = %e, "query failed");
                Err(e)
            }
        }
    }

    /// The complete result for `text`, served from the cache when possible.
    pub async fn full_result(&self, text: &str) -> Result<Arc<FullResult>> {
        self.resolve(text, true).await.map(|(r, _)| r)
    }

    pub fn history(&self, limit: usize) -> Vec<HistoryEntry> {
        self.metrics.history(limit)
    }

    pub fn metrics(&self) -> EngineMetrics {
        let schema = self.schema();
        EngineMetrics {
            counters: self.metrics.snapshot(),
            cached_entries: self.cache.len(),
            schema_tables: schema.as_ref().map_or(0, |s| s.tables.len()),
            schema_columns: schema.as_ref().map_or(0, |s| s.column_count()),
            indexed_documents: self.index.len(),
        }
    }

    /// Drop every cached result and fence off in-flight computations that
    /// started before the current snapshot was installed.
    fn invalidate(&self) {
        let mut generation = self.generation.write();
        *generation += 1;
        self.cache.invalidate_all();
    }

    fn check_paging(&self, page: usize, page_size: usize) -> Result<()> {
        if page == 0 {
            return Err(Error::InvalidInput("page numbers start at 1".into()));
        }
        if page_size == 0 || page_size > self.config.max_page_size {
            return Err(Error::InvalidInput(format!(
                "page size must be between 1 and {}",
                self.config.max_page_size
            )));
        }
        Ok(())
    }

    async fn resolve(&self, text: &str, use_cache: bool) -> Result<(Arc<FullResult>, bool)> {
        let key = normalize_query(text);
        if key.is_empty() {
            return Err(Error::InvalidInput("query must not be empty".into()));
        }

        if use_cache {
            if let Some(hit) = self.cache.get(&key) {
                self.metrics.record_cache_hit();
                debug!(key = %key, "cache hit");
                return Ok((hit, true));
            }
            self.metrics.record_cache_miss();
            debug!(key = %key, "cache miss");
        }

        let started_at = *self.generation.read();
        let result = Arc::new(self.compute(text).await.map_err(|e| e.into_query_error(text))?);

        if use_cache {
            let generation = self.generation.read();
            if *generation != started_at {
                debug!(key = %key, "snapshot changed during query; result not cached");
            } else if let Err(e) = self.cache.put(&key, result.clone()) {
                warn!(error = %e, "result not cached");
            }
        }
        Ok((result, false))
    }

    async fn compute(&self, text: &str) -> Result<FullResult> {
        let source = self.source.read().clone();
        let class = match &source {
            Some(s) => s.classifier.classify(text),
            None => Classifier::new().classify(text),
        };
        debug!(query = text, class = class.as_str(), "query classified");

        match class {
            QueryClass::Structured => {
                let source = source.ok_or_else(no_source)?;
                let (rows, columns, sql, plan) = self.run_structured(&source, text).await?;
                Ok(FullResult {
                    source: class,
                    columns,
                    rows,
                    sql: Some(sql),
                    plan: Some(plan),
                })
            }
            QueryClass::Document => Ok(FullResult {
                source: class,
                columns: document_columns(),
                rows: self.run_documents(text),
                sql: None,
                plan: None,
            }),
            QueryClass::Hybrid => {
                let structured = match &source {
                    Some(s) => match self.run_structured(s, text).await {
                        Ok(parts) => Some(parts),
                        Err(Error::UnsupportedQuery { reason, .. }) => {
                            debug!(reason, "hybrid query has no structured part");
                            None
                        }
                        Err(e) => return Err(e),
                    },
                    None => None,
                };
                let documents = self.run_documents(text);
                Ok(match structured {
                    Some((rows, columns, sql, plan)) => FullResult {
                        source: class,
                        columns,
                        rows: interleave(rows, documents),
                        sql: Some(sql),
                        plan: Some(plan),
                    },
                    None => FullResult {
                        source: class,
                        columns: document_columns(),
                        rows: documents,
                        sql: None,
                        plan: None,
                    },
                })
            }
        }
    }

    async fn run_structured(
        &self,
        source: &DataSource,
        text: &str,
    ) -> Result<(Vec<ResultRow>, Vec<String>, String, QueryPlan)> {
        let translator = Translator::new(&source.schema, self.config.translate.clone());
        let plan = translator.translate(text)?;
        let statement = sql::render(&plan, &source.schema)?;
        debug!(sql = %statement.sql, params = statement.params.len(), "executing");

        self.metrics.record_execution();
        let result = source
            .executor
            .execute(&statement.sql, &statement.params)
            .await?;
        let rows = result
            .rows
            .iter()
            .map(|r| ResultRow::from_sql_row(&result.columns, r))
            .collect();
        Ok((rows, result.columns, statement.sql, plan))
    }

    fn run_documents(&self, text: &str) -> Vec<ResultRow> {
        let terms = query_terms(text);
        self.index
            .snapshot()
            .hits(&terms, self.config.document_top_k)
            .into_iter()
            .map(ResultRow::Document)
            .collect()
    }
}

fn no_source() -> Error {
    Error::connection("no data source is connected")
}

fn document_columns() -> Vec<String> {
    DOCUMENT_COLUMNS.iter().map(|c| c.to_string()).collect()
}

/// Alternate structured and document rows, structured first, then append
/// whatever remains of the longer list.
pub fn interleave(structured: Vec<ResultRow>, documents: Vec<ResultRow>) -> Vec<ResultRow> {
    let mut out = Vec::with_capacity(structured.len() + documents.len());
    let mut s = structured.into_iter();
    let mut d = documents.into_iter();
    loop {
        match (s.next(), d.next()) {
            (None, None) => break,
            (a, b) => out.extend(a.into_iter().chain(b)),
        }
    }
    out
}

fn paginate(
    result: &FullResult,
    page: usize,
    page_size: usize,
    from_cache: bool,
    duration_ms: f64,
) -> ResultPage {
    let total = result.rows.len();
    let start = (page - 1).saturating_mul(page_size).min(total);
    let end = start.saturating_add(page_size).min(total);
    ResultPage {
        rows: result.rows[start..end].to_vec(),
        columns: result.columns.clone(),
        total_count: total,
        page,
        page_size,
        total_pages: total.div_ceil(page_size),
        source: result.source,
        from_cache,
        sql: result.sql.clone(),
        plan: result.plan.clone(),
        duration_ms,
    }
}
