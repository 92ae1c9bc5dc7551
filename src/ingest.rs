//! Background document ingestion.
//!
//! Each [`IngestionRegistry::start`] call spawns one tokio task that owns
//! its job: it reads, extracts and stores every file, publishing the stored
//! documents to the search index once all files are resolved. Only that
//! task writes the job; pollers read a cloned snapshot.
//!
//! A file that cannot be read, parsed or stored marks its own outcome as
//! failed. The job fails only when no file could be ingested.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use askdb_core::engine::QueryEngine;
use askdb_core::models::DocumentRecord;
use askdb_core::{Error, Result};

use crate::extract;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Ingested,
    Failed,
}

/// Outcome of one file within a job.
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path: String,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionJob {
    pub job_id: String,
    pub status: JobStatus,
    pub total_files: usize,
    pub processed_files: usize,
    /// Percentage of files resolved, 0 to 100.
    pub progress: f64,
    pub files: Vec<FileOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl IngestionJob {
    fn new(paths: &[PathBuf]) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            status: JobStatus::Pending,
            total_files: paths.len(),
            processed_files: 0,
            progress: if paths.is_empty() { 100.0 } else { 0.0 },
            files: paths
                .iter()
                .map(|p| FileOutcome {
                    path: p.display().to_string(),
                    status: FileStatus::Pending,
                    document_id: None,
                    format: None,
                    error: None,
                })
                .collect(),
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }
}

type JobSlot = Arc<RwLock<IngestionJob>>;

/// All jobs started by this process, keyed by job id.
#[derive(Default)]
pub struct IngestionRegistry {
    jobs: RwLock<HashMap<String, JobSlot>>,
}

impl IngestionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job for `paths` and start processing it in the background.
    /// Must be called from within a tokio runtime.
    pub fn start(&self, engine: Arc<QueryEngine>, paths: Vec<PathBuf>) -> String {
        let job = IngestionJob::new(&paths);
        let job_id = job.job_id.clone();
        let slot: JobSlot = Arc::new(RwLock::new(job));
        self.jobs.write().insert(job_id.clone(), slot.clone());

        info!(job_id = %job_id, files = paths.len(), "ingestion job started");
        tokio::spawn(run_job(engine, slot, paths));
        job_id
    }

    /// A snapshot of the job's current state.
    pub fn status(&self, job_id: &str) -> Result<IngestionJob> {
        self.jobs
            .read()
            .get(job_id)
            .map(|slot| slot.read().clone())
            .ok_or_else(|| Error::NotFound(format!("no ingestion job with id {}", job_id)))
    }

    /// Poll until the job reaches a terminal state.
    pub async fn wait(&self, job_id: &str) -> Result<IngestionJob> {
        loop {
            let job = self.status(job_id)?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

async fn run_job(engine: Arc<QueryEngine>, slot: JobSlot, paths: Vec<PathBuf>) {
    let job_id = {
        let mut job = slot.write();
        job.status = JobStatus::Running;
        job.job_id.clone()
    };

    let mut stored = Vec::new();
    for (i, path) in paths.iter().enumerate() {
        let outcome = match ingest_file(&engine, path).await {
            Ok(doc) => {
                let outcome = FileOutcome {
                    path: path.display().to_string(),
                    status: FileStatus::Ingested,
                    document_id: Some(doc.id.clone()),
                    format: Some(doc.format.as_str().to_string()),
                    error: None,
                };
                stored.push(doc);
                outcome
            }
            Err(e) => {
                warn!(job_id = %job_id, path = %path.display(), error = %e, "file not ingested");
                FileOutcome {
                    path: path.display().to_string(),
                    status: FileStatus::Failed,
                    document_id: None,
                    format: None,
                    error: Some(e.to_string()),
                }
            }
        };

        let mut job = slot.write();
        job.files[i] = outcome;
        job.processed_files = i + 1;
        job.progress = (i + 1) as f64 * 100.0 / paths.len() as f64;
    }

    engine.publish_documents(&stored);

    let mut job = slot.write();
    job.finished_at = Some(Utc::now());
    if !paths.is_empty() && stored.is_empty() {
        job.status = JobStatus::Failed;
        job.error = Some("no file could be ingested".to_string());
    } else {
        job.status = JobStatus::Completed;
    }
    info!(
        job_id = %job_id,
        ingested = stored.len(),
        failed = paths.len() - stored.len(),
        "ingestion job finished"
    );
}

async fn ingest_file(engine: &QueryEngine, path: &Path) -> Result<DocumentRecord> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Error::ingestion(&filename, e.to_string()))?;

    let id = document_id(&filename, &bytes);

    // PDF parsing is CPU-bound.
    let name = filename.clone();
    let (format, text) = tokio::task::spawn_blocking(move || extract::extract(&name, &bytes))
        .await
        .map_err(|e| Error::ingestion(&filename, e.to_string()))?
        .map_err(|e| Error::ingestion(&filename, e.to_string()))?;

    let doc = DocumentRecord {
        id,
        filename: filename.clone(),
        format,
        text,
        ingested_at: Utc::now(),
    };
    engine
        .store_document(&doc)
        .await
        .map_err(|e| Error::ingestion(&filename, e.to_string()))?;
    Ok(doc)
}

/// Content-derived id, so re-ingesting an unchanged file replaces it.
fn document_id(filename: &str, bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(filename.as_bytes());
    hasher.update([0u8]);
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use askdb_core::engine::EngineConfig;
    use askdb_core::store::memory::MemoryDocumentStore;
    use tempfile::TempDir;

    fn engine() -> Arc<QueryEngine> {
        Arc::new(QueryEngine::new(
            Arc::new(MemoryDocumentStore::new()),
            EngineConfig::default(),
        ))
    }

    #[tokio::test]
    async fn bad_files_fail_alone() {
        let tmp = TempDir::new().unwrap();
        let good = tmp.path().join("resume.txt");
        std::fs::write(&good, "Python and Kubernetes").unwrap();
        let bad = tmp.path().join("photo.png");
        std::fs::write(&bad, b"\x89PNG").unwrap();
        let missing = tmp.path().join("gone.txt");

        let engine = engine();
        let registry = IngestionRegistry::new();
        let id = registry.start(engine.clone(), vec![good, bad, missing]);
        let job = registry.wait(&id).await.unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.processed_files, 3);
        assert_eq!(job.progress, 100.0);
        let statuses: Vec<FileStatus> = job.files.iter().map(|f| f.status).collect();
        assert_eq!(
            statuses,
            vec![FileStatus::Ingested, FileStatus::Failed, FileStatus::Failed]
        );
        assert!(job.files[1].error.as_deref().unwrap().contains("photo.png"));
        assert_eq!(engine.document_count(), 1);
    }

    #[tokio::test]
    async fn job_fails_when_nothing_is_ingested() {
        let tmp = TempDir::new().unwrap();
        let bad = tmp.path().join("a.xyz");
        std::fs::write(&bad, "x").unwrap();

        let registry = IngestionRegistry::new();
        let id = registry.start(engine(), vec![bad]);
        let job = registry.wait(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.finished_at.is_some());
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let registry = IngestionRegistry::new();
        assert!(matches!(registry.status("nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn document_ids_are_content_derived() {
        assert_eq!(document_id("a.txt", b"x"), document_id("a.txt", b"x"));
        assert_ne!(document_id("a.txt", b"x"), document_id("a.txt", b"y"));
        assert_eq!(document_id("a.txt", b"x").len(), 32);
    }
}
