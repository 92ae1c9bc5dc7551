//! Query history and counters.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::classify::QueryClass;

/// One executed query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: f64,
    pub source: Option<QueryClass>,
    pub from_cache: bool,
    pub row_count: usize,
    /// Failure message for queries that returned an error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Counters at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub queries_served: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub average_latency_ms: f64,
    pub failed_queries: u64,
    pub sql_executions: u64,
}

/// Thread-safe sink for history and counters. History keeps the newest
/// `capacity` entries.
#[derive(Debug)]
pub struct Metrics {
    history: Mutex<VecDeque<HistoryEntry>>,
    capacity: usize,
    served: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    failures: AtomicU64,
    executions: AtomicU64,
    /// Total latency in microseconds.
    latency_us: AtomicU64,
}

impl Metrics {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            served: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            executions: AtomicU64::new(0),
            latency_us: AtomicU64::new(0),
        }
    }

    pub fn record_cache_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// A statement was sent to the data source.
    pub fn record_execution(&self) {
        self.executions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished query, successful or not.
    pub fn record(&self, entry: HistoryEntry) {
        if entry.error.is_some() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        } else {
            self.served.fetch_add(1, Ordering::Relaxed);
            self.latency_us
                .fetch_add((entry.duration_ms * 1000.0) as u64, Ordering::Relaxed);
        }
        if self.capacity == 0 {
            return;
        }
        let mut history = self.history.lock();
        while history.len() >= self.capacity {
            history.pop_front();
        }
        history.push_back(entry);
    }

    /// The most recent `limit` entries, oldest first.
    pub fn history(&self, limit: usize) -> Vec<HistoryEntry> {
        let history = self.history.lock();
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let served = self.served.load(Ordering::Relaxed);
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let latency_us = self.latency_us.load(Ordering::Relaxed);
        MetricsSnapshot {
            queries_served: served,
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            average_latency_ms: if served == 0 {
                0.0
            } else {
                latency_us as f64 / served as f64 / 1000.0
            },
            failed_queries: self.failures.load(Ordering::Relaxed),
            sql_executions: self.executions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(query: &str, ms: f64) -> HistoryEntry {
        HistoryEntry {
            query: query.into(),
            timestamp: Utc::now(),
            duration_ms: ms,
            source: Some(QueryClass::Structured),
            from_cache: false,
            row_count: 0,
            error: None,
        }
    }

    #[test]
    fn history_is_bounded_and_ordered() {
        let metrics = Metrics::new(3);
        for i in 0..5 {
            metrics.record(entry(&format!("q{i}"), 1.0));
        }
        let queries: Vec<String> = metrics.history(10).into_iter().map(|e| e.query).collect();
        assert_eq!(queries, vec!["q2", "q3", "q4"]);
        let last: Vec<String> = metrics.history(1).into_iter().map(|e| e.query).collect();
        assert_eq!(last, vec!["q4"]);
    }

    #[test]
    fn snapshot_rates_and_latency() {
        let metrics = Metrics::new(10);
        metrics.record_cache_miss();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record(entry("a", 10.0));
        metrics.record(entry("b", 30.0));
        let mut failed = entry("c", 5.0);
        failed.error = Some("boom".into());
        metrics.record(failed);

        let snap = metrics.snapshot();
        assert_eq!(snap.queries_served, 2);
        assert_eq!(snap.failed_queries, 1);
        assert!((snap.cache_hit_rate - 0.75).abs() < 1e-9);
        assert!((snap.average_latency_ms - 20.0).abs() < 1e-6);
    }

    #[test]
    fn empty_metrics_are_zero() {
        let snap = Metrics::new(1).snapshot();
        assert_eq!(snap.cache_hit_rate, 0.0);
        assert_eq!(snap.average_latency_ms, 0.0);
    }
}
