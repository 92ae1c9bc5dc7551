//! # askdb core
//!
//! The query engine behind askdb: answers plain-English questions over a
//! relational database with a runtime-discovered schema and a corpus of
//! ingested documents.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. The data source
//! and the document store are reached through the traits in [`store`];
//! the native shell supplies SQLite implementations.
//!
//! ## Pipeline
//!
//! ```text
//!            ┌────────────┐
//!  text ────▶│ Classifier │──┬── structured ──▶ Translator ──▶ SqlExecutor ─┐
//!            └────────────┘  │                                               ├─▶ paginate
//!                            ├── document ───▶ TF-IDF index ────────────────┤
//!                            └── hybrid ─────▶ both, interleaved ───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Schema graph, documents, query plans, result rows |
//! | [`schema`] | Schema discovery and semantic role inference |
//! | [`classify`] | Structured / document / hybrid routing |
//! | [`translate`] | Natural language to [`models::QueryPlan`] |
//! | [`sql`] | Rendering a plan to parameterized SQL |
//! | [`tfidf`] | Inverted index with TF-IDF ranking |
//! | [`cache`] | TTL + LRU bounded result cache |
//! | [`metrics`] | Query history and counters |
//! | [`engine`] | The orchestrator tying everything together |
//! | [`export`] | CSV / JSON rendering of structured results |

pub mod cache;
pub mod classify;
pub mod engine;
pub mod error;
pub mod export;
pub mod metrics;
pub mod models;
pub mod schema;
pub mod sql;
pub mod store;
pub mod text;
pub mod tfidf;
pub mod translate;

pub use error::{Error, Result};
