//! # askdb
//!
//! Natural-language questions over a relational database and a corpus of
//! ingested documents.
//!
//! The query engine lives in the `askdb-core` crate. This crate is the
//! native shell around it: configuration, logging, SQLite adapters for the
//! engine's collaborator traits, text extraction, background ingestion, a
//! CLI and a JSON HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌────────────────┐
//! │ CLI / HTTP   │──▶│   AskDb      │──▶│  QueryEngine   │
//! │ main, server │   │  (service)   │   │  (askdb-core)  │
//! └──────────────┘   └──────┬───────┘   └───────┬────────┘
//!                           │                   │
//!                  ┌────────┴───────┐   ┌───────┴────────┐
//!                  │ ingest+extract │   │ SQLite source  │
//!                  │ document store │   │ (sqlx)         │
//!                  └────────────────┘   └────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] | SQLite pools for the data source and the document store |
//! | [`sqlite_source`] | Schema introspection and SQL execution |
//! | [`doc_store`] | Document persistence |
//! | [`extract`] | PDF / DOCX / TXT / CSV text extraction |
//! | [`ingest`] | Background ingestion jobs |
//! | [`service`] | The application service |
//! | [`server`] | HTTP API |

pub mod config;
pub mod db;
pub mod doc_store;
pub mod extract;
pub mod ingest;
pub mod logging;
pub mod server;
pub mod service;
pub mod sqlite_source;
