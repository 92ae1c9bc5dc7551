//! Error taxonomy for the query engine.
//!
//! Translator and classifier failures are deterministic and never retried.
//! Connection failures may be retried by the caller with a fresh connection
//! string. Cache faults never reach the caller: the engine logs them and
//! falls through to live execution.

/// The result type used throughout askdb core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the query engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The data source could not be reached.
    #[error("connection error: {message}")]
    Connection { message: String },

    /// Schema metadata could not be read.
    #[error("introspection error: {message}")]
    Introspection { message: String },

    /// No table or column in the discovered schema matches the query.
    #[error("unsupported query '{query}': {reason}")]
    UnsupportedQuery { query: String, reason: String },

    /// Executing the translated query failed.
    #[error("query '{query}' failed: {source}")]
    QueryExecution {
        query: String,
        #[source]
        source: Box<Error>,
    },

    /// The data source rejected a generated statement.
    #[error("SQL execution failed: {message}")]
    Sql { message: String },

    /// A single file could not be ingested.
    #[error("ingestion of '{filename}' failed: {message}")]
    Ingestion { filename: String, message: String },

    /// The result cache malfunctioned. Never surfaced by the engine.
    #[error("cache error: {message}")]
    Cache { message: String },

    /// The document store could not be read or written.
    #[error("document store error: {message}")]
    DocumentStore { message: String },

    /// A result could not be serialized for download.
    #[error("export failed: {message}")]
    Export { message: String },

    /// Caller-supplied input was rejected before execution.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A looked-up resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    pub fn connection(message: impl Into<String>) -> Self {
        Error::Connection {
            message: message.into(),
        }
    }

    pub fn introspection(message: impl Into<String>) -> Self {
        Error::Introspection {
            message: message.into(),
        }
    }

    pub fn unsupported(query: &str, reason: impl Into<String>) -> Self {
        Error::UnsupportedQuery {
            query: query.to_string(),
            reason: reason.into(),
        }
    }

    pub fn sql(message: impl Into<String>) -> Self {
        Error::Sql {
            message: message.into(),
        }
    }

    pub fn ingestion(filename: &str, message: impl Into<String>) -> Self {
        Error::Ingestion {
            filename: filename.to_string(),
            message: message.into(),
        }
    }

    pub fn document_store(message: impl Into<String>) -> Self {
        Error::DocumentStore {
            message: message.into(),
        }
    }

    /// Wrap a lower-level failure as a [`Error::QueryExecution`] for `query`.
    ///
    /// Errors that are already query-execution errors are passed through
    /// unchanged, as are caller input errors.
    pub fn into_query_error(self, query: &str) -> Self {
        match self {
            e @ (Error::QueryExecution { .. } | Error::InvalidInput(_)) => e,
            other => Error::QueryExecution {
                query: query.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Machine-readable code used by the HTTP surface.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Connection { .. } => "connection_error",
            Error::Introspection { .. } => "introspection_error",
            Error::UnsupportedQuery { .. } => "unsupported_query",
            Error::QueryExecution { source, .. } => match source.as_ref() {
                Error::UnsupportedQuery { .. } => "unsupported_query",
                Error::Connection { .. } => "connection_error",
                _ => "query_execution_error",
            },
            Error::Sql { .. } => "query_execution_error",
            Error::Ingestion { .. } => "ingestion_error",
            Error::Cache { .. } => "cache_error",
            Error::DocumentStore { .. } => "document_store_error",
            Error::Export { .. } => "export_error",
            Error::InvalidInput(_) => "bad_request",
            Error::NotFound(_) => "not_found",
        }
    }
}
