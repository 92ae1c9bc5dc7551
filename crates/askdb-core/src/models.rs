//! Core data models used throughout askdb.
//!
//! These types describe the discovered schema, ingested documents, the
//! intermediate query plan, and the rows that flow back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Schema ─────────────────────────────────────────────────────────

/// Inferred purpose of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticRole {
    Identifier,
    Name,
    Categorical,
    NumericMeasure,
    Date,
    FreeText,
    Unknown,
}

/// A single column and what discovery concluded about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub table: String,
    pub name: String,
    pub role: SemanticRole,
    /// Declared type as reported by the data source (may be empty).
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    /// Distinct values of low-cardinality name and categorical columns,
    /// sorted. Empty for others.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_values: Vec<String>,
}

/// A table with its profiled columns, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableProfile {
    pub name: String,
    pub columns: Vec<ColumnProfile>,
}

impl TableProfile {
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn columns_with_role(&self, role: SemanticRole) -> impl Iterator<Item = &ColumnProfile> {
        self.columns.iter().filter(move |c| c.role == role)
    }

    /// The primary key, else a column named `id`, else the first identifier.
    pub fn primary_identifier(&self) -> Option<&ColumnProfile> {
        self.columns
            .iter()
            .find(|c| c.primary_key)
            .or_else(|| self.column("id"))
            .or_else(|| self.columns_with_role(SemanticRole::Identifier).next())
    }

    /// The column used to label rows of this table (a name column, else
    /// the first categorical one).
    pub fn label_column(&self) -> Option<&ColumnProfile> {
        self.columns_with_role(SemanticRole::Name)
            .next()
            .or_else(|| self.columns_with_role(SemanticRole::Categorical).next())
    }
}

/// How a relationship edge was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipOrigin {
    /// Declared as a foreign key by the data source.
    Declared,
    /// Inferred from a `<table>_id` naming convention.
    Inferred,
}

/// A foreign-key edge between two columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub origin: RelationshipOrigin,
}

/// The semantic model of a connected data source.
///
/// Built once per connection by [`crate::schema::discover`] and read-only
/// afterwards; the engine swaps whole graphs on reconnect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaGraph {
    pub tables: Vec<TableProfile>,
    pub relationships: Vec<Relationship>,
}

impl SchemaGraph {
    pub fn table(&self, name: &str) -> Option<&TableProfile> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn column_count(&self) -> usize {
        self.tables.iter().map(|t| t.columns.len()).sum()
    }

    /// Edges leaving `table`.
    pub fn relationships_from<'a>(
        &'a self,
        table: &'a str,
    ) -> impl Iterator<Item = &'a Relationship> + 'a {
        self.relationships
            .iter()
            .filter(move |r| r.from_table.eq_ignore_ascii_case(table))
    }

    pub fn summary(&self) -> SchemaSummary {
        SchemaSummary {
            tables: self
                .tables
                .iter()
                .map(|t| TableSummary {
                    name: t.name.clone(),
                    columns: t.columns.len(),
                })
                .collect(),
            total_tables: self.tables.len(),
            total_columns: self.column_count(),
            relationships: self.relationships.len(),
        }
    }
}

/// Compact description returned from `connect`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaSummary {
    pub tables: Vec<TableSummary>,
    pub total_tables: usize,
    pub total_columns: usize,
    pub relationships: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub columns: usize,
}

// ─── Documents ──────────────────────────────────────────────────────

/// Supported document formats, detected from the filename extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Txt,
    Csv,
}

impl DocumentFormat {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = filename.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "docx" => Some(DocumentFormat::Docx),
            "txt" => Some(DocumentFormat::Txt),
            "csv" => Some(DocumentFormat::Csv),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Txt => "txt",
            DocumentFormat::Csv => "csv",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::from_filename(&format!("x.{}", s))
    }
}

/// An ingested document. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub filename: String,
    pub format: DocumentFormat,
    pub text: String,
    pub ingested_at: DateTime<Utc>,
}

// ─── Query plans ────────────────────────────────────────────────────

/// A literal bound into a generated statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            SqlValue::Null => serde_json::Value::Null,
            SqlValue::Integer(i) => serde_json::Value::from(*i),
            SqlValue::Real(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            SqlValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

/// A schema-qualified column reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: &str, column: &str) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Calendar year of a date column equals the value.
    YearEq,
}

/// A `column <op> ?` filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub column: ColumnRef,
    pub op: Operator,
    pub value: SqlValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateFn {
    Count,
    Avg,
    Sum,
    Min,
    Max,
}

impl AggregateFn {
    pub fn sql_name(&self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Avg => "AVG",
            AggregateFn::Sum => "SUM",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
        }
    }

    fn alias_prefix(&self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::Avg => "average",
            AggregateFn::Sum => "total",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
        }
    }
}

/// An aggregate over `column`, or over all rows when `column` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub func: AggregateFn,
    pub column: Option<ColumnRef>,
}

impl Aggregate {
    /// Output column name, e.g. `average_salary` or `count`.
    pub fn alias(&self) -> String {
        match &self.column {
            Some(c) => format!("{}_{}", self.func.alias_prefix(), c.column),
            None => self.func.alias_prefix().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderTarget {
    Column(ColumnRef),
    /// Order by the plan's aggregate value.
    Aggregate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub target: OrderTarget,
    pub direction: SortDirection,
}

/// `LEFT JOIN <table> ON <from> = <to>`, following a relationship edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    pub table: String,
    pub from: ColumnRef,
    pub to: ColumnRef,
}

/// Grouping column and the name it is reported under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBy {
    pub column: ColumnRef,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    Count,
    Aggregate,
    List,
    TopN,
    DocumentSearch,
    Hybrid,
}

/// The parsed intent of a structured query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub kind: PlanKind,
    pub table: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joins: Vec<Join>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Predicate>,
    pub aggregate: Option<Aggregate>,
    pub group_by: Option<GroupBy>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
}

impl QueryPlan {
    /// A bare `SELECT` over `table` with nothing else resolved yet.
    pub fn list(table: &str) -> Self {
        Self {
            kind: PlanKind::List,
            table: table.to_string(),
            joins: Vec::new(),
            filters: Vec::new(),
            aggregate: None,
            group_by: None,
            order_by: None,
            limit: None,
        }
    }
}

// ─── Results ────────────────────────────────────────────────────────

/// Rows returned by a [`crate::store::SqlExecutor`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

/// A document ranked by the TF-IDF index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentHit {
    pub document_id: String,
    pub filename: String,
    pub format: DocumentFormat,
    pub score: f64,
    pub snippet: String,
    pub ingested_at: DateTime<Utc>,
}

/// One row of a query result, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ResultRow {
    Structured {
        values: serde_json::Map<String, serde_json::Value>,
    },
    Document(DocumentHit),
}

impl ResultRow {
    pub fn from_sql_row(columns: &[String], row: &[SqlValue]) -> Self {
        let values = columns
            .iter()
            .cloned()
            .zip(row.iter().map(SqlValue::to_json))
            .collect();
        ResultRow::Structured { values }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, ResultRow::Structured { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_detection_is_case_insensitive() {
        assert_eq!(
            DocumentFormat::from_filename("Resume_Jane.PDF"),
            Some(DocumentFormat::Pdf)
        );
        assert_eq!(
            DocumentFormat::from_filename("notes.txt"),
            Some(DocumentFormat::Txt)
        );
        assert_eq!(DocumentFormat::from_filename("archive.tar.gz"), None);
        assert_eq!(DocumentFormat::from_filename("README"), None);
    }

    #[test]
    fn aggregate_alias_names_the_column() {
        let agg = Aggregate {
            func: AggregateFn::Avg,
            column: Some(ColumnRef::new("employees", "salary")),
        };
        assert_eq!(agg.alias(), "average_salary");
        let count = Aggregate {
            func: AggregateFn::Count,
            column: None,
        };
        assert_eq!(count.alias(), "count");
    }

    #[test]
    fn structured_rows_keep_column_order() {
        let row = ResultRow::from_sql_row(
            &["name".to_string(), "salary".to_string()],
            &[SqlValue::Text("Ada".into()), SqlValue::Integer(100)],
        );
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(
            json,
            r#"{"source":"structured","values":{"name":"Ada","salary":100}}"#
        );
    }
}
