//! Query routing: structured, document, or hybrid.
//!
//! Classification is a pair of ordered phrase tables. A query that hits
//! phrases from both tables is hybrid; one that hits neither falls back to
//! structured. The function is total and deterministic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::models::SchemaGraph;
use crate::text::{find_phrase, identifier_parts, singular, tokenize, Token};

/// Where a query is answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryClass {
    Structured,
    Document,
    Hybrid,
}

impl QueryClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryClass::Structured => "structured",
            QueryClass::Document => "document",
            QueryClass::Hybrid => "hybrid",
        }
    }
}

/// Phrases that point at the relational data source.
pub const STRUCTURED_PHRASES: &[&str] = &[
    "how many",
    "number of",
    "average",
    "avg",
    "mean",
    "count",
    "sum",
    "total",
    "maximum",
    "minimum",
    "highest",
    "lowest",
    "top",
    "most recent",
    "latest",
    "list",
    "employee",
    "staff",
    "department",
    "salary",
    "paid",
    "hired",
    "hire",
    "group by",
    "per",
];

/// Phrases that point at the document corpus.
pub const DOCUMENT_PHRASES: &[&str] = &[
    "resume",
    "cv",
    "document",
    "file",
    "mentioning",
    "mention",
    "mentions",
    "review",
    "contract",
    "skill",
    "experience",
    "certification",
    "containing",
    "contains",
    "pdf",
];

/// A classifier whose structured vocabulary can be extended with the
/// names found in a discovered schema.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    schema_terms: BTreeSet<String>,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every table name and every column-name part of `schema` as a
    /// structured signal. Generic parts such as `id` or `name` are skipped.
    pub fn with_schema(schema: &SchemaGraph) -> Self {
        let mut schema_terms = BTreeSet::new();
        for table in &schema.tables {
            schema_terms.insert(singular(&table.name));
            for column in &table.columns {
                for part in identifier_parts(&column.name) {
                    if part.len() > 2 && !GENERIC_PARTS.contains(&part.as_str()) {
                        schema_terms.insert(singular(&part));
                    }
                }
            }
        }
        // A schema term that is also a document cue would make every
        // document query hybrid.
        schema_terms.retain(|t| !DOCUMENT_PHRASES.contains(&t.as_str()));
        Self { schema_terms }
    }

    pub fn classify(&self, text: &str) -> QueryClass {
        let tokens = tokenize(text);
        let structured = has_any(&tokens, STRUCTURED_PHRASES)
            || tokens
                .iter()
                .any(|t| self.schema_terms.contains(&singular(&t.lower)));
        let document = has_any(&tokens, DOCUMENT_PHRASES);
        decide(structured, document)
    }
}

const GENERIC_PARTS: &[&str] = &["name", "date", "type", "code", "the", "and", "status"];

fn has_any(tokens: &[Token], phrases: &[&str]) -> bool {
    phrases.iter().any(|p| find_phrase(tokens, p).is_some())
}

fn decide(structured: bool, document: bool) -> QueryClass {
    match (structured, document) {
        (true, true) => QueryClass::Hybrid,
        (false, true) => QueryClass::Document,
        _ => QueryClass::Structured,
    }
}

/// Classify with the built-in vocabulary only.
pub fn classify(text: &str) -> QueryClass {
    Classifier::new().classify(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnProfile, SemanticRole, TableProfile};

    #[test]
    fn resumes_with_average_salary_is_hybrid() {
        assert_eq!(
            classify("resumes of engineers and their average salary"),
            QueryClass::Hybrid
        );
    }

    #[test]
    fn how_many_employees_is_structured() {
        assert_eq!(classify("how many employees"), QueryClass::Structured);
    }

    #[test]
    fn documents_mentioning_is_document() {
        assert_eq!(
            classify("find documents mentioning kubernetes"),
            QueryClass::Document
        );
    }

    #[test]
    fn no_signal_defaults_to_structured() {
        assert_eq!(classify(""), QueryClass::Structured);
        assert_eq!(classify("hello there"), QueryClass::Structured);
    }

    #[test]
    fn every_phrase_fires_on_its_own() {
        for p in STRUCTURED_PHRASES {
            assert_eq!(classify(p), QueryClass::Structured, "{p}");
        }
        for p in DOCUMENT_PHRASES {
            assert_eq!(classify(p), QueryClass::Document, "{p}");
        }
    }

    #[test]
    fn phrases_match_whole_words_only() {
        // "discount" must not trigger "count", "profile" must not trigger "file".
        assert_eq!(classify("discount profile"), QueryClass::Structured);
        assert_eq!(classify("profile photos"), QueryClass::Structured);
        assert_eq!(classify("reviews about onboarding"), QueryClass::Document);
    }

    #[test]
    fn schema_terms_add_structured_signal() {
        let schema = SchemaGraph {
            tables: vec![TableProfile {
                name: "projects".into(),
                columns: vec![ColumnProfile {
                    table: "projects".into(),
                    name: "budget".into(),
                    role: SemanticRole::NumericMeasure,
                    data_type: "REAL".into(),
                    nullable: true,
                    primary_key: false,
                    sample_values: vec![],
                }],
            }],
            relationships: vec![],
        };
        let classifier = Classifier::with_schema(&schema);
        assert_eq!(
            classifier.classify("projects mentioning kubernetes"),
            QueryClass::Hybrid
        );
        assert_eq!(classifier.classify("project budgets"), QueryClass::Structured);
        assert_eq!(
            classifier.classify("documents mentioning kubernetes"),
            QueryClass::Document
        );
    }
}
