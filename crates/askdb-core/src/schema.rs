//! Schema discovery: builds a [`SchemaGraph`] from an [`Introspector`].
//!
//! Discovery enumerates tables, then columns, then relationship edges, and
//! assigns every column a [`SemanticRole`] by walking [`ROLE_RULES`] in
//! order. Key rules run before the numeric rule so primary and foreign keys
//! are never treated as measures.
//!
//! Discovery is deterministic: re-running it against an unchanged data
//! source yields an identical graph. Sample values are sorted, tables keep
//! the introspector's declaration order, and relationships are emitted
//! declared-first in table/column order.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::error::Result;
use crate::models::{
    ColumnProfile, Relationship, RelationshipOrigin, SchemaGraph, SemanticRole, TableProfile,
};
use crate::store::{Introspector, RawColumn, RawForeignKey};
use crate::text::{identifier_parts, singular};

/// Text columns with at most this many distinct values are categorical.
pub const CATEGORICAL_MAX_DISTINCT: usize = 50;

/// Coarse storage class of a declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    Integer,
    Real,
    Text,
    Temporal,
    Boolean,
    Blob,
    /// No declared type (common in SQLite).
    Untyped,
}

impl TypeClass {
    /// Classify a declared type name using SQLite-style affinity rules.
    pub fn of(data_type: &str) -> Self {
        let t = data_type.to_ascii_uppercase();
        if t.trim().is_empty() {
            TypeClass::Untyped
        } else if t.contains("DATE") || t.contains("TIME") {
            TypeClass::Temporal
        } else if t.contains("BOOL") {
            TypeClass::Boolean
        } else if t.contains("INT") {
            TypeClass::Integer
        } else if t.contains("CHAR") || t.contains("CLOB") || t.contains("TEXT") {
            TypeClass::Text
        } else if t.contains("BLOB") || t.contains("BINARY") {
            TypeClass::Blob
        } else if ["REAL", "FLOA", "DOUB", "NUMERIC", "DECIMAL", "MONEY"]
            .iter()
            .any(|k| t.contains(k))
        {
            TypeClass::Real
        } else {
            TypeClass::Untyped
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, TypeClass::Integer | TypeClass::Real)
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, TypeClass::Text | TypeClass::Untyped)
    }
}

/// Everything the role rules look at for one column.
#[derive(Debug, Clone)]
pub struct ColumnFacts {
    pub parts: Vec<String>,
    pub type_class: TypeClass,
    pub primary_key: bool,
    pub unique: bool,
    /// Source of a declared or inferred relationship edge.
    pub foreign_key: bool,
    /// Distinct values seen, capped at `CATEGORICAL_MAX_DISTINCT + 1`.
    /// `None` when values were not sampled.
    pub distinct: Option<usize>,
}

impl ColumnFacts {
    fn has_part(&self, words: &[&str]) -> bool {
        self.parts.iter().any(|p| words.contains(&p.as_str()))
    }
}

/// One entry of the ordered role table.
pub struct RoleRule {
    pub name: &'static str,
    pub role: SemanticRole,
    pub applies: fn(&ColumnFacts) -> bool,
}

/// Role heuristics, evaluated top to bottom; the first match wins.
pub const ROLE_RULES: &[RoleRule] = &[
    RoleRule {
        name: "key",
        role: SemanticRole::Identifier,
        applies: |f| f.primary_key || f.foreign_key,
    },
    RoleRule {
        name: "id-named",
        role: SemanticRole::Identifier,
        applies: |f| {
            let id_suffix = f.parts.last().is_some_and(|p| p == "id");
            (id_suffix && (f.type_class == TypeClass::Integer || f.unique))
                || f.has_part(&["uuid", "guid"])
        },
    },
    RoleRule {
        name: "temporal",
        role: SemanticRole::Date,
        applies: |f| {
            f.type_class == TypeClass::Temporal
                || (f.has_part(DATE_WORDS) && f.type_class != TypeClass::Real)
                || (matches!(f.parts.last().map(String::as_str), Some("at" | "on"))
                    && f.parts.len() > 1)
        },
    },
    RoleRule {
        name: "numeric",
        role: SemanticRole::NumericMeasure,
        applies: |f| {
            f.type_class.is_numeric()
                || (f.type_class == TypeClass::Untyped && f.has_part(MEASURE_WORDS))
        },
    },
    RoleRule {
        name: "person-name",
        role: SemanticRole::Name,
        applies: |f| f.type_class.is_textual() && f.has_part(NAME_WORDS),
    },
    RoleRule {
        name: "prose",
        role: SemanticRole::FreeText,
        applies: |f| f.type_class.is_textual() && f.has_part(PROSE_WORDS),
    },
    RoleRule {
        name: "low-cardinality",
        role: SemanticRole::Categorical,
        applies: |f| {
            (f.type_class.is_textual() || f.type_class == TypeClass::Boolean)
                && f.distinct.is_some_and(|d| d <= CATEGORICAL_MAX_DISTINCT)
        },
    },
    RoleRule {
        name: "text",
        role: SemanticRole::FreeText,
        applies: |f| f.type_class.is_textual(),
    },
];

const DATE_WORDS: &[&str] = &[
    "date", "hired", "time", "timestamp", "created", "updated", "dob", "birthday", "joined",
];
const MEASURE_WORDS: &[&str] = &[
    "salary", "wage", "pay", "amount", "price", "cost", "total", "revenue", "budget", "score",
    "rating", "age", "quantity", "compensation", "income", "earnings", "bonus",
];
const NAME_WORDS: &[&str] = &["name", "fullname", "firstname", "lastname", "first", "last"];
const PROSE_WORDS: &[&str] = &[
    "description", "notes", "note", "comment", "comments", "bio", "summary", "content", "body",
    "address",
];

/// Assign a role by walking [`ROLE_RULES`].
pub fn infer_role(facts: &ColumnFacts) -> SemanticRole {
    ROLE_RULES
        .iter()
        .find(|rule| (rule.applies)(facts))
        .map(|rule| rule.role)
        .unwrap_or(SemanticRole::Unknown)
}

struct RawTable {
    name: String,
    columns: Vec<RawColumn>,
    foreign_keys: Vec<RawForeignKey>,
}

/// Introspect a data source and build its semantic model.
///
/// Fails with [`crate::Error::Introspection`] (or whatever the
/// introspector reports, e.g. [`crate::Error::Connection`]) when metadata
/// cannot be read.
pub async fn discover(source: &dyn Introspector) -> Result<SchemaGraph> {
    let mut raw_tables = Vec::new();
    for name in source.tables().await? {
        let columns = source.columns(&name).await?;
        let foreign_keys = source.foreign_keys(&name).await?;
        raw_tables.push(RawTable {
            name,
            columns,
            foreign_keys,
        });
    }

    let relationships = discover_relationships(&raw_tables);
    let fk_columns: HashSet<(String, String)> = relationships
        .iter()
        .map(|r| (r.from_table.to_lowercase(), r.from_column.to_lowercase()))
        .collect();

    let mut tables = Vec::with_capacity(raw_tables.len());
    for raw in &raw_tables {
        let mut columns = Vec::with_capacity(raw.columns.len());
        for col in &raw.columns {
            let type_class = TypeClass::of(&col.data_type);
            let is_fk = fk_columns.contains(&(raw.name.to_lowercase(), col.name.to_lowercase()));
            let sampled = !col.primary_key
                && !is_fk
                && (type_class.is_textual() || type_class == TypeClass::Boolean);

            let mut samples = if sampled {
                source
                    .distinct_values(&raw.name, &col.name, CATEGORICAL_MAX_DISTINCT + 1)
                    .await?
            } else {
                Vec::new()
            };

            let facts = ColumnFacts {
                parts: identifier_parts(&col.name),
                type_class,
                primary_key: col.primary_key,
                unique: col.unique,
                foreign_key: is_fk,
                distinct: sampled.then_some(samples.len()),
            };
            let role = infer_role(&facts);
            debug!(table = %raw.name, column = %col.name, ?role, "column profiled");

            let keeps_samples = matches!(role, SemanticRole::Categorical | SemanticRole::Name)
                && samples.len() <= CATEGORICAL_MAX_DISTINCT;
            if keeps_samples {
                samples.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then(a.cmp(b)));
                samples.dedup();
            } else {
                samples.clear();
            }

            columns.push(ColumnProfile {
                table: raw.name.clone(),
                name: col.name.clone(),
                role,
                data_type: col.data_type.clone(),
                nullable: col.nullable,
                primary_key: col.primary_key,
                sample_values: samples,
            });
        }
        tables.push(TableProfile {
            name: raw.name.clone(),
            columns,
        });
    }

    let graph = SchemaGraph {
        tables,
        relationships,
    };
    info!(
        tables = graph.tables.len(),
        columns = graph.column_count(),
        relationships = graph.relationships.len(),
        "schema discovered"
    );
    Ok(graph)
}

fn primary_key_of(table: &RawTable) -> Option<&str> {
    table
        .columns
        .iter()
        .find(|c| c.primary_key)
        .or_else(|| table.columns.iter().find(|c| c.name.eq_ignore_ascii_case("id")))
        .map(|c| c.name.as_str())
}

/// Declared foreign keys first, then `<table>_id` naming conventions that
/// point at another table's key.
fn discover_relationships(tables: &[RawTable]) -> Vec<Relationship> {
    let mut out: Vec<Relationship> = Vec::new();

    for table in tables {
        for fk in &table.foreign_keys {
            let target = tables
                .iter()
                .find(|t| t.name.eq_ignore_ascii_case(&fk.to_table));
            let to_column = match (&fk.to_column, target) {
                (Some(c), _) => c.clone(),
                (None, Some(t)) => match primary_key_of(t) {
                    Some(pk) => pk.to_string(),
                    None => continue,
                },
                (None, None) => continue,
            };
            out.push(Relationship {
                from_table: table.name.clone(),
                from_column: fk.from_column.clone(),
                to_table: target.map(|t| t.name.clone()).unwrap_or_else(|| fk.to_table.clone()),
                to_column,
                origin: RelationshipOrigin::Declared,
            });
        }
    }

    for table in tables {
        for col in &table.columns {
            if col.primary_key {
                continue;
            }
            let lower = col.name.to_lowercase();
            let Some(base) = lower.strip_suffix("_id") else {
                continue;
            };
            let already = out.iter().any(|r| {
                r.from_table == table.name && r.from_column.eq_ignore_ascii_case(&col.name)
            });
            if already || base.is_empty() {
                continue;
            }
            let target = tables.iter().find(|t| {
                let tn = t.name.to_lowercase();
                t.name != table.name && (tn == base || singular(&tn) == singular(base))
            });
            if let Some(target) = target {
                if let Some(pk) = primary_key_of(target) {
                    out.push(Relationship {
                        from_table: table.name.clone(),
                        from_column: col.name.clone(),
                        to_table: target.name.clone(),
                        to_column: pk.to_string(),
                        origin: RelationshipOrigin::Inferred,
                    });
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryCatalog;

    fn facts(name: &str, ty: &str) -> ColumnFacts {
        ColumnFacts {
            parts: identifier_parts(name),
            type_class: TypeClass::of(ty),
            primary_key: false,
            unique: false,
            foreign_key: false,
            distinct: None,
        }
    }

    fn rule(name: &str) -> &'static RoleRule {
        ROLE_RULES.iter().find(|r| r.name == name).unwrap()
    }

    fn company() -> MemoryCatalog {
        MemoryCatalog::new()
            .table(
                "departments",
                &[("id", "INTEGER"), ("name", "TEXT"), ("budget", "REAL")],
            )
            .table(
                "employees",
                &[
                    ("id", "INTEGER"),
                    ("name", "TEXT"),
                    ("department", "TEXT"),
                    ("department_id", "INTEGER"),
                    ("salary", "REAL"),
                    ("hire_date", "DATE"),
                    ("notes", "TEXT"),
                ],
            )
            .values("departments", "name", &["Sales", "Engineering"])
            .values("employees", "name", &["Ada", "Grace"])
            .values("employees", "department", &["Sales", "Engineering", "Engineering"])
            .values("employees", "notes", &["likes rust"])
    }

    #[test]
    fn type_classes() {
        assert_eq!(TypeClass::of("INTEGER"), TypeClass::Integer);
        assert_eq!(TypeClass::of("varchar(255)"), TypeClass::Text);
        assert_eq!(TypeClass::of("DATETIME"), TypeClass::Temporal);
        assert_eq!(TypeClass::of("DECIMAL(10,2)"), TypeClass::Real);
        assert_eq!(TypeClass::of(""), TypeClass::Untyped);
        assert_eq!(TypeClass::of("BOOLEAN"), TypeClass::Boolean);
    }

    #[test]
    fn key_rule_matches_primary_and_foreign_keys() {
        let mut f = facts("salary", "REAL");
        f.foreign_key = true;
        assert!((rule("key").applies)(&f));
        assert_eq!(infer_role(&f), SemanticRole::Identifier);
    }

    #[test]
    fn id_named_rule_needs_integer_or_unique() {
        assert!((rule("id-named").applies)(&facts("emp_id", "INTEGER")));
        assert!(!(rule("id-named").applies)(&facts("emp_id", "TEXT")));
        let mut f = facts("emp_id", "TEXT");
        f.unique = true;
        assert!((rule("id-named").applies)(&f));
        assert!(!(rule("id-named").applies)(&facts("paid", "INTEGER")));
    }

    #[test]
    fn temporal_rule_accepts_date_names_on_text() {
        assert!((rule("temporal").applies)(&facts("hire_date", "TEXT")));
        assert!((rule("temporal").applies)(&facts("created_at", "INTEGER")));
        assert!((rule("temporal").applies)(&facts("started", "TIMESTAMP")));
        assert!(!(rule("temporal").applies)(&facts("salary", "REAL")));
    }

    #[test]
    fn measure_names_on_numeric_columns_are_measures() {
        for name in ["salary", "annual_wage", "bonus", "price"] {
            assert_eq!(
                infer_role(&facts(name, "REAL")),
                SemanticRole::NumericMeasure,
                "{name}"
            );
        }
        assert_eq!(
            infer_role(&facts("salary", "")),
            SemanticRole::NumericMeasure
        );
    }

    #[test]
    fn identifier_check_precedes_numeric() {
        let mut f = facts("id", "INTEGER");
        f.primary_key = true;
        assert_eq!(infer_role(&f), SemanticRole::Identifier);
        assert_eq!(
            infer_role(&facts("manager_id", "INTEGER")),
            SemanticRole::Identifier
        );
    }

    #[test]
    fn text_roles_depend_on_name_and_cardinality() {
        assert_eq!(infer_role(&facts("full_name", "TEXT")), SemanticRole::Name);
        assert_eq!(
            infer_role(&facts("description", "TEXT")),
            SemanticRole::FreeText
        );
        let mut f = facts("department", "TEXT");
        f.distinct = Some(4);
        assert_eq!(infer_role(&f), SemanticRole::Categorical);
        f.distinct = Some(CATEGORICAL_MAX_DISTINCT + 1);
        assert_eq!(infer_role(&f), SemanticRole::FreeText);
        assert_eq!(infer_role(&facts("photo", "BLOB")), SemanticRole::Unknown);
    }

    #[tokio::test]
    async fn discovers_roles_and_relationships() {
        let graph = discover(&company()).await.unwrap();
        assert_eq!(graph.tables.len(), 2);

        let emp = graph.table("employees").unwrap();
        let role = |c: &str| emp.column(c).unwrap().role;
        assert_eq!(role("id"), SemanticRole::Identifier);
        assert_eq!(role("name"), SemanticRole::Name);
        assert_eq!(role("department"), SemanticRole::Categorical);
        assert_eq!(role("department_id"), SemanticRole::Identifier);
        assert_eq!(role("salary"), SemanticRole::NumericMeasure);
        assert_eq!(role("hire_date"), SemanticRole::Date);
        assert_eq!(role("notes"), SemanticRole::FreeText);

        assert_eq!(
            emp.column("department").unwrap().sample_values,
            vec!["Engineering", "Sales"]
        );

        assert_eq!(graph.relationships.len(), 1);
        let rel = &graph.relationships[0];
        assert_eq!(rel.from_column, "department_id");
        assert_eq!(rel.to_table, "departments");
        assert_eq!(rel.to_column, "id");
        assert_eq!(rel.origin, RelationshipOrigin::Inferred);
    }

    #[tokio::test]
    async fn declared_foreign_keys_are_identifiers() {
        let catalog = MemoryCatalog::new()
            .table("teams", &[("id", "INTEGER"), ("title", "TEXT")])
            .table(
                "people",
                &[("id", "INTEGER"), ("squad", "INTEGER"), ("score", "REAL")],
            )
            .foreign_key("people", "squad", "teams", "id");
        let graph = discover(&catalog).await.unwrap();
        let people = graph.table("people").unwrap();
        assert_eq!(people.column("squad").unwrap().role, SemanticRole::Identifier);
        assert_eq!(graph.relationships[0].origin, RelationshipOrigin::Declared);
    }

    #[tokio::test]
    async fn discovery_is_idempotent() {
        let catalog = company();
        let first = discover(&catalog).await.unwrap();
        let second = discover(&catalog).await.unwrap();
        assert_eq!(first, second);
    }
}
