//! Rendering a [`QueryPlan`] to a parameterized SQLite statement.
//!
//! Identifiers come only from the schema graph and are double-quoted.
//! Every literal, including `LIMIT`, is bound through a `?` placeholder.

use std::fmt::Write as _;

use crate::error::{Error, Result};
use crate::models::{
    Aggregate, AggregateFn, ColumnRef, Operator, OrderTarget, QueryPlan, SchemaGraph,
    SortDirection, SqlValue,
};

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Quote an identifier for SQLite, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn qualified(c: &ColumnRef) -> String {
    format!("{}.{}", quote_ident(&c.table), quote_ident(&c.column))
}

fn aggregate_expr(agg: &Aggregate) -> String {
    let arg = agg
        .column
        .as_ref()
        .map(qualified)
        .unwrap_or_else(|| "*".to_string());
    match agg.func {
        AggregateFn::Avg => format!("ROUND(AVG({}), 2)", arg),
        f => format!("{}({})", f.sql_name(), arg),
    }
}

fn operator_sql(op: Operator) -> &'static str {
    match op {
        Operator::Eq | Operator::YearEq => "=",
        Operator::Gt => ">",
        Operator::Gte => ">=",
        Operator::Lt => "<",
        Operator::Lte => "<=",
    }
}

fn direction_sql(direction: SortDirection) -> &'static str {
    match direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    }
}

/// Render `plan`, checking that every table and column it names exists in
/// `schema`.
pub fn render(plan: &QueryPlan, schema: &SchemaGraph) -> Result<SqlStatement> {
    validate(plan, schema)?;
    let table = schema
        .table(&plan.table)
        .ok_or_else(|| Error::sql(format!("unknown table '{}'", plan.table)))?;

    let mut select = Vec::new();
    if let Some(group) = &plan.group_by {
        select.push(format!(
            "{} AS {}",
            qualified(&group.column),
            quote_ident(&group.label)
        ));
    }
    match &plan.aggregate {
        Some(agg) => select.push(format!("{} AS {}", aggregate_expr(agg), quote_ident(&agg.alias()))),
        None if plan.group_by.is_none() => {
            for column in &table.columns {
                select.push(format!(
                    "{} AS {}",
                    qualified(&ColumnRef::new(&table.name, &column.name)),
                    quote_ident(&column.name)
                ));
            }
        }
        None => select.push(format!("COUNT(*) AS {}", quote_ident("count"))),
    }

    let mut sql = format!("SELECT {} FROM {}", select.join(", "), quote_ident(&table.name));
    let mut params = Vec::new();

    for join in &plan.joins {
        let _ = write!(
            sql,
            " LEFT JOIN {} ON {} = {}",
            quote_ident(&join.table),
            qualified(&join.from),
            qualified(&join.to)
        );
    }

    if !plan.filters.is_empty() {
        let clauses: Vec<String> = plan
            .filters
            .iter()
            .map(|p| {
                params.push(p.value.clone());
                let column = qualified(&p.column);
                match (p.op, &p.value) {
                    (Operator::YearEq, _) => format!("strftime('%Y', {}) = ?", column),
                    (Operator::Eq, SqlValue::Text(_)) => format!("{} = ? COLLATE NOCASE", column),
                    (op, _) => format!("{} {} ?", column, operator_sql(op)),
                }
            })
            .collect();
        let _ = write!(sql, " WHERE {}", clauses.join(" AND "));
    }

    if let Some(group) = &plan.group_by {
        let _ = write!(sql, " GROUP BY {}", qualified(&group.column));
    }

    if let Some(order) = &plan.order_by {
        let dir = direction_sql(order.direction);
        match &order.target {
            OrderTarget::Aggregate => {
                let alias = plan
                    .aggregate
                    .as_ref()
                    .map(Aggregate::alias)
                    .unwrap_or_else(|| "count".to_string());
                let _ = write!(sql, " ORDER BY {} {}", quote_ident(&alias), dir);
            }
            OrderTarget::Column(c) => {
                let _ = write!(sql, " ORDER BY {} {}", qualified(c), dir);
                // Ties fall back to the key so pages are stable.
                if plan.group_by.is_none() && plan.aggregate.is_none() {
                    if let Some(pk) = table.primary_identifier() {
                        if !pk.name.eq_ignore_ascii_case(&c.column) || c.table != table.name {
                            let _ = write!(
                                sql,
                                ", {} ASC",
                                qualified(&ColumnRef::new(&table.name, &pk.name))
                            );
                        }
                    }
                }
            }
        }
    }

    if let Some(limit) = plan.limit {
        sql.push_str(" LIMIT ?");
        params.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    }

    Ok(SqlStatement { sql, params })
}

fn validate(plan: &QueryPlan, schema: &SchemaGraph) -> Result<()> {
    let check = |c: &ColumnRef| -> Result<()> {
        schema
            .table(&c.table)
            .and_then(|t| t.column(&c.column))
            .map(|_| ())
            .ok_or_else(|| Error::sql(format!("unknown column '{}.{}'", c.table, c.column)))
    };
    if schema.table(&plan.table).is_none() {
        return Err(Error::sql(format!("unknown table '{}'", plan.table)));
    }
    for join in &plan.joins {
        check(&join.from)?;
        check(&join.to)?;
    }
    for p in &plan.filters {
        check(&p.column)?;
    }
    if let Some(c) = plan.aggregate.as_ref().and_then(|a| a.column.as_ref()) {
        check(c)?;
    }
    if let Some(g) = &plan.group_by {
        check(&g.column)?;
    }
    if let Some(OrderTarget::Column(c)) = plan.order_by.as_ref().map(|o| &o.target) {
        check(c)?;
    }
    Ok(())
}
