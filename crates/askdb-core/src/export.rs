//! CSV and JSON rendering of structured query results.
//!
//! Only structured rows are exported; document hits have no tabular shape
//! shared with the structured columns. CSV cells render JSON values
//! unquoted, with SQL `NULL` as an empty cell.

use serde_json::Value;

use crate::classify::QueryClass;
use crate::engine::FullResult;
use crate::error::{Error, Result};
use crate::models::ResultRow;

/// Download formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(Error::InvalidInput(format!(
                "unknown export format '{}' (expected csv or json)",
                other
            ))),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

/// Render the structured rows of `result` in `format`.
pub fn export(result: &FullResult, format: ExportFormat) -> Result<Vec<u8>> {
    if result.source == QueryClass::Document {
        return Err(Error::InvalidInput(
            "document queries have no structured result to export".into(),
        ));
    }
    match format {
        ExportFormat::Csv => to_csv(result),
        ExportFormat::Json => to_json(result),
    }
}

fn to_csv(result: &FullResult) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&result.columns).map_err(export_error)?;
    for row in result.structured_rows() {
        if let ResultRow::Structured { values } = row {
            let record: Vec<String> = result
                .columns
                .iter()
                .map(|c| values.get(c).map(cell).unwrap_or_default())
                .collect();
            writer.write_record(&record).map_err(export_error)?;
        }
    }
    writer
        .into_inner()
        .map_err(|e| Error::Export {
            message: e.to_string(),
        })
}

fn to_json(result: &FullResult) -> Result<Vec<u8>> {
    let rows: Vec<&serde_json::Map<String, Value>> = result
        .structured_rows()
        .filter_map(|row| match row {
            ResultRow::Structured { values } => Some(values),
            ResultRow::Document(_) => None,
        })
        .collect();
    serde_json::to_vec_pretty(&rows).map_err(|e| Error::Export {
        message: e.to_string(),
    })
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn export_error(e: csv::Error) -> Error {
    Error::Export {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentFormat, DocumentHit, SqlValue};
    use chrono::Utc;

    fn result(source: QueryClass) -> FullResult {
        let columns = vec!["department".to_string(), "average_salary".to_string()];
        let mut rows = vec![
            ResultRow::from_sql_row(
                &columns,
                &[SqlValue::Text("Engineering".into()), SqlValue::Real(150.0)],
            ),
            ResultRow::from_sql_row(
                &columns,
                &[SqlValue::Text("Sales, West".into()), SqlValue::Null],
            ),
        ];
        rows.insert(
            1,
            ResultRow::Document(DocumentHit {
                document_id: "d1".into(),
                filename: "cv.txt".into(),
                format: DocumentFormat::Txt,
                score: 1.0,
                snippet: "python".into(),
                ingested_at: Utc::now(),
            }),
        );
        FullResult {
            source,
            columns,
            rows,
            sql: None,
            plan: None,
        }
    }

    #[test]
    fn csv_has_header_and_structured_rows_only() {
        let bytes = export(&result(QueryClass::Hybrid), ExportFormat::Csv).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "department,average_salary\nEngineering,150.0\n\"Sales, West\",\n"
        );
    }

    #[test]
    fn json_is_an_array_of_objects() {
        let bytes = export(&result(QueryClass::Structured), ExportFormat::Json).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["department"], "Engineering");
        assert!(rows[1]["average_salary"].is_null());
    }

    #[test]
    fn document_results_are_rejected() {
        let err = export(&result(QueryClass::Document), ExportFormat::Csv).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn formats_parse_case_insensitively() {
        assert_eq!(ExportFormat::parse("CSV").unwrap(), ExportFormat::Csv);
        assert_eq!(ExportFormat::parse("json").unwrap(), ExportFormat::Json);
        assert!(ExportFormat::parse("xml").is_err());
    }
}
