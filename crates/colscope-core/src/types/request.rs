//! Request types for the column lineage API.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::dialect::Dialect;
use super::schema::SchemaMetadata;

/// A request to trace one output column back to its origins.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineageRequest {
    /// Output column of the top-level query. Wrap in the dialect's identifier
    /// quotes to match case-sensitively.
    pub column: String,

    /// The query text. A bare query, `INSERT ... SELECT`, `CREATE TABLE ... AS`
    /// or `CREATE VIEW ... AS` is accepted.
    pub sql: String,

    /// SQL dialect
    #[serde(default)]
    pub dialect: Dialect,

    /// Optional schema metadata used to expand `*` and resolve ambiguous columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaMetadata>,

    /// Named queries substituted for matching table references
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<LineageOptions>,
}

/// Options controlling graph rendering.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct LineageOptions {
    /// Render each intermediate scope with only the projection on the traced path
    /// (default true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim_selects: Option<bool>,
}

impl LineageRequest {
    pub fn new(column: impl Into<String>, sql: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            column: column.into(),
            sql: sql.into(),
            dialect,
            schema: None,
            sources: None,
            options: None,
        }
    }

    pub fn with_schema(mut self, schema: SchemaMetadata) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Adds a named source query.
    pub fn with_source(mut self, name: impl Into<String>, sql: impl Into<String>) -> Self {
        self.sources
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), sql.into());
        self
    }

    pub fn with_trim_selects(mut self, trim: bool) -> Self {
        self.options
            .get_or_insert_with(LineageOptions::default)
            .trim_selects = Some(trim);
        self
    }

    pub fn trim_selects(&self) -> bool {
        self.options
            .as_ref()
            .and_then(|o| o.trim_selects)
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = LineageRequest::new("a", "SELECT a FROM t", Dialect::Postgres)
            .with_source("t", "SELECT 1 AS a");
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"dialect\":\"postgres\""));
        assert!(json.contains("\"sources\":{\"t\":\"SELECT 1 AS a\"}"));

        let back: LineageRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.dialect, Dialect::Postgres);
        assert_eq!(back.sources.unwrap().len(), 1);
    }

    #[test]
    fn test_request_defaults() {
        let request: LineageRequest =
            serde_json::from_str(r#"{"column": "a", "sql": "SELECT a FROM t"}"#).unwrap();
        assert_eq!(request.dialect, Dialect::Generic);
        assert!(request.trim_selects());
    }

    #[test]
    fn test_trim_selects_option() {
        let json = r#"{"column": "a", "sql": "SELECT 1 AS a", "options": {"trimSelects": false}}"#;
        let request: LineageRequest = serde_json::from_str(json).unwrap();
        assert!(!request.trim_selects());
        assert!(LineageRequest::new("a", "", Dialect::Generic)
            .with_trim_selects(true)
            .trim_selects());
    }
}
