//! Schema loading from JSON documents and DDL files.

use anyhow::{anyhow, bail, Context, Result};
use colscope_core::{parse_sql_with_dialect, ColumnSchema, Dialect, SchemaMetadata, SchemaTable};
use serde_json::Value;
use sqlparser::ast::Statement;
use std::path::Path;

/// Load schema metadata from `path`.
///
/// `.sql` and `.ddl` files are read as `CREATE TABLE` statements. Anything
/// else must be JSON: either a `SchemaMetadata` document (an object with a
/// `tables` array) or the nested `table -> column -> type` mapping.
pub fn load_schema(path: &Path, dialect: Dialect) -> Result<SchemaMetadata> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema file: {}", path.display()))?;

    let is_ddl = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("sql") || ext.eq_ignore_ascii_case("ddl"));

    if is_ddl {
        parse_schema_ddl(&content, dialect)
    } else {
        parse_schema_json(&content)
    }
}

fn parse_schema_json(content: &str) -> Result<SchemaMetadata> {
    let value: Value = serde_json::from_str(content).context("Schema file is not valid JSON")?;
    if value.get("tables").is_some_and(Value::is_array) {
        serde_json::from_value(value).context("Invalid schema document")
    } else {
        // Kept as a configuration error rather than a lineage error.
        SchemaMetadata::from_mapping(&value).map_err(|e| anyhow!("Invalid schema mapping: {e}"))
    }
}

/// Parse `CREATE TABLE` statements into schema metadata. Other statements are
/// ignored.
fn parse_schema_ddl(content: &str, dialect: Dialect) -> Result<SchemaMetadata> {
    let statements =
        parse_sql_with_dialect(content, dialect).context("Failed to parse schema DDL")?;

    let tables: Vec<SchemaTable> = statements
        .iter()
        .filter_map(|statement| match statement {
            Statement::CreateTable(create) => Some(create),
            _ => None,
        })
        .map(|create| {
            let mut parts: Vec<String> = create
                .name
                .0
                .iter()
                .map(|part| {
                    part.as_ident()
                        .map(|ident| ident.value.clone())
                        .unwrap_or_else(|| part.to_string())
                })
                .collect();
            let name = parts.pop().unwrap_or_default();
            let schema = parts.pop();
            let catalog = parts.pop();
            SchemaTable {
                catalog,
                schema,
                name,
                columns: create
                    .columns
                    .iter()
                    .map(|column| ColumnSchema {
                        name: column.name.value.clone(),
                        data_type: Some(column.data_type.to_string()),
                    })
                    .collect(),
            }
        })
        .collect();

    if tables.is_empty() {
        bail!("Schema DDL contains no CREATE TABLE statements");
    }

    Ok(SchemaMetadata {
        tables,
        ..Default::default()
    })
}
