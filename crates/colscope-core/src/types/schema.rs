//! Schema metadata consulted when expanding `*` and resolving unqualified columns.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::dialect::CaseSensitivity;
use crate::error::LineageError;

/// Schema metadata for column resolution.
///
/// The schema is only an oracle: tables missing from it are still traced, they
/// just cannot take part in wildcard expansion.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct SchemaMetadata {
    /// Default catalog applied to unqualified table references
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_catalog: Option<String>,

    /// Default schema applied to unqualified table references
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_schema: Option<String>,

    /// Override for identifier normalization (default 'dialect')
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_sensitivity: Option<CaseSensitivity>,

    #[serde(default)]
    pub tables: Vec<SchemaTable>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SchemaTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

impl SchemaTable {
    /// Qualified name parts in catalog, schema, table order.
    pub fn qualified_parts(&self) -> Vec<&str> {
        self.catalog
            .as_deref()
            .into_iter()
            .chain(self.schema.as_deref())
            .chain(std::iter::once(self.name.as_str()))
            .collect()
    }
}

impl SchemaMetadata {
    /// Builds schema metadata from the nested mapping form.
    ///
    /// Accepted shapes are `table -> column -> type`, `db -> table -> column -> type`
    /// and `catalog -> db -> table -> column -> type`. Every branch must have the
    /// same depth.
    pub fn from_mapping(mapping: &Value) -> Result<Self, LineageError> {
        let root = mapping
            .as_object()
            .ok_or_else(|| LineageError::InvalidSchema("schema mapping must be an object".into()))?;

        let mut tables = Vec::new();
        let Some(depth) = mapping_depth(root)? else {
            return Ok(Self::default());
        };

        match depth {
            2 => collect_tables(root, None, None, &mut tables)?,
            3 => {
                for (db, tables_value) in root {
                    collect_tables(
                        as_object(tables_value, db)?,
                        None,
                        Some(db.as_str()),
                        &mut tables,
                    )?;
                }
            }
            4 => {
                for (catalog, dbs) in root {
                    for (db, tables_value) in as_object(dbs, catalog)? {
                        collect_tables(
                            as_object(tables_value, db)?,
                            Some(catalog.as_str()),
                            Some(db.as_str()),
                            &mut tables,
                        )?;
                    }
                }
            }
            other => {
                return Err(LineageError::InvalidSchema(format!(
                    "unsupported schema nesting depth {other}; expected 2 to 4 levels"
                )))
            }
        }

        Ok(Self {
            tables,
            ..Default::default()
        })
    }
}

/// Depth of nested objects above the column type leaves, or `None` for an empty mapping.
fn mapping_depth(object: &Map<String, Value>) -> Result<Option<usize>, LineageError> {
    let mut depth = None;
    for (key, value) in object {
        let branch = match value {
            Value::Object(child) => mapping_depth(child)?.map(|d| d + 1),
            Value::String(_) | Value::Null => Some(1),
            _ => {
                return Err(LineageError::InvalidSchema(format!(
                    "column '{key}' must map to a type name"
                )))
            }
        };
        match (depth, branch) {
            (None, branch) => depth = branch,
            (Some(expected), Some(found)) if expected != found => {
                return Err(LineageError::InvalidSchema(format!(
                    "inconsistent nesting depth at '{key}'"
                )))
            }
            _ => {}
        }
    }
    Ok(depth)
}

fn as_object<'v>(value: &'v Value, key: &str) -> Result<&'v Map<String, Value>, LineageError> {
    value
        .as_object()
        .ok_or_else(|| LineageError::InvalidSchema(format!("'{key}' must map to an object")))
}

fn collect_tables(
    object: &Map<String, Value>,
    catalog: Option<&str>,
    schema: Option<&str>,
    tables: &mut Vec<SchemaTable>,
) -> Result<(), LineageError> {
    for (name, columns) in object {
        let columns = as_object(columns, name)?
            .iter()
            .map(|(column, data_type)| ColumnSchema {
                name: column.clone(),
                data_type: data_type.as_str().map(str::to_string),
            })
            .collect();
        tables.push(SchemaTable {
            catalog: catalog.map(str::to_string),
            schema: schema.map(str::to_string),
            name: name.clone(),
            columns,
        });
    }
    Ok(())
}
