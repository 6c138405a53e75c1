//! Column lineage.
//!
//! [`lineage`] parses the query, substitutes caller-supplied sources, qualifies
//! every scope and then walks from the requested output column down to the
//! base tables, producing a tree of [`Node`]s. Each call owns all of its state;
//! nothing is cached between calls.

mod builder;
mod node;
mod trim;

use std::collections::BTreeMap;

#[cfg(feature = "tracing")]
use tracing::debug;

pub use node::{Node, SqlFragment, Visit, Walk};

use crate::error::LineageError;
use crate::parser::{parse_column_identifier, parse_query};
use crate::qualify::{Qualifier, SchemaCatalog, SourceCatalog};
use crate::types::{Dialect, LineageRequest, NormalizationStrategy, SchemaMetadata};
use builder::LineageBuilder;

/// Traces one output column of `request.sql`.
///
/// # Example
///
/// ```
/// use colscope_core::{lineage, Dialect, LineageRequest};
///
/// let request = LineageRequest::new(
///     "total",
///     "SELECT o.price * o.qty AS total FROM orders AS o",
///     Dialect::Generic,
/// );
/// let node = lineage(&request).unwrap();
/// assert_eq!(node.downstream_names(), vec!["o.price", "o.qty"]);
/// ```
pub fn lineage(request: &LineageRequest) -> Result<Node, LineageError> {
    resolve_lineage(
        &request.column,
        &request.sql,
        request.schema.as_ref(),
        request.sources.as_ref(),
        request.dialect,
        request.trim_selects(),
    )
}

/// Argument form of [`lineage`].
pub fn resolve_lineage(
    column: &str,
    sql: &str,
    schema: Option<&SchemaMetadata>,
    sources: Option<&BTreeMap<String, String>>,
    dialect: Dialect,
    trim_selects: bool,
) -> Result<Node, LineageError> {
    let strategy = normalization_strategy(schema, dialect);
    #[cfg(feature = "tracing")]
    debug!(column, ?dialect, ?strategy, trim_selects, "resolving lineage");

    let query = parse_query(sql, dialect)?;
    let schema = SchemaCatalog::new(schema, dialect, strategy);
    let sources = SourceCatalog::new(sources, dialect, strategy);
    let index = Qualifier::new(dialect, strategy, &schema, &sources).qualify(query)?;

    let column = parse_column_identifier(column, dialect, strategy);
    LineageBuilder::new(&index, trim_selects).build(&column)
}

/// Traces `column` with no schema and no sources.
pub fn trace(column: &str, sql: &str, dialect: Dialect) -> Result<Node, LineageError> {
    resolve_lineage(column, sql, None, None, dialect, true)
}

fn normalization_strategy(schema: Option<&SchemaMetadata>, dialect: Dialect) -> NormalizationStrategy {
    schema
        .and_then(|schema| schema.case_sensitivity)
        .map(|case| case.resolve(dialect))
        .unwrap_or_else(|| dialect.normalization_strategy())
}
