//! Column-level lineage for SQL queries.
//!
//! Given an output column of a query, [`lineage`] returns a tree of [`Node`]s
//! describing every upstream column, expression and base table the value is
//! computed from, through CTEs, derived tables, set operations, pivots,
//! unnesting and lateral table functions.

mod ast;
pub mod error;
pub mod lineage;
mod normalize;
pub mod parser;
mod qualify;
mod scope;
pub mod types;

pub use error::{LineageError, ParseError, ParseErrorKind, Position};
pub use lineage::{lineage, resolve_lineage, trace, Node, SqlFragment, Visit, Walk};
pub use parser::{parse_column_identifier, parse_query, parse_sql, parse_sql_with_dialect, ColumnIdent};
pub use types::{
    CaseSensitivity, ColumnSchema, Dialect, LineageOptions, LineageRequest, NormalizationStrategy,
    SchemaMetadata, SchemaTable,
};

#[cfg(test)]
pub(crate) mod test_utils;
