//! Types for the column lineage API.
//!
//! This module defines the request and schema types accepted by [`crate::lineage`].
//! Everything here is plain data with serde and JSON Schema support so hosts can
//! build requests from configuration documents.

mod dialect;
mod request;
mod schema;

pub use dialect::{CaseSensitivity, Dialect, NormalizationStrategy};
pub use request::{LineageOptions, LineageRequest};
pub use schema::{ColumnSchema, SchemaMetadata, SchemaTable};
