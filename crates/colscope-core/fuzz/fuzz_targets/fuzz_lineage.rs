//! Fuzz target for lineage resolution.
//!
//! Arbitrary queries, columns and sources must produce a graph or an error,
//! never a panic.

#![no_main]

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use colscope_core::{resolve_lineage, Dialect};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    sql: String,
    column: String,
    sources: Vec<(String, String)>,
    dialect_idx: u8,
    trim_selects: bool,
}

impl FuzzInput {
    fn dialect(&self) -> Dialect {
        match self.dialect_idx % 5 {
            0 => Dialect::Generic,
            1 => Dialect::Postgres,
            2 => Dialect::Snowflake,
            3 => Dialect::Bigquery,
            _ => Dialect::Duckdb,
        }
    }
}

fuzz_target!(|input: FuzzInput| {
    let sources: BTreeMap<String, String> = input.sources.iter().cloned().collect();
    if let Ok(node) = resolve_lineage(
        &input.column,
        &input.sql,
        None,
        Some(&sources),
        input.dialect(),
        input.trim_selects,
    ) {
        for visit in node.walk() {
            let _ = visit.node.source_sql();
        }
    }
});
