//! CLI argument parsing using clap.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// colscope - column-level SQL lineage
#[derive(Parser, Debug)]
#[command(name = "colscope")]
#[command(about = "Trace where a query's output column comes from", long_about = None)]
#[command(version)]
pub struct Args {
    /// SQL file containing the query (reads from stdin if omitted)
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Output column to trace; quote it to match case-sensitively
    #[arg(short = 'c', long, value_name = "NAME")]
    pub column: String,

    /// SQL dialect
    #[arg(short, long, default_value = "generic", value_enum)]
    pub dialect: DialectArg,

    /// Schema file: JSON (schema document or nested mapping) or CREATE TABLE DDL
    #[arg(short, long, value_name = "FILE")]
    pub schema: Option<PathBuf>,

    /// Query to substitute for a table reference, as NAME=FILE (can be repeated)
    #[arg(long = "source", value_name = "NAME=FILE", value_parser = parse_source)]
    pub sources: Vec<(String, PathBuf)>,

    /// Keep full select lists in node sources instead of the traced column only
    #[arg(long)]
    pub no_trim: bool,

    /// Output format
    #[arg(short, long, default_value = "text", value_enum)]
    pub format: OutputFormat,

    /// Compact JSON output (no pretty-printing)
    #[arg(long)]
    pub compact: bool,

    /// Output file or directory (defaults to stdout)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Suppress the summary on stderr
    #[arg(short, long)]
    pub quiet: bool,
}

fn parse_source(value: &str) -> Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((name, path)) if !name.trim().is_empty() && !path.trim().is_empty() => {
            Ok((name.trim().to_string(), PathBuf::from(path.trim())))
        }
        _ => Err(format!("expected NAME=FILE, got '{value}'")),
    }
}

/// SQL dialect options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DialectArg {
    Generic,
    Ansi,
    Bigquery,
    Clickhouse,
    Databricks,
    Duckdb,
    Hive,
    Mssql,
    Mysql,
    Postgres,
    Redshift,
    Snowflake,
    Sqlite,
}

impl From<DialectArg> for colscope_core::Dialect {
    fn from(d: DialectArg) -> Self {
        match d {
            DialectArg::Generic => colscope_core::Dialect::Generic,
            DialectArg::Ansi => colscope_core::Dialect::Ansi,
            DialectArg::Bigquery => colscope_core::Dialect::Bigquery,
            DialectArg::Clickhouse => colscope_core::Dialect::Clickhouse,
            DialectArg::Databricks => colscope_core::Dialect::Databricks,
            DialectArg::Duckdb => colscope_core::Dialect::Duckdb,
            DialectArg::Hive => colscope_core::Dialect::Hive,
            DialectArg::Mssql => colscope_core::Dialect::Mssql,
            DialectArg::Mysql => colscope_core::Dialect::Mysql,
            DialectArg::Postgres => colscope_core::Dialect::Postgres,
            DialectArg::Redshift => colscope_core::Dialect::Redshift,
            DialectArg::Snowflake => colscope_core::Dialect::Snowflake,
            DialectArg::Sqlite => colscope_core::Dialect::Sqlite,
        }
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Indented tree
    Text,
    /// Nested JSON graph
    Json,
    /// Mermaid flowchart
    Mermaid,
    /// Standalone HTML report
    Html,
}

impl OutputFormat {
    pub fn export_format(self, compact: bool) -> colscope_export::ExportFormat {
        match self {
            OutputFormat::Text => colscope_export::ExportFormat::Text,
            OutputFormat::Json => colscope_export::ExportFormat::Json { compact },
            OutputFormat::Mermaid => colscope_export::ExportFormat::Mermaid,
            OutputFormat::Html => colscope_export::ExportFormat::Html,
        }
    }
}
