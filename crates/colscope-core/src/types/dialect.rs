//! SQL dialects and their identifier folding rules.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// SQL dialect for parsing and identifier normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
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

/// How unquoted identifiers are folded before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationStrategy {
    /// Fold to lowercase (Postgres)
    Lowercase,
    /// Fold to uppercase (Snowflake, ANSI)
    Uppercase,
    /// Case-insensitive; folded to lowercase for comparison
    CaseInsensitive,
    /// Preserve exactly
    CaseSensitive,
}

impl NormalizationStrategy {
    /// Folds an unquoted identifier.
    pub fn fold(&self, value: &str) -> String {
        match self {
            Self::Lowercase | Self::CaseInsensitive => value.to_lowercase(),
            Self::Uppercase => value.to_uppercase(),
            Self::CaseSensitive => value.to_string(),
        }
    }
}

/// Override for the dialect's identifier folding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaseSensitivity {
    /// Use dialect default
    #[default]
    Dialect,
    Lower,
    Upper,
    Exact,
}

impl CaseSensitivity {
    /// Resolves this setting to a concrete strategy for `dialect`.
    pub fn resolve(&self, dialect: Dialect) -> NormalizationStrategy {
        match self {
            Self::Dialect => dialect.normalization_strategy(),
            Self::Lower => NormalizationStrategy::Lowercase,
            Self::Upper => NormalizationStrategy::Uppercase,
            Self::Exact => NormalizationStrategy::CaseSensitive,
        }
    }
}

impl Dialect {
    pub fn to_sqlparser_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        use sqlparser::dialect::{
            AnsiDialect, BigQueryDialect, ClickHouseDialect, DatabricksDialect, DuckDbDialect,
            GenericDialect, HiveDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect,
            RedshiftSqlDialect, SQLiteDialect, SnowflakeDialect,
        };
        match self {
            Self::Generic => Box::new(GenericDialect {}),
            Self::Ansi => Box::new(AnsiDialect {}),
            Self::Bigquery => Box::new(BigQueryDialect {}),
            Self::Clickhouse => Box::new(ClickHouseDialect {}),
            Self::Databricks => Box::new(DatabricksDialect {}),
            Self::Duckdb => Box::new(DuckDbDialect {}),
            Self::Hive => Box::new(HiveDialect {}),
            Self::Mssql => Box::new(MsSqlDialect {}),
            Self::Mysql => Box::new(MySqlDialect {}),
            Self::Postgres => Box::new(PostgreSqlDialect {}),
            Self::Redshift => Box::new(RedshiftSqlDialect {}),
            Self::Snowflake => Box::new(SnowflakeDialect {}),
            Self::Sqlite => Box::new(SQLiteDialect {}),
        }
    }

    /// Folding rule applied to unquoted identifiers.
    pub const fn normalization_strategy(&self) -> NormalizationStrategy {
        match self {
            Dialect::Postgres => NormalizationStrategy::Lowercase,
            Dialect::Snowflake | Dialect::Ansi => NormalizationStrategy::Uppercase,
            Dialect::Clickhouse | Dialect::Mysql => NormalizationStrategy::CaseSensitive,
            Dialect::Bigquery
            | Dialect::Databricks
            | Dialect::Duckdb
            | Dialect::Hive
            | Dialect::Mssql
            | Dialect::Redshift
            | Dialect::Sqlite
            | Dialect::Generic => NormalizationStrategy::CaseInsensitive,
        }
    }

    /// Identifier quote characters for this dialect.
    ///
    /// Paired quotes (`[...]`) are represented by their opening character.
    pub fn identifier_quotes(&self) -> &'static [char] {
        match self {
            Dialect::Bigquery | Dialect::Databricks | Dialect::Hive | Dialect::Mysql => &['`'],
            Dialect::Clickhouse => &['"', '`'],
            Dialect::Mssql => &['[', '"'],
            Dialect::Sqlite => &['"', '[', '`'],
            _ => &['"'],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_normalization() {
        assert_eq!(
            Dialect::Postgres.normalization_strategy(),
            NormalizationStrategy::Lowercase
        );
        assert_eq!(
            Dialect::Snowflake.normalization_strategy(),
            NormalizationStrategy::Uppercase
        );
        assert_eq!(
            Dialect::Mysql.normalization_strategy(),
            NormalizationStrategy::CaseSensitive
        );
        assert_eq!(
            Dialect::Duckdb.normalization_strategy(),
            NormalizationStrategy::CaseInsensitive
        );
    }

    #[test]
    fn test_fold() {
        assert_eq!(NormalizationStrategy::Uppercase.fold("Abc"), "ABC");
        assert_eq!(NormalizationStrategy::CaseInsensitive.fold("Abc"), "abc");
        assert_eq!(NormalizationStrategy::CaseSensitive.fold("Abc"), "Abc");
    }

    #[test]
    fn test_case_sensitivity_override() {
        assert_eq!(
            CaseSensitivity::Dialect.resolve(Dialect::Snowflake),
            NormalizationStrategy::Uppercase
        );
        assert_eq!(
            CaseSensitivity::Exact.resolve(Dialect::Snowflake),
            NormalizationStrategy::CaseSensitive
        );
    }

    #[test]
    fn test_dialect_serde_lowercase() {
        let json = serde_json::to_string(&Dialect::Bigquery).unwrap();
        assert_eq!(json, "\"bigquery\"");
        let back: Dialect = serde_json::from_str("\"duckdb\"").unwrap();
        assert_eq!(back, Dialect::Duckdb);
    }
}
