use crate::error::{LineageError, ParseError, ParseErrorKind};
use crate::types::{Dialect, NormalizationStrategy};
use sqlparser::ast::{Query, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

/// Parse SQL using the specified dialect
pub fn parse_sql_with_dialect(sql: &str, dialect: Dialect) -> Result<Vec<Statement>, ParseError> {
    let sqlparser_dialect = dialect.to_sqlparser_dialect();
    match Parser::parse_sql(sqlparser_dialect.as_ref(), sql) {
        Ok(statements) => Ok(statements),
        Err(primary_err) => {
            // Generic rejects Postgres-only operators (`::`, `->>`, `?`) that are
            // common in warehouse SQL.
            if matches!(dialect, Dialect::Generic) && looks_like_postgres_syntax(sql) {
                let postgres = PostgreSqlDialect {};
                if let Ok(statements) = Parser::parse_sql(&postgres, sql) {
                    return Ok(statements);
                }
            }
            Err(ParseError::from(primary_err).with_dialect(dialect))
        }
    }
}

fn looks_like_postgres_syntax(sql: &str) -> bool {
    sql.contains("::")
        || sql.contains("->")
        || sql.contains("?|")
        || sql.contains("?&")
        || sql.contains(" ? ")
}

/// Parse SQL using the generic dialect
pub fn parse_sql(sql: &str) -> Result<Vec<Statement>, ParseError> {
    parse_sql_with_dialect(sql, Dialect::Generic)
}

/// Parses text holding exactly one statement and returns the query it carries.
///
/// Besides bare queries this accepts `INSERT ... SELECT`, `CREATE TABLE ... AS`
/// and `CREATE VIEW ... AS`; the lineage of those is the lineage of their query.
pub fn parse_query(sql: &str, dialect: Dialect) -> Result<Query, LineageError> {
    let mut statements = parse_sql_with_dialect(sql, dialect)?;
    if statements.len() != 1 {
        return Err(ParseError::new(format!(
            "expected exactly one statement, found {}",
            statements.len()
        ))
        .with_dialect(dialect)
        .with_kind(ParseErrorKind::StatementCount)
        .into());
    }

    match statements.remove(0) {
        Statement::Query(query) => Ok(*query),
        Statement::Insert(insert) => insert
            .source
            .map(|query| *query)
            .ok_or_else(|| LineageError::Unsupported("INSERT without a query".into())),
        Statement::CreateView { query, .. } => Ok(*query),
        Statement::CreateTable(create) => create
            .query
            .map(|query| *query)
            .ok_or_else(|| LineageError::Unsupported("CREATE TABLE without AS query".into())),
        _ => Err(LineageError::Unsupported(
            "only queries, INSERT, CREATE TABLE AS and CREATE VIEW can be traced".into(),
        )),
    }
}

/// A column name as requested by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnIdent {
    pub value: String,
    /// Written with identifier quotes; matched exactly.
    pub quoted: bool,
}

/// Interprets a caller-supplied column name.
///
/// Text wrapped in one of the dialect's identifier quotes keeps its case and is
/// matched exactly; anything else is folded with `strategy`.
pub fn parse_column_identifier(
    text: &str,
    dialect: Dialect,
    strategy: NormalizationStrategy,
) -> ColumnIdent {
    let text = text.trim();
    for &open in dialect.identifier_quotes() {
        let close = if open == '[' { ']' } else { open };
        if text.len() >= 2 && text.starts_with(open) && text.ends_with(close) {
            let inner = &text[open.len_utf8()..text.len() - close.len_utf8()];
            let doubled = format!("{close}{close}");
            return ColumnIdent {
                value: inner.replace(&doubled, &close.to_string()),
                quoted: true,
            };
        }
    }
    ColumnIdent {
        value: strategy.fold(text),
        quoted: false,
    }
}
