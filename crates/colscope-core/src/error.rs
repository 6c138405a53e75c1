//! Error types for lineage resolution.
//!
//! Every error here is fatal: [`crate::lineage`] either returns a complete graph
//! or one [`LineageError`]. Provenance that cannot be determined (an ambiguous
//! join column, a wildcard that could not be expanded) is not an error; it is
//! encoded in the graph as a `"?"` or `"*"` leaf.

use crate::types::Dialect;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;
#[cfg(feature = "tracing")]
use tracing::trace;

/// Error raised by [`crate::lineage`] and friends.
#[derive(Debug, Error)]
pub enum LineageError {
    /// The query text itself failed to parse.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The requested column is not produced by the top-level query.
    #[error("cannot find column '{column}' in query")]
    ColumnNotFound { column: String },

    /// A quoted identifier did not match any known identifier.
    #[error("cannot resolve quoted identifier {identifier}: {reason}")]
    Qualification { identifier: String, reason: String },

    /// A caller-supplied source query failed to parse.
    #[error("source '{name}' is not valid SQL")]
    SourceSubstitution {
        name: String,
        #[source]
        source: ParseError,
    },

    /// The statement carries no query that can be traced.
    #[error("unsupported statement: {0}")]
    Unsupported(String),

    /// The schema document could not be interpreted.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}

impl LineageError {
    pub(crate) fn qualification(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Qualification {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }
}

/// Error encountered while parsing SQL text.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    /// Location reported by the parser, if any.
    pub position: Option<Position>,
    pub dialect: Option<Dialect>,
    pub kind: ParseErrorKind,
}

/// Line and column of a parse error, both 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseErrorKind {
    #[default]
    SyntaxError,
    UnexpectedEof,
    /// Input parsed but holds no statement, or more than one.
    StatementCount,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
            dialect: None,
            kind: ParseErrorKind::SyntaxError,
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    pub fn with_kind(mut self, kind: ParseErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Extracts `Line: X, Column: Y` from a sqlparser message.
    fn position_from_message(message: &str) -> Option<Position> {
        static POSITION_REGEX: OnceLock<Regex> = OnceLock::new();
        let re = POSITION_REGEX.get_or_init(|| {
            Regex::new(r"Line:\s*(\d+)\s*,\s*Column:\s*(\d+)").expect("Invalid regex pattern")
        });

        let position = re.captures(message).and_then(|caps| {
            Some(Position {
                line: caps.get(1)?.as_str().parse().ok()?,
                column: caps.get(2)?.as_str().parse().ok()?,
            })
        });

        #[cfg(feature = "tracing")]
        if position.is_none() && message.contains("Line") {
            trace!(message, "parse error without a recognizable position");
        }

        position
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parse error")?;
        if let Some(dialect) = self.dialect {
            write!(f, " ({dialect:?})")?;
        }
        if let Some(pos) = self.position {
            write!(f, " at line {}, column {}", pos.line, pos.column)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for ParseError {}

impl From<sqlparser::parser::ParserError> for ParseError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        let message = err.to_string();
        let kind = if message.to_lowercase().contains("eof") {
            ParseErrorKind::UnexpectedEof
        } else {
            ParseErrorKind::SyntaxError
        };
        Self {
            position: Self::position_from_message(&message),
            message,
            dialect: None,
            kind,
        }
    }
}
