//! Lookups for schema tables and caller-supplied sources.
//!
//! Names are compared after normalization: every catalog entry is read the way
//! an identifier in the query would be, so quoted entries keep their case and
//! unquoted entries are folded by the active strategy.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::LineageError;
use crate::parser::{parse_column_identifier, ColumnIdent};
use crate::types::{Dialect, NormalizationStrategy, SchemaMetadata};

fn split_name(name: &str, dialect: Dialect, strategy: NormalizationStrategy) -> Vec<ColumnIdent> {
    name.split('.')
        .map(|part| parse_column_identifier(part, dialect, strategy))
        .collect()
}

/// `reference` ends with every part of `entry`.
fn suffix_matches(entry: &[String], reference: &[String]) -> bool {
    !entry.is_empty() && entry.len() <= reference.len() && reference.ends_with(entry)
}

#[derive(Debug)]
struct CatalogTable {
    parts: Vec<String>,
    columns: Vec<String>,
}

/// Column lists of the tables described by [`SchemaMetadata`].
#[derive(Debug, Default)]
pub(crate) struct SchemaCatalog {
    tables: Vec<CatalogTable>,
}

impl SchemaCatalog {
    pub fn new(
        schema: Option<&SchemaMetadata>,
        dialect: Dialect,
        strategy: NormalizationStrategy,
    ) -> Self {
        let Some(schema) = schema else {
            return Self::default();
        };
        let read = |name: &str| parse_column_identifier(name, dialect, strategy).value;
        let tables = schema
            .tables
            .iter()
            .map(|table| {
                let mut parts: Vec<String> = table
                    .qualified_parts()
                    .into_iter()
                    .map(read)
                    .collect();
                if table.schema.is_none() {
                    if let Some(default_schema) = &schema.default_schema {
                        parts.insert(0, read(default_schema.as_str()));
                    }
                }
                CatalogTable {
                    parts,
                    columns: table.columns.iter().map(|c| read(c.name.as_str())).collect(),
                }
            })
            .collect();
        Self { tables }
    }

    /// Columns of the table `name` refers to.
    ///
    /// A reference matches an entry when one is a suffix of the other; the
    /// entry sharing the most parts wins.
    pub fn columns(&self, name: &[String]) -> Option<Vec<String>> {
        self.tables
            .iter()
            .filter(|table| {
                suffix_matches(&table.parts, name) || suffix_matches(name, &table.parts)
            })
            .max_by_key(|table| table.parts.len().min(name.len()))
            .map(|table| table.columns.clone())
    }
}

#[derive(Debug)]
struct SourceEntry<'a> {
    key: &'a str,
    parts: Vec<String>,
    quoted: bool,
    sql: &'a str,
}

/// Named queries that stand in for table references.
#[derive(Debug, Default)]
pub(crate) struct SourceCatalog<'a> {
    entries: Vec<SourceEntry<'a>>,
    matched: RefCell<BTreeSet<&'a str>>,
}

/// A source selected for a table reference.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SourceMatch<'a> {
    pub key: &'a str,
    pub sql: &'a str,
}

impl<'a> SourceCatalog<'a> {
    pub fn new(
        sources: Option<&'a BTreeMap<String, String>>,
        dialect: Dialect,
        strategy: NormalizationStrategy,
    ) -> Self {
        let entries = sources
            .into_iter()
            .flatten()
            .map(|(key, sql)| {
                let idents = split_name(key, dialect, strategy);
                SourceEntry {
                    key: key.as_str(),
                    quoted: idents.iter().any(|ident| ident.quoted),
                    parts: idents.into_iter().map(|ident| ident.value).collect(),
                    sql: sql.as_str(),
                }
            })
            .collect();
        Self {
            entries,
            matched: RefCell::default(),
        }
    }

    /// The source whose name matches a table reference.
    ///
    /// A fully qualified key must match in full; a shorter key matches the
    /// trailing parts of the reference. The longest key wins.
    pub fn find(&self, name: &[String]) -> Option<SourceMatch<'a>> {
        let entry = self
            .entries
            .iter()
            .filter(|entry| suffix_matches(&entry.parts, name))
            .max_by_key(|entry| entry.parts.len())?;
        self.matched.borrow_mut().insert(entry.key);
        Some(SourceMatch {
            key: entry.key,
            sql: entry.sql,
        })
    }

    /// Fails for a quoted key that no table reference matched.
    pub fn check_quoted_keys(&self) -> Result<(), LineageError> {
        let matched = self.matched.borrow();
        match self
            .entries
            .iter()
            .find(|entry| entry.quoted && !matched.contains(entry.key))
        {
            Some(entry) => Err(LineageError::qualification(
                entry.key,
                "no table reference matches this source name",
            )),
            None => Ok(()),
        }
    }
}
