//! Splicing caller-supplied source queries in place of table references.

use sqlparser::ast::{TableAlias, TableFactor};
#[cfg(feature = "tracing")]
use tracing::debug;

use super::catalog::SourceMatch;
use super::Qualifier;
use crate::ast;
use crate::error::LineageError;
use crate::parser::parse_query;
use crate::scope::{Relation, SourceMarker};

impl<'a> Qualifier<'a> {
    /// Replaces the table reference in `factor` with the parsed and qualified
    /// source query, aliased like the reference it replaces.
    pub(super) fn substitute(
        &mut self,
        factor: &mut TableFactor,
        source: SourceMatch<'a>,
        alias: Option<TableAlias>,
        alias_name: String,
    ) -> Result<Relation, LineageError> {
        #[cfg(feature = "tracing")]
        debug!(source = source.key, alias = %alias_name, "substituting source query");

        let mut query = parse_query(source.sql, self.dialect).map_err(|err| match err {
            LineageError::Parse(parse) => LineageError::SourceSubstitution {
                name: source.key.to_string(),
                source: parse,
            },
            other => other,
        })?;
        self.prepare(&mut query);

        // Enclosing sources must be marked before the ones nested in them.
        let slot = self.markers.len();
        self.markers.push(None);

        // A source sees neither the enclosing scopes nor the enclosing CTEs.
        let ctes = std::mem::take(&mut self.ctes);
        self.active_sources.push(source.key);
        let scope = self.isolated(|this| this.qualify_query(&mut query, source.key, true));
        self.active_sources.pop();
        self.ctes = ctes;
        let scope = scope?;

        let columns = alias.as_ref().and_then(ast::alias_column_names);
        let alias = alias.unwrap_or_else(|| ast::table_alias(self.ident(&alias_name), Vec::new()));
        *factor = ast::derived_table(query, alias);
        self.markers[slot] = Some(SourceMarker {
            text: factor.to_string(),
            name: source.key.to_string(),
        });

        Ok(Relation::DerivedTable {
            alias: alias_name,
            scope,
            columns,
        })
    }
}
