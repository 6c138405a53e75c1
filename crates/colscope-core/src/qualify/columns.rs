//! Binding column references to the relations that own them.

use std::ops::ControlFlow;

use sqlparser::ast::{Expr, Ident, Query, VisitMut, VisitorMut};
#[cfg(feature = "tracing")]
use tracing::trace;

use super::Qualifier;
use crate::error::LineageError;
use crate::scope::{Reference, RelationRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Mode {
    /// Projections: a quoted column nothing can own is an error.
    Strict,
    /// Filters, join conditions and function arguments: unresolved columns
    /// are left as written, and so are references to output aliases.
    Lenient,
}

enum Resolution {
    Found(RelationRef),
    Ambiguous,
    Missing,
}

impl Qualifier<'_> {
    /// Qualifies the column references in `expr` and returns them in syntax
    /// order. Subqueries become scopes of their own and are returned as
    /// [`Reference::Subquery`] in place of their columns.
    pub(super) fn qualify_expr(
        &mut self,
        expr: &mut Expr,
        scope: crate::scope::ScopeId,
        mode: Mode,
        aliases: &[String],
    ) -> Result<Vec<Reference>, LineageError> {
        let mut visitor = ColumnQualifier {
            qualifier: self,
            scope,
            mode,
            aliases,
            depth: 0,
            references: Vec::new(),
        };
        match expr.visit(&mut visitor) {
            ControlFlow::Break(err) => Err(err),
            ControlFlow::Continue(()) => Ok(visitor.references),
        }
    }

    fn relation_alias(&self, relation: RelationRef) -> String {
        self.index
            .relation(relation)
            .map(|relation| relation.alias().to_string())
            .unwrap_or_default()
    }

    /// Innermost visible relation called `alias`.
    fn find_alias(&self, alias: &str) -> Option<RelationRef> {
        self.outer.iter().rev().find_map(|&scope| {
            self.relations(scope)
                .iter()
                .position(|relation| !alias.is_empty() && relation.alias() == alias)
                .map(|index| RelationRef { scope, index })
        })
    }

    /// Finds the relation owning an unqualified column.
    ///
    /// Scopes are searched innermost first. Within a scope, the one relation
    /// known to expose the column wins; failing that, the one relation whose
    /// columns are unknown. Anything else in a scope that has candidates is
    /// ambiguous, unless the column was joined with `USING`.
    fn resolve_unqualified(&self, column: &str) -> Resolution {
        for &scope in self.outer.iter().rev() {
            let mut known = Vec::new();
            let mut unknown = Vec::new();
            for (index, relation) in self.relations(scope).iter().enumerate() {
                if relation.alias().is_empty() {
                    continue;
                }
                match relation.known_columns(&self.index) {
                    Some(columns) if columns.iter().any(|c| c == column) => known.push(index),
                    Some(_) => {}
                    None => unknown.push(index),
                }
            }

            let joined_using = self
                .using
                .get(&scope)
                .is_some_and(|columns| columns.contains(column));
            let index = match (known.as_slice(), unknown.as_slice()) {
                ([index], _) | ([], [index]) => *index,
                ([], []) => continue,
                ([first, ..], _) if joined_using => *first,
                _ => return Resolution::Ambiguous,
            };
            return Resolution::Found(RelationRef { scope, index });
        }
        Resolution::Missing
    }

    /// True when some visible relation is known to expose `column`.
    fn is_known_column(&self, column: &str) -> bool {
        self.outer.iter().any(|&scope| {
            self.relations(scope).iter().any(|relation| {
                relation
                    .known_columns(&self.index)
                    .is_some_and(|columns| columns.iter().any(|c| c == column))
            })
        })
    }
}

struct ColumnQualifier<'q, 'a> {
    qualifier: &'q mut Qualifier<'a>,
    scope: crate::scope::ScopeId,
    mode: Mode,
    aliases: &'q [String],
    /// Subquery nesting below the expression being qualified.
    depth: usize,
    references: Vec<Reference>,
}

impl ColumnQualifier<'_, '_> {
    fn column(&mut self, expr: &mut Expr) -> Result<(), LineageError> {
        match expr {
            Expr::Identifier(ident) => {
                let ident = ident.clone();
                if self.mode == Mode::Lenient
                    && self.aliases.contains(&ident.value)
                    && !self.qualifier.is_known_column(&ident.value)
                {
                    return Ok(());
                }
                match self.qualifier.resolve_unqualified(&ident.value) {
                    Resolution::Found(relation) => {
                        let alias = self.qualifier.relation_alias(relation);
                        *expr = Expr::CompoundIdentifier(vec![self.qualifier.ident(&alias), ident.clone()]);
                        self.references.push(Reference::Column {
                            relation,
                            column: ident.value,
                        });
                    }
                    Resolution::Missing
                        if self.mode == Mode::Strict && ident.quote_style.is_some() =>
                    {
                        return Err(LineageError::qualification(
                            ident.to_string(),
                            "no relation in scope exposes this column",
                        ));
                    }
                    Resolution::Ambiguous | Resolution::Missing => {
                        #[cfg(feature = "tracing")]
                        trace!(column = %ident, scope = self.scope.0, "column left unresolved");
                        self.references.push(Reference::Unresolved {
                            column: ident.value,
                        });
                    }
                }
            }
            Expr::CompoundIdentifier(parts) if parts.len() >= 2 => {
                let reference = self.compound(parts)?;
                self.references.push(reference);
            }
            _ => {}
        }
        Ok(())
    }

    /// `alias.column`, `db.table.column` or `column.field...`.
    fn compound(&mut self, parts: &mut Vec<Ident>) -> Result<Reference, LineageError> {
        let qualifier = &*self.qualifier;
        let last = parts.len() - 1;

        if let Some(relation) = qualifier.find_alias(&parts[0].value) {
            self.check_quoted(relation, &parts[1])?;
            return Ok(Reference::Column {
                relation,
                column: parts[1].value.clone(),
            });
        }
        if last >= 2 {
            if let Some(relation) = qualifier.find_alias(&parts[last - 1].value) {
                self.check_quoted(relation, &parts[last])?;
                let column = parts[last].value.clone();
                parts.drain(..last - 1);
                return Ok(Reference::Column { relation, column });
            }
        }
        Ok(match qualifier.resolve_unqualified(&parts[0].value) {
            Resolution::Found(relation) => {
                let column = parts[0].value.clone();
                let alias = qualifier.ident(&qualifier.relation_alias(relation));
                parts.insert(0, alias);
                Reference::Column { relation, column }
            }
            Resolution::Ambiguous | Resolution::Missing => Reference::Unresolved {
                column: parts[last].value.clone(),
            },
        })
    }

    /// In a projection, a quoted column must exist in a relation whose
    /// columns are known.
    fn check_quoted(&self, relation: RelationRef, column: &Ident) -> Result<(), LineageError> {
        if self.mode != Mode::Strict || column.quote_style.is_none() {
            return Ok(());
        }
        let known = self
            .qualifier
            .index
            .relation(relation)
            .and_then(|owner| owner.known_columns(&self.qualifier.index));
        match known {
            Some(columns) if !columns.iter().any(|c| *c == column.value) => {
                Err(LineageError::qualification(
                    column.to_string(),
                    format!(
                        "relation '{}' has no such column",
                        self.qualifier.relation_alias(relation)
                    ),
                ))
            }
            _ => Ok(()),
        }
    }
}

impl VisitorMut for ColumnQualifier<'_, '_> {
    type Break = LineageError;

    fn pre_visit_query(&mut self, query: &mut Query) -> ControlFlow<LineageError> {
        if self.depth == 0 {
            let source_name = self.qualifier.source_name(self.scope);
            match self.qualifier.qualify_query(query, &source_name, false) {
                Ok(scope) => self.references.push(Reference::Subquery(scope)),
                Err(err) => return ControlFlow::Break(err),
            }
        }
        self.depth += 1;
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &mut Query) -> ControlFlow<LineageError> {
        self.depth -= 1;
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &mut Expr) -> ControlFlow<LineageError> {
        if self.depth > 0 {
            return ControlFlow::Continue(());
        }
        match self.column(expr) {
            Ok(()) => ControlFlow::Continue(()),
            Err(err) => ControlFlow::Break(err),
        }
    }
}
