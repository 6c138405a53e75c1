//! Recursive resolution of one output column into a [`Node`] graph.

use std::collections::HashSet;

use sqlparser::ast::{Expr, Ident, SelectItem};
#[cfg(feature = "tracing")]
use tracing::{debug, trace};

use super::trim::trim_projection;
use super::{Node, SqlFragment};
use crate::error::LineageError;
use crate::parser::ColumnIdent;
use crate::scope::{
    PivotRelation, Projection, Reference, Relation, RelationRef, ScopeBody, ScopeId, ScopeIndex,
};

/// Which output of a scope is being resolved.
#[derive(Debug, Clone, Copy)]
struct Target<'c> {
    column: &'c str,
    /// Position in the select list; set operations match branches by it.
    slot: Option<usize>,
}

pub(crate) struct LineageBuilder<'i> {
    index: &'i ScopeIndex,
    trim: bool,
    /// `(scope, column)` pairs on the current resolution path.
    path: HashSet<(ScopeId, String)>,
}

impl<'i> LineageBuilder<'i> {
    pub fn new(index: &'i ScopeIndex, trim: bool) -> Self {
        Self {
            index,
            trim,
            path: HashSet::new(),
        }
    }

    /// Resolves `column` in the root scope.
    pub fn build(mut self, column: &ColumnIdent) -> Result<Node, LineageError> {
        let index = self.index;
        let root = index.root;
        #[cfg(feature = "tracing")]
        debug!(column = %column.value, scopes = self.index.scopes.len(), "building lineage");

        let not_found = || {
            if column.quoted {
                LineageError::qualification(
                    column.value.clone(),
                    "the query has no output column with this exact name",
                )
            } else {
                LineageError::ColumnNotFound {
                    column: column.value.clone(),
                }
            }
        };

        let target = Target {
            column: &column.value,
            slot: None,
        };
        match &index.scope(root).body {
            ScopeBody::Select(select) => {
                if select.projection(&column.value).is_none() && select.star.is_none() {
                    return Err(not_found());
                }
                self.scope_nodes(root, target, column.value.clone(), "")
                    .pop()
                    .ok_or_else(not_found)
            }
            ScopeBody::SetOperation(branches) => {
                let slot = index
                    .output_names(root)
                    .and_then(|names| names.iter().position(|name| *name == column.value));
                let expression = branches
                    .first()
                    .and_then(|branch| match branch {
                        Relation::SetOperationBranch { scope, .. } => {
                            self.select_item(*scope, Target { slot, ..target })
                        }
                        _ => None,
                    })
                    .ok_or_else(not_found)?;
                let downstream = self.branch_nodes(root, Target { slot, ..target }, "");
                Ok(self.node(
                    root,
                    column.value.clone(),
                    SqlFragment::SelectItem(Box::new(expression)),
                    index.scope(root).rendered.clone(),
                    "",
                    downstream,
                ))
            }
        }
    }

    fn node(
        &self,
        scope: ScopeId,
        name: String,
        expression: SqlFragment,
        source: SqlFragment,
        reference_node_name: &str,
        downstream: Vec<Node>,
    ) -> Node {
        Node {
            name,
            expression,
            source,
            source_name: self.index.scope(scope).source_name.clone(),
            reference_node_name: reference_node_name.to_string(),
            downstream,
            markers: self.index.markers.clone(),
        }
    }

    fn unknown(&self, scope: ScopeId) -> Node {
        self.node(
            scope,
            "?".to_string(),
            SqlFragment::Unknown,
            SqlFragment::Unknown,
            "",
            Vec::new(),
        )
    }

    /// The select item producing `target` in a select scope.
    fn select_item(&self, scope: ScopeId, target: Target<'_>) -> Option<SelectItem> {
        let index = self.index;
        let ScopeBody::Select(select) = &index.scope(scope).body else {
            return None;
        };
        self.projection(scope, target)
            .map(|projection| projection.item.clone())
            .or_else(|| select.star.clone())
    }

    fn projection(&self, scope: ScopeId, target: Target<'_>) -> Option<&'i Projection> {
        let index = self.index;
        let ScopeBody::Select(select) = &index.scope(scope).body else {
            return None;
        };
        match target.slot {
            Some(slot) if select.star.is_none() => select.projections.get(slot),
            _ => select.projection(target.column),
        }
    }

    /// Nodes for one output of `scope`: a single node for a select scope, one
    /// per branch for a set operation.
    fn scope_nodes(
        &mut self,
        scope: ScopeId,
        target: Target<'_>,
        name: String,
        reference_node_name: &str,
    ) -> Vec<Node> {
        let key = (scope, target.column.to_string());
        if !self.path.insert(key.clone()) {
            #[cfg(feature = "tracing")]
            trace!(column = target.column, scope = scope.0, "column already on path");
            return Vec::new();
        }

        let index = self.index;
        let nodes = match &index.scope(scope).body {
            ScopeBody::SetOperation(_) => self.branch_nodes(scope, target, reference_node_name),
            ScopeBody::Select(select) => {
                if let Some(projection) = self.projection(scope, target) {
                    vec![self.projection_node(scope, projection, name, reference_node_name)]
                } else if let Some(star) = &select.star {
                    vec![self.star_node(scope, star, name, reference_node_name)]
                } else {
                    #[cfg(feature = "tracing")]
                    trace!(column = target.column, scope = scope.0, "no projection produces column");
                    vec![self.unknown(scope)]
                }
            }
        };

        self.path.remove(&key);
        nodes
    }

    /// One node per branch of a set operation, named by branch position.
    fn branch_nodes(
        &mut self,
        scope: ScopeId,
        target: Target<'_>,
        reference_node_name: &str,
    ) -> Vec<Node> {
        let index = self.index;
        let ScopeBody::SetOperation(branches) = &index.scope(scope).body else {
            return Vec::new();
        };
        let slot = target.slot.or_else(|| {
            index
                .output_names(scope)
                .and_then(|names| names.iter().position(|name| name == target.column))
        });

        let mut nodes = Vec::with_capacity(branches.len());
        for branch in branches {
            if let Relation::SetOperationBranch { index, scope } = branch {
                nodes.extend(self.scope_nodes(
                    *scope,
                    Target { slot, ..target },
                    index.to_string(),
                    reference_node_name,
                ));
            }
        }
        nodes
    }

    fn projection_node(
        &mut self,
        scope: ScopeId,
        projection: &Projection,
        name: String,
        reference_node_name: &str,
    ) -> Node {
        let rendered = &self.index.scope(scope).rendered;
        let source = if self.trim {
            trim_projection(rendered, &projection.item)
        } else {
            rendered.clone()
        };

        let mut seen = Vec::new();
        let mut downstream = Vec::new();
        for reference in &projection.references {
            if seen.contains(&reference) {
                continue;
            }
            seen.push(reference);
            downstream.extend(self.reference_nodes(scope, reference));
        }

        self.node(
            scope,
            name,
            SqlFragment::SelectItem(Box::new(projection.item.clone())),
            source,
            reference_node_name,
            downstream,
        )
    }

    /// A column that only an unexpanded `*` can produce. Its children mark
    /// every relation the star reads from.
    fn star_node(
        &mut self,
        scope: ScopeId,
        star: &SelectItem,
        name: String,
        reference_node_name: &str,
    ) -> Node {
        let index = self.index;
        let rendered = &index.scope(scope).rendered;
        let source = if self.trim {
            trim_projection(rendered, star)
        } else {
            rendered.clone()
        };
        let downstream = match &index.scope(scope).body {
            ScopeBody::Select(select) => select
                .relations
                .iter()
                .map(|relation| {
                    let fragment = self.relation_fragment(relation);
                    self.node(scope, "*".to_string(), fragment.clone(), fragment, "", Vec::new())
                })
                .collect(),
            ScopeBody::SetOperation(_) => Vec::new(),
        };
        self.node(
            scope,
            name,
            SqlFragment::SelectItem(Box::new(star.clone())),
            source,
            reference_node_name,
            downstream,
        )
    }

    fn relation_fragment(&self, relation: &Relation) -> SqlFragment {
        match relation {
            Relation::BaseTable { factor, .. } => SqlFragment::TableFactor(Box::new(factor.clone())),
            Relation::DerivedTable { scope, .. }
            | Relation::CteRef { scope, .. }
            | Relation::SetOperationBranch { scope, .. } => self.index.scope(*scope).rendered.clone(),
            Relation::Pivot(pivot) => SqlFragment::TableFactor(Box::new(pivot.factor.clone())),
            Relation::LateralFunction(lateral) => {
                SqlFragment::TableFactor(Box::new(lateral.factor.clone()))
            }
        }
    }

    fn reference_nodes(&mut self, scope: ScopeId, reference: &Reference) -> Vec<Node> {
        let index = self.index;
        match reference {
            Reference::Column { relation, column } => match index.relation(*relation) {
                Some(owner) => self.relation_nodes(*relation, owner, column),
                None => vec![self.unknown(scope)],
            },
            Reference::Subquery(subquery) => self.subquery_nodes(*subquery),
            Reference::Unresolved { .. } => vec![self.unknown(scope)],
        }
    }

    /// One node per output of a scalar, `IN` or `EXISTS` subquery.
    fn subquery_nodes(&mut self, subquery: ScopeId) -> Vec<Node> {
        let index = self.index;
        let mut outputs = index.output_names(subquery).unwrap_or_default();
        if let ScopeBody::Select(select) = &index.scope(subquery).body {
            if select.star.is_some() {
                outputs.push("*".to_string());
            }
        }
        let mut nodes = Vec::new();
        for output in outputs {
            let target = Target {
                column: &output,
                slot: None,
            };
            nodes.extend(self.scope_nodes(subquery, target, output.clone(), ""));
        }
        nodes
    }

    /// Whether a pivot passes `column` through from its input unchanged.
    fn passes_through(&self, pivot: &PivotRelation, column: &str) -> bool {
        pivot
            .input
            .known_columns(self.index)
            .map_or(true, |columns| columns.iter().any(|known| known == column))
    }

    fn relation_nodes(
        &mut self,
        owner: RelationRef,
        relation: &'i Relation,
        column: &str,
    ) -> Vec<Node> {
        match relation {
            Relation::BaseTable {
                alias,
                factor,
                inline_values,
                ..
            } => {
                let source = SqlFragment::TableFactor(Box::new(factor.clone()));
                let expression = if *inline_values {
                    SqlFragment::Expr(Box::new(Expr::Identifier(Ident::new(column))))
                } else {
                    source.clone()
                };
                vec![self.node(
                    owner.scope,
                    format!("{alias}.{column}"),
                    expression,
                    source,
                    "",
                    Vec::new(),
                )]
            }
            Relation::DerivedTable {
                alias,
                scope,
                columns,
            } => {
                let reference = if self.index.scope(*scope).substituted {
                    ""
                } else {
                    alias.as_str()
                };
                self.inner_nodes(*scope, columns.as_deref(), alias, column, reference)
            }
            Relation::CteRef {
                alias,
                cte,
                scope,
                columns,
            } => self.inner_nodes(*scope, columns.as_deref(), alias, column, cte),
            Relation::SetOperationBranch { .. } => Vec::new(),
            Relation::Pivot(pivot) => {
                let aggregated = pivot
                    .aggregates
                    .iter()
                    .find(|aggregate| aggregate.outputs.iter().any(|output| output == column));
                match aggregated {
                    Some(aggregate) => aggregate
                        .columns
                        .iter()
                        .flat_map(|input| self.relation_nodes(owner, &pivot.input, input))
                        .collect(),
                    None if pivot.output.is_some() && !self.passes_through(pivot, column) => {
                        vec![self.unknown(owner.scope)]
                    }
                    None => self.relation_nodes(owner, &pivot.input, column),
                }
            }
            Relation::LateralFunction(lateral) => {
                let downstream = if lateral.structural.iter().any(|s| s == column) {
                    Vec::new()
                } else {
                    let mut seen = Vec::new();
                    let mut nodes = Vec::new();
                    for reference in &lateral.references {
                        if !seen.contains(&reference) {
                            seen.push(reference);
                            nodes.extend(self.reference_nodes(owner.scope, reference));
                        }
                    }
                    nodes
                };
                vec![self.node(
                    owner.scope,
                    format!("{}.{column}", lateral.alias),
                    SqlFragment::Expr(Box::new(Expr::Identifier(Ident::new(column)))),
                    SqlFragment::TableFactor(Box::new(lateral.factor.clone())),
                    "",
                    downstream,
                )]
            }
        }
    }

    /// Recurses into a derived table or CTE, mapping renamed alias columns
    /// back to the inner projection by position.
    fn inner_nodes(
        &mut self,
        scope: ScopeId,
        alias_columns: Option<&[String]>,
        alias: &str,
        column: &str,
        reference_node_name: &str,
    ) -> Vec<Node> {
        let slot = alias_columns.and_then(|columns| columns.iter().position(|c| c == column));
        let inner = slot
            .and_then(|slot| {
                self.index
                    .output_names(scope)
                    .and_then(|names| names.get(slot).cloned())
            })
            .unwrap_or_else(|| column.to_string());
        let target = Target {
            column: &inner,
            slot,
        };
        self.scope_nodes(scope, target, format!("{alias}.{column}"), reference_node_name)
    }
}
