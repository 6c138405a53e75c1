//! Scope qualification.
//!
//! The [`Qualifier`] walks a parsed query once. For every scope it resolves the
//! FROM clause into [`Relation`]s, expands wildcards whose columns are known,
//! binds each column reference to the relation that owns it and rewrites the
//! reference as `alias.column`. Caller-supplied sources are spliced in as
//! derived tables on the way. The result is a [`ScopeIndex`] holding each
//! scope's bindings next to a frozen copy of its qualified text.

mod catalog;
mod columns;
mod relations;
mod substitute;

use std::collections::{BTreeMap, BTreeSet, HashSet};

use sqlparser::ast::{
    Expr, GroupByExpr, Query, Select, SelectItem, SelectItemQualifiedWildcardKind, SetExpr,
    TableFactor, TableWithJoins, WildcardAdditionalOptions,
};
#[cfg(feature = "tracing")]
use tracing::debug;

pub(crate) use catalog::{SchemaCatalog, SourceCatalog};
use columns::Mode;

use crate::ast;
use crate::error::LineageError;
use crate::lineage::SqlFragment;
use crate::normalize::{normalize_query, SyntheticAliases};
use crate::scope::{
    Projection, Relation, Scope, ScopeBody, ScopeId, ScopeIndex, SelectScope, SourceMarker,
};
use crate::types::{Dialect, NormalizationStrategy};

#[derive(Debug)]
struct CteBinding {
    name: String,
    scope: ScopeId,
    columns: Option<Vec<String>>,
}

/// Builds a [`ScopeIndex`] for one lineage call.
pub(crate) struct Qualifier<'a> {
    dialect: Dialect,
    strategy: NormalizationStrategy,
    schema: &'a SchemaCatalog,
    sources: &'a SourceCatalog<'a>,
    names: SyntheticAliases,
    function_aliases: usize,
    index: ScopeIndex,
    /// Reserved in pre-order, filled once the substituted scope is complete.
    markers: Vec<Option<SourceMarker>>,
    /// One frame of CTE definitions per enclosing query.
    ctes: Vec<Vec<CteBinding>>,
    /// Select scopes whose relations are visible to the expression being
    /// qualified, innermost last.
    outer: Vec<ScopeId>,
    /// Columns joined with `USING`, per scope.
    using: BTreeMap<ScopeId, BTreeSet<String>>,
    /// Sources being substituted; a reference back to one stays a table.
    active_sources: Vec<&'a str>,
}

impl<'a> Qualifier<'a> {
    pub fn new(
        dialect: Dialect,
        strategy: NormalizationStrategy,
        schema: &'a SchemaCatalog,
        sources: &'a SourceCatalog<'a>,
    ) -> Self {
        Self {
            dialect,
            strategy,
            schema,
            sources,
            names: SyntheticAliases::default(),
            function_aliases: 0,
            index: ScopeIndex {
                scopes: Vec::new(),
                markers: Vec::<SourceMarker>::new().into(),
                root: ScopeId(0),
            },
            markers: Vec::new(),
            ctes: Vec::new(),
            outer: Vec::new(),
            using: BTreeMap::new(),
            active_sources: Vec::new(),
        }
    }

    /// Qualifies `query` and every source substituted into it.
    pub fn qualify(mut self, mut query: Query) -> Result<ScopeIndex, LineageError> {
        self.prepare(&mut query);
        let root = self.qualify_query(&mut query, "", false)?;
        self.sources.check_quoted_keys()?;

        let mut index = self.index;
        index.root = root;
        // Identical substitutions render identically; one marker covers them all.
        let mut seen = HashSet::new();
        index.markers = self
            .markers
            .into_iter()
            .flatten()
            .filter(|marker| seen.insert(marker.text.clone()))
            .collect();
        Ok(index)
    }

    /// Normalizes identifiers and names unaliased derived tables.
    fn prepare(&mut self, query: &mut Query) {
        normalize_query(query, self.strategy);
        self.names.assign(query);
    }

    fn ident(&self, value: &str) -> sqlparser::ast::Ident {
        ast::ident(value, self.dialect, self.strategy)
    }

    fn alloc(&mut self, source_name: &str, substituted: bool) -> ScopeId {
        let id = ScopeId(self.index.scopes.len());
        self.index.scopes.push(Scope {
            source_name: source_name.to_string(),
            substituted,
            body: ScopeBody::Select(SelectScope::default()),
            rendered: SqlFragment::Unknown,
        });
        id
    }

    fn source_name(&self, scope: ScopeId) -> String {
        self.index.scope(scope).source_name.clone()
    }

    fn relations(&self, scope: ScopeId) -> &[Relation] {
        match &self.index.scope(scope).body {
            ScopeBody::Select(select) => &select.relations,
            ScopeBody::SetOperation(_) => &[],
        }
    }

    fn select_scope_mut(&mut self, scope: ScopeId) -> Option<&mut SelectScope> {
        match &mut self.index.scopes[scope.0].body {
            ScopeBody::Select(select) => Some(select),
            ScopeBody::SetOperation(_) => None,
        }
    }

    fn visible_cte(&self, name: &str) -> Option<&CteBinding> {
        self.ctes
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev())
            .find(|cte| cte.name == name)
    }

    /// Runs `f` with no enclosing scopes visible.
    fn isolated<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = std::mem::take(&mut self.outer);
        let result = f(self);
        self.outer = saved;
        result
    }

    fn qualify_query(
        &mut self,
        query: &mut Query,
        source_name: &str,
        substituted: bool,
    ) -> Result<ScopeId, LineageError> {
        self.ctes.push(Vec::new());
        if let Some(with) = &mut query.with {
            for cte in &mut with.cte_tables {
                let scope =
                    self.isolated(|this| this.qualify_query(&mut cte.query, source_name, false))?;
                let binding = CteBinding {
                    name: cte.alias.name.value.clone(),
                    scope,
                    columns: ast::alias_column_names(&cte.alias),
                };
                if let Some(frame) = self.ctes.last_mut() {
                    frame.push(binding);
                }
            }
        }
        let id = self.qualify_body(&mut query.body, source_name, substituted)?;
        self.ctes.pop();

        self.index.scopes[id.0].rendered = SqlFragment::Query(Box::new(query.clone()));
        Ok(id)
    }

    fn qualify_body(
        &mut self,
        body: &mut SetExpr,
        source_name: &str,
        substituted: bool,
    ) -> Result<ScopeId, LineageError> {
        match body {
            SetExpr::Select(select) => self.qualify_select(select, source_name, substituted),
            SetExpr::Query(query) => self.qualify_query(query, source_name, substituted),
            SetExpr::SetOperation { .. } => {
                let id = self.alloc(source_name, substituted);
                let mut leaves = Vec::new();
                set_operation_leaves(body, &mut leaves);
                let mut branches = Vec::with_capacity(leaves.len());
                for (index, leaf) in leaves.into_iter().enumerate() {
                    let scope = self.qualify_body(leaf, source_name, false)?;
                    branches.push(Relation::SetOperationBranch { index, scope });
                }
                let scope = &mut self.index.scopes[id.0];
                scope.body = ScopeBody::SetOperation(branches);
                scope.rendered = SqlFragment::SetExpr(Box::new(body.clone()));
                Ok(id)
            }
            SetExpr::Values(_) => {
                let id = self.alloc(source_name, substituted);
                self.index.scopes[id.0].rendered = SqlFragment::SetExpr(Box::new(body.clone()));
                Ok(id)
            }
            other => Err(LineageError::Unsupported(format!(
                "cannot trace columns through `{other}`"
            ))),
        }
    }

    fn qualify_select(
        &mut self,
        select: &mut Select,
        source_name: &str,
        substituted: bool,
    ) -> Result<ScopeId, LineageError> {
        let id = self.alloc(source_name, substituted);
        self.outer.push(id);

        for from in &mut select.from {
            self.register_table_with_joins(from, id)?;
        }

        let star = self.expand_wildcards(&mut select.projection, id);
        let projections = self.qualify_projections(&mut select.projection, id)?;
        let aliases: Vec<String> = projections.iter().map(|p| p.name.clone()).collect();
        if let Some(scope) = self.select_scope_mut(id) {
            scope.projections = projections;
            scope.star = star;
        }

        self.qualify_clauses(select, id, &aliases)?;
        self.outer.pop();

        self.index.scopes[id.0].rendered =
            SqlFragment::SetExpr(Box::new(SetExpr::Select(Box::new(select.clone()))));
        Ok(id)
    }

    fn register_table_with_joins(
        &mut self,
        from: &mut TableWithJoins,
        scope: ScopeId,
    ) -> Result<(), LineageError> {
        self.register_factor(&mut from.relation, scope)?;
        for join in &mut from.joins {
            self.register_factor(&mut join.relation, scope)?;
            let using = ast::join_using_columns(&join.join_operator);
            if !using.is_empty() {
                self.using.entry(scope).or_default().extend(using);
            }
        }
        Ok(())
    }

    fn register_factor(
        &mut self,
        factor: &mut TableFactor,
        scope: ScopeId,
    ) -> Result<(), LineageError> {
        if let TableFactor::NestedJoin {
            table_with_joins, ..
        } = factor
        {
            return self.register_table_with_joins(table_with_joins, scope);
        }
        let relation = self.relation_for(factor, scope)?;
        if let Some(select) = self.select_scope_mut(scope) {
            select.relations.push(relation);
        }
        Ok(())
    }

    /// Expands `*` and `alias.*` whose columns are known; returns the first
    /// wildcard that had to stay.
    fn expand_wildcards(
        &mut self,
        projection: &mut Vec<SelectItem>,
        scope: ScopeId,
    ) -> Option<SelectItem> {
        let mut star = None;
        let mut expanded = Vec::with_capacity(projection.len());
        for item in std::mem::take(projection) {
            match self.expand_wildcard(&item, scope) {
                Some(items) => expanded.extend(items),
                None => {
                    if star.is_none()
                        && matches!(
                            item,
                            SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..)
                        )
                    {
                        #[cfg(feature = "tracing")]
                        debug!(wildcard = %item, "wildcard left unexpanded");
                        star = Some(item.clone());
                    }
                    expanded.push(item);
                }
            }
        }
        *projection = expanded;
        star
    }

    fn expand_wildcard(&self, item: &SelectItem, scope: ScopeId) -> Option<Vec<SelectItem>> {
        match item {
            SelectItem::Wildcard(options) if is_plain_wildcard(options) => {
                let relations = self.relations(scope);
                if relations.is_empty() {
                    return None;
                }
                let mut items = Vec::new();
                for relation in relations {
                    if relation.alias().is_empty() {
                        return None;
                    }
                    let columns = relation.known_columns(&self.index)?;
                    items.extend(
                        columns
                            .iter()
                            .map(|column| self.column_item(relation.alias(), column)),
                    );
                }
                Some(items)
            }
            SelectItem::QualifiedWildcard(SelectItemQualifiedWildcardKind::ObjectName(name), options)
                if is_plain_wildcard(options) =>
            {
                let alias = ast::last_name_part(name);
                let relation = self
                    .relations(scope)
                    .iter()
                    .find(|relation| relation.alias() == alias)?;
                let columns = relation.known_columns(&self.index)?;
                Some(
                    columns
                        .iter()
                        .map(|column| self.column_item(&alias, column))
                        .collect(),
                )
            }
            _ => None,
        }
    }

    /// `alias.column AS column`
    fn column_item(&self, alias: &str, column: &str) -> SelectItem {
        SelectItem::ExprWithAlias {
            expr: Expr::CompoundIdentifier(vec![self.ident(alias), self.ident(column)]),
            alias: self.ident(column),
        }
    }

    /// Qualifies the select list and gives every item an output name.
    fn qualify_projections(
        &mut self,
        projection: &mut Vec<SelectItem>,
        scope: ScopeId,
    ) -> Result<Vec<Projection>, LineageError> {
        let mut projections = Vec::new();
        let mut items = Vec::with_capacity(projection.len());
        for (position, item) in std::mem::take(projection).into_iter().enumerate() {
            let (mut expr, alias) = match item {
                SelectItem::UnnamedExpr(expr) => {
                    let alias = match &expr {
                        Expr::Identifier(ident) => ident.clone(),
                        Expr::CompoundIdentifier(parts) if !parts.is_empty() => {
                            parts[parts.len() - 1].clone()
                        }
                        _ => self.ident(&format!("_col_{position}")),
                    };
                    (expr, alias)
                }
                SelectItem::ExprWithAlias { expr, alias } => (expr, alias),
                wildcard => {
                    items.push(wildcard);
                    continue;
                }
            };
            let references = self.qualify_expr(&mut expr, scope, Mode::Strict, &[])?;
            let item = SelectItem::ExprWithAlias {
                expr,
                alias: alias.clone(),
            };
            projections.push(Projection {
                name: alias.value,
                item: item.clone(),
                references,
            });
            items.push(item);
        }
        *projection = items;
        Ok(projections)
    }

    /// Qualifies join conditions and filters. References found here do not
    /// feed any projection.
    fn qualify_clauses(
        &mut self,
        select: &mut Select,
        scope: ScopeId,
        aliases: &[String],
    ) -> Result<(), LineageError> {
        for from in &mut select.from {
            self.qualify_join_conditions(from, scope)?;
        }

        let Select {
            prewhere,
            selection,
            having,
            qualify,
            group_by,
            ..
        } = select;
        for expr in prewhere
            .iter_mut()
            .chain(selection.iter_mut())
            .chain(having.iter_mut())
            .chain(qualify.iter_mut())
        {
            self.qualify_expr(expr, scope, Mode::Lenient, aliases)?;
        }
        if let GroupByExpr::Expressions(exprs, _) = group_by {
            for expr in exprs {
                self.qualify_expr(expr, scope, Mode::Lenient, aliases)?;
            }
        }
        Ok(())
    }

    fn qualify_join_conditions(
        &mut self,
        from: &mut TableWithJoins,
        scope: ScopeId,
    ) -> Result<(), LineageError> {
        if let TableFactor::NestedJoin {
            table_with_joins, ..
        } = &mut from.relation
        {
            self.qualify_join_conditions(table_with_joins, scope)?;
        }
        for join in &mut from.joins {
            if let TableFactor::NestedJoin {
                table_with_joins, ..
            } = &mut join.relation
            {
                self.qualify_join_conditions(table_with_joins, scope)?;
            }
            if let Some(on) = ast::join_on_expr_mut(&mut join.join_operator) {
                self.qualify_expr(on, scope, Mode::Lenient, &[])?;
            }
        }
        Ok(())
    }
}

fn is_plain_wildcard(options: &WildcardAdditionalOptions) -> bool {
    options.opt_ilike.is_none()
        && options.opt_exclude.is_none()
        && options.opt_except.is_none()
        && options.opt_replace.is_none()
        && options.opt_rename.is_none()
}

/// Branches of a set operation, left to right, with nested operations flattened.
fn set_operation_leaves<'b>(body: &'b mut SetExpr, leaves: &mut Vec<&'b mut SetExpr>) {
    match body {
        SetExpr::SetOperation { left, right, .. } => {
            set_operation_leaves(left, leaves);
            set_operation_leaves(right, leaves);
        }
        leaf => leaves.push(leaf),
    }
}
