//! Identifier normalization and synthetic aliasing.
//!
//! Both passes run over a freshly parsed query before qualification: once for
//! the traced query and once for every substituted source as it is spliced in.

use std::ops::ControlFlow;

use sqlparser::ast::{
    Expr, Ident, ObjectName, ObjectNamePart, PivotValueSource, Query, SelectItem, SetExpr,
    TableAlias, TableFactor, VisitMut, VisitorMut,
};

use crate::ast;
use crate::types::NormalizationStrategy;

/// Folds every unquoted identifier in `query` with `strategy`.
///
/// Column references, table names, table and column aliases, CTE names and
/// projection aliases are folded; quoted identifiers, function names and
/// literals are left as written.
pub(crate) fn normalize_query(query: &mut Query, strategy: NormalizationStrategy) {
    let mut normalizer = Normalizer { strategy };
    let _ = query.visit(&mut normalizer);
}

struct Normalizer {
    strategy: NormalizationStrategy,
}

impl Normalizer {
    fn fold(&self, ident: &mut Ident) {
        if ident.quote_style.is_none() {
            ident.value = self.strategy.fold(&ident.value);
        }
    }

    fn fold_alias(&self, alias: &mut Option<TableAlias>) {
        if let Some(alias) = alias {
            self.fold(&mut alias.name);
            for column in &mut alias.columns {
                self.fold(&mut column.name);
            }
        }
    }

    fn fold_projection_aliases(&self, body: &mut SetExpr) {
        match body {
            SetExpr::Select(select) => {
                for item in &mut select.projection {
                    if let SelectItem::ExprWithAlias { alias, .. } = item {
                        self.fold(alias);
                    }
                }
            }
            SetExpr::SetOperation { left, right, .. } => {
                self.fold_projection_aliases(left);
                self.fold_projection_aliases(right);
            }
            // Nested queries are visited on their own.
            _ => {}
        }
    }
}

impl VisitorMut for Normalizer {
    type Break = ();

    fn pre_visit_query(&mut self, query: &mut Query) -> ControlFlow<()> {
        if let Some(with) = &mut query.with {
            for cte in &mut with.cte_tables {
                self.fold(&mut cte.alias.name);
                for column in &mut cte.alias.columns {
                    self.fold(&mut column.name);
                }
            }
        }
        self.fold_projection_aliases(&mut query.body);
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &mut ObjectName) -> ControlFlow<()> {
        for part in &mut relation.0 {
            if let ObjectNamePart::Identifier(ident) = part {
                self.fold(ident);
            }
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, factor: &mut TableFactor) -> ControlFlow<()> {
        match factor {
            TableFactor::Pivot {
                aggregate_functions,
                value_source,
                alias,
                ..
            } => {
                for aggregate in aggregate_functions {
                    if let Some(name) = &mut aggregate.alias {
                        self.fold(name);
                    }
                }
                if let PivotValueSource::List(values) = value_source {
                    for value in values {
                        if let Some(name) = &mut value.alias {
                            self.fold(name);
                        }
                    }
                }
                self.fold_alias(alias);
            }
            TableFactor::Table { alias, .. }
            | TableFactor::Derived { alias, .. }
            | TableFactor::TableFunction { alias, .. }
            | TableFactor::Function { alias, .. }
            | TableFactor::UNNEST { alias, .. }
            | TableFactor::NestedJoin { alias, .. }
            | TableFactor::Unpivot { alias, .. } => self.fold_alias(alias),
            _ => {}
        }
        if let TableFactor::UNNEST {
            with_offset_alias: Some(offset),
            ..
        } = factor
        {
            self.fold(offset);
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &mut Expr) -> ControlFlow<()> {
        match expr {
            Expr::Identifier(ident) => self.fold(ident),
            Expr::CompoundIdentifier(parts) => {
                for ident in parts {
                    self.fold(ident);
                }
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }
}

/// Hands out `_q_<n>` names to unaliased derived tables.
///
/// One instance lives for one lineage call, so names keep counting across the
/// traced query and every source substituted into it.
#[derive(Debug, Default)]
pub(crate) struct SyntheticAliases {
    next: usize,
}

impl SyntheticAliases {
    /// Names the unaliased derived tables of `query` in text order.
    pub(crate) fn assign(&mut self, query: &mut Query) {
        let _ = query.visit(self);
    }

    pub(crate) fn next_name(&mut self) -> String {
        let name = format!("_q_{}", self.next);
        self.next += 1;
        name
    }
}

impl VisitorMut for SyntheticAliases {
    type Break = ();

    fn pre_visit_table_factor(&mut self, factor: &mut TableFactor) -> ControlFlow<()> {
        if let TableFactor::Derived { alias, .. } = factor {
            if alias.is_none() {
                *alias = Some(ast::table_alias(Ident::new(self.next_name()), Vec::new()));
            }
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_query;
    use crate::types::Dialect;

    fn normalized(sql: &str, dialect: Dialect) -> String {
        let mut query = parse_query(sql, dialect).unwrap();
        normalize_query(&mut query, dialect.normalization_strategy());
        query.to_string()
    }

    #[test]
    fn test_folds_unquoted_identifiers() {
        assert_eq!(
            normalized("SELECT T.A AS Total FROM Db.Tbl AS T", Dialect::Postgres),
            "SELECT t.a AS total FROM db.tbl AS t"
        );
        assert_eq!(
            normalized("select a from x", Dialect::Snowflake),
            "SELECT A FROM X"
        );
    }

    #[test]
    fn test_keeps_quoted_identifiers() {
        assert_eq!(
            normalized("SELECT \"MixedCase\", Other FROM t", Dialect::Postgres),
            "SELECT \"MixedCase\", other FROM t"
        );
    }

    #[test]
    fn test_folds_cte_names_and_function_names_untouched() {
        assert_eq!(
            normalized("WITH Foo AS (SELECT 1 AS A) SELECT COUNT(A) FROM Foo", Dialect::Postgres),
            "WITH foo AS (SELECT 1 AS a) SELECT COUNT(a) FROM foo"
        );
    }

    #[test]
    fn test_synthetic_aliases_follow_text_order() {
        let mut query = parse_query(
            "SELECT * FROM (SELECT 1 AS a) JOIN (SELECT 2 AS b) ON TRUE",
            Dialect::Generic,
        )
        .unwrap();
        let mut names = SyntheticAliases::default();
        names.assign(&mut query);
        assert_eq!(
            query.to_string(),
            "SELECT * FROM (SELECT 1 AS a) AS _q_0 JOIN (SELECT 2 AS b) AS _q_1 ON TRUE"
        );
        assert_eq!(names.next_name(), "_q_2");
    }
}
