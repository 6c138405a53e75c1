//! FROM clause entries resolved into [`Relation`]s.

use std::ops::ControlFlow;

use sqlparser::ast::{
    visit_expressions, Expr, ExprWithAlias, FunctionArg, Ident, PivotValueSource, SetExpr,
    TableAlias, TableFactor, Value,
};
#[cfg(feature = "tracing")]
use tracing::trace;

use super::columns::Mode;
use super::Qualifier;
use crate::ast;
use crate::error::LineageError;
use crate::scope::{LateralRelation, PivotAggregate, PivotRelation, Reference, Relation, ScopeId};
use crate::types::NormalizationStrategy;

/// Output columns of a flatten-style table function, in order.
const FLATTEN_COLUMNS: [&str; 6] = ["SEQ", "KEY", "PATH", "INDEX", "VALUE", "THIS"];
/// Leading flatten columns that describe position rather than carry data.
const FLATTEN_STRUCTURAL: usize = 4;

fn is_flatten(function: &str) -> bool {
    function.eq_ignore_ascii_case("flatten")
}

impl Qualifier<'_> {
    pub(super) fn relation_for(
        &mut self,
        factor: &mut TableFactor,
        scope: ScopeId,
    ) -> Result<Relation, LineageError> {
        match factor {
            TableFactor::Table { args: Some(_), .. }
            | TableFactor::Function { .. }
            | TableFactor::TableFunction { .. } => self.function_relation(factor, scope),
            TableFactor::Table { name, alias, .. } => {
                let parts = ast::name_parts(name);
                let alias = alias.clone();
                self.table_relation(factor, parts, alias)
            }
            TableFactor::Derived {
                lateral,
                subquery,
                alias,
                ..
            } => {
                let alias = match alias {
                    Some(alias) => alias.clone(),
                    None => ast::table_alias(Ident::new(self.names.next_name()), Vec::new()),
                };
                if let SetExpr::Values(values) = subquery.body.as_ref() {
                    let width = values.rows.first().map_or(0, Vec::len);
                    let columns = ast::alias_column_names(&alias)
                        .unwrap_or_else(|| (1..=width).map(|i| format!("column{i}")).collect());
                    return Ok(Relation::BaseTable {
                        alias: alias.name.value.clone(),
                        columns: Some(columns),
                        factor: factor.clone(),
                        inline_values: true,
                    });
                }

                let source_name = self.source_name(scope);
                let child = if *lateral {
                    self.qualify_query(subquery, &source_name, false)?
                } else {
                    self.isolated(|this| this.qualify_query(subquery, &source_name, false))?
                };
                Ok(Relation::DerivedTable {
                    alias: alias.name.value.clone(),
                    scope: child,
                    columns: ast::alias_column_names(&alias),
                })
            }
            TableFactor::UNNEST { .. } => self.unnest_relation(factor, scope),
            TableFactor::Pivot { .. } => self.pivot_relation(factor, scope),
            TableFactor::Unpivot { table, alias, .. } => {
                let input = self.relation_for(table, scope)?;
                let alias = alias
                    .as_ref()
                    .map(|alias| alias.name.value.clone())
                    .unwrap_or_else(|| input.alias().to_string());
                Ok(Relation::Pivot(Box::new(PivotRelation {
                    alias,
                    input,
                    aggregates: Vec::new(),
                    output: None,
                    factor: factor.clone(),
                })))
            }
            _ => {
                #[cfg(feature = "tracing")]
                trace!(factor = %factor, "table factor treated as an opaque table");
                Ok(Relation::BaseTable {
                    alias: String::new(),
                    columns: None,
                    factor: factor.clone(),
                    inline_values: false,
                })
            }
        }
    }

    /// A named table: a visible CTE, a substituted source, or a physical table.
    fn table_relation(
        &mut self,
        factor: &mut TableFactor,
        parts: Vec<String>,
        alias: Option<TableAlias>,
    ) -> Result<Relation, LineageError> {
        let table = parts.last().cloned().unwrap_or_default();
        let alias_name = alias
            .as_ref()
            .map(|alias| alias.name.value.clone())
            .unwrap_or_else(|| table.clone());

        if parts.len() == 1 {
            if let Some(cte) = self.visible_cte(&table) {
                let relation = Relation::CteRef {
                    alias: alias_name.clone(),
                    cte: cte.name.clone(),
                    scope: cte.scope,
                    columns: alias
                        .as_ref()
                        .and_then(ast::alias_column_names)
                        .or_else(|| cte.columns.clone()),
                };
                self.ensure_alias(factor, &alias_name);
                return Ok(relation);
            }
        }

        if let Some(source) = self.sources.find(&parts) {
            if !self.active_sources.contains(&source.key) {
                return self.substitute(factor, source, alias, alias_name);
            }
            #[cfg(feature = "tracing")]
            trace!(source = source.key, "source refers back to itself; kept as a table");
        }

        self.ensure_alias(factor, &alias_name);
        Ok(Relation::BaseTable {
            alias: alias_name,
            columns: self.schema.columns(&parts),
            factor: factor.clone(),
            inline_values: false,
        })
    }

    fn ensure_alias(&self, factor: &mut TableFactor, name: &str) {
        if let TableFactor::Table { alias, .. } = factor {
            if alias.is_none() {
                *alias = Some(ast::table_alias(self.ident(name), Vec::new()));
            }
        }
    }

    fn synthetic_function_alias(&mut self) -> TableAlias {
        let name = format!("_u_{}", self.function_aliases);
        self.function_aliases += 1;
        ast::table_alias(Ident::new(name), Vec::new())
    }

    fn flatten_columns(&self) -> Vec<String> {
        FLATTEN_COLUMNS
            .iter()
            .map(|column| self.strategy.fold(column))
            .collect()
    }

    /// Table-valued functions: `LATERAL FLATTEN(...)`, `TABLE(f(...))` and
    /// `f(...)` in a FROM clause.
    fn function_relation(
        &mut self,
        factor: &mut TableFactor,
        scope: ScopeId,
    ) -> Result<Relation, LineageError> {
        let (function, references, alias) = match factor {
            TableFactor::Function {
                name, args, alias, ..
            } => {
                let function = ast::last_name_part(name);
                let references = self.argument_references(args, scope, is_flatten(&function))?;
                let mut alias = alias
                    .take()
                    .unwrap_or_else(|| self.synthetic_function_alias());
                if is_flatten(&function) && alias.columns.is_empty() {
                    let columns = self
                        .flatten_columns()
                        .iter()
                        .map(|column| self.ident(column))
                        .collect();
                    alias = ast::table_alias(alias.name.clone(), columns);
                }
                (function, references, alias)
            }
            TableFactor::TableFunction { expr, alias } => {
                let (function, references) = self.call_references(expr, scope)?;
                let alias = alias.get_or_insert_with(|| self.synthetic_function_alias());
                (function, references, alias.clone())
            }
            TableFactor::Table {
                name,
                args: Some(table_args),
                alias,
                ..
            } => {
                let function = ast::last_name_part(name);
                let references =
                    self.argument_references(&mut table_args.args, scope, is_flatten(&function))?;
                let alias = alias.get_or_insert_with(|| self.synthetic_function_alias());
                (function, references, alias.clone())
            }
            other => return Err(unexpected_factor(other)),
        };
        if let TableFactor::Function { alias: slot, .. } = factor {
            *slot = Some(alias.clone());
        }

        let (columns, structural) = if is_flatten(&function) {
            let columns = ast::alias_column_names(&alias).unwrap_or_else(|| self.flatten_columns());
            let structural = columns.iter().take(FLATTEN_STRUCTURAL).cloned().collect();
            (Some(columns), structural)
        } else {
            (ast::alias_column_names(&alias), Vec::new())
        };

        Ok(Relation::LateralFunction(Box::new(LateralRelation {
            alias: alias.name.value,
            columns,
            structural,
            references,
            factor: factor.clone(),
        })))
    }

    /// Qualifies a table function call and returns its name with the
    /// references of its data arguments.
    fn call_references(
        &mut self,
        expr: &mut Expr,
        scope: ScopeId,
    ) -> Result<(String, Vec<Reference>), LineageError> {
        if let Some((function, args)) = ast::function_call_args(expr) {
            let flatten = is_flatten(&function);
            let references = self.argument_references(args, scope, flatten)?;
            return Ok((function, references));
        }
        let references = self.qualify_expr(expr, scope, Mode::Lenient, &[])?;
        Ok((String::new(), references))
    }

    /// Qualifies every argument. A flatten call only carries its `INPUT`
    /// argument (named, or first positional); other calls carry all of them.
    fn argument_references(
        &mut self,
        args: &mut [FunctionArg],
        scope: ScopeId,
        flatten: bool,
    ) -> Result<Vec<Reference>, LineageError> {
        let input = if flatten {
            args.iter()
                .position(|arg| {
                    ast::function_arg_name(arg).is_some_and(|name| name.eq_ignore_ascii_case("input"))
                })
                .or_else(|| {
                    args.iter()
                        .position(|arg| matches!(arg, FunctionArg::Unnamed(_)))
                })
        } else {
            None
        };

        let mut references = Vec::new();
        for (position, arg) in args.iter_mut().enumerate() {
            let Some(expr) = ast::function_arg_expr(arg) else {
                continue;
            };
            let found = self.qualify_expr(expr, scope, Mode::Lenient, &[])?;
            if !flatten || input == Some(position) {
                references.extend(found);
            }
        }
        Ok(references)
    }

    fn unnest_relation(
        &mut self,
        factor: &mut TableFactor,
        scope: ScopeId,
    ) -> Result<Relation, LineageError> {
        let TableFactor::UNNEST {
            alias,
            array_exprs,
            with_offset,
            with_offset_alias,
            ..
        } = factor
        else {
            return Err(unexpected_factor(factor));
        };

        let mut references = Vec::new();
        for expr in array_exprs.iter_mut() {
            references.extend(self.qualify_expr(expr, scope, Mode::Lenient, &[])?);
        }

        let named = alias.is_some();
        let alias = alias.get_or_insert_with(|| self.synthetic_function_alias()).clone();
        let mut columns = match ast::alias_column_names(&alias) {
            Some(columns) => Some(columns),
            None if named => Some(vec![alias.name.value.clone()]),
            None => None,
        };
        let mut structural = Vec::new();
        if *with_offset {
            let offset = with_offset_alias
                .as_ref()
                .map(|ident| ident.value.clone())
                .unwrap_or_else(|| self.strategy.fold("offset"));
            if let Some(columns) = &mut columns {
                columns.push(offset.clone());
            }
            structural.push(offset);
        }

        Ok(Relation::LateralFunction(Box::new(LateralRelation {
            alias: alias.name.value,
            columns,
            structural,
            references,
            factor: factor.clone(),
        })))
    }

    fn pivot_relation(
        &mut self,
        factor: &mut TableFactor,
        scope: ScopeId,
    ) -> Result<Relation, LineageError> {
        let TableFactor::Pivot {
            table,
            aggregate_functions,
            value_column,
            value_source,
            alias,
            ..
        } = factor
        else {
            return Err(unexpected_factor(factor));
        };

        let input = self.relation_for(table, scope)?;
        let for_columns: Vec<String> = value_column.iter().flat_map(expression_columns).collect();
        let values = pivot_value_names(value_source, self.strategy);
        let aggregates = pivot_aggregates(aggregate_functions, &values, self.strategy);
        let alias = alias
            .as_ref()
            .map(|alias| alias.name.value.clone())
            .unwrap_or_else(|| input.alias().to_string());

        let output = if values.is_empty() {
            None
        } else {
            input.known_columns(&self.index).map(|columns| {
                let mut output: Vec<String> = columns
                    .into_iter()
                    .filter(|column| {
                        !for_columns.contains(column)
                            && !aggregates.iter().any(|agg| agg.columns.contains(column))
                    })
                    .collect();
                output.extend(aggregates.iter().flat_map(|agg| agg.outputs.iter().cloned()));
                output
            })
        };

        Ok(Relation::Pivot(Box::new(PivotRelation {
            alias,
            input,
            aggregates,
            output,
            factor: factor.clone(),
        })))
    }
}

fn unexpected_factor(factor: &TableFactor) -> LineageError {
    LineageError::Unsupported(format!("unexpected table factor `{factor}`"))
}

/// Names of the columns an expression reads, deduplicated, in syntax order.
fn expression_columns(expr: &Expr) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    let _ = visit_expressions(expr, |expr| {
        let name = match expr {
            Expr::Identifier(ident) => Some(&ident.value),
            Expr::CompoundIdentifier(parts) => parts.last().map(|ident| &ident.value),
            _ => None,
        };
        if let Some(name) = name {
            if !columns.contains(name) {
                columns.push(name.clone());
            }
        }
        ControlFlow::<()>::Continue(())
    });
    columns
}

/// Column names produced by `IN (...)` values: the value alias, or the literal
/// text without quotes. Names are unquoted identifiers and fold like one.
fn pivot_value_names(source: &PivotValueSource, strategy: NormalizationStrategy) -> Vec<String> {
    let PivotValueSource::List(values) = source else {
        return Vec::new();
    };
    let fold_ident = |ident: &Ident| match ident.quote_style {
        Some(_) => ident.value.clone(),
        None => strategy.fold(&ident.value),
    };
    values
        .iter()
        .map(|value| match &value.alias {
            Some(alias) => fold_ident(alias),
            None => match &value.expr {
                Expr::Value(literal) => match &literal.value {
                    Value::SingleQuotedString(text) | Value::DoubleQuotedString(text) => {
                        strategy.fold(text)
                    }
                    other => strategy.fold(&other.to_string()),
                },
                Expr::Identifier(ident) => fold_ident(ident),
                other => strategy.fold(&other.to_string()),
            },
        })
        .collect()
}

/// One output column per value and aggregate: `<value>` for a single unaliased
/// aggregate, `<value>_<alias>` for aliased ones and `<value>_<aggregate>`
/// otherwise.
fn pivot_aggregates(
    aggregates: &[ExprWithAlias],
    values: &[String],
    strategy: NormalizationStrategy,
) -> Vec<PivotAggregate> {
    let single = aggregates.len() == 1 && aggregates[0].alias.is_none();
    aggregates
        .iter()
        .map(|aggregate| {
            let outputs = values
                .iter()
                .map(|value| match &aggregate.alias {
                    _ if single => value.clone(),
                    Some(alias) if alias.quote_style.is_some() => {
                        format!("{value}_{}", alias.value)
                    }
                    Some(alias) => format!("{value}_{}", strategy.fold(&alias.value)),
                    None => format!("{value}_{}", strategy.fold(&aggregate.expr.to_string())),
                })
                .collect();
            PivotAggregate {
                outputs,
                columns: expression_columns(&aggregate.expr),
            }
        })
        .collect()
}
