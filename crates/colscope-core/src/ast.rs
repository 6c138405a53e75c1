//! Small constructors and accessors over the sqlparser AST.

use std::sync::OnceLock;

use regex::Regex;
use sqlparser::ast::{
    Expr, FunctionArg, FunctionArgExpr, FunctionArguments, Ident, JoinConstraint, JoinOperator,
    ObjectName, Query, SetExpr, Statement, TableAlias, TableAliasColumnDef, TableFactor,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::types::{Dialect, NormalizationStrategy};

/// Parsed once and cloned, so no constructor depends on the AST's private
/// span and token fields.
fn derived_template() -> &'static TableFactor {
    static TEMPLATE: OnceLock<TableFactor> = OnceLock::new();
    TEMPLATE.get_or_init(|| {
        let statements = Parser::parse_sql(&GenericDialect {}, "SELECT * FROM (SELECT 1) AS t")
            .expect("Invalid derived table template");
        first_factor(statements).expect("Invalid derived table template")
    })
}

fn first_factor(mut statements: Vec<Statement>) -> Option<TableFactor> {
    let Statement::Query(query) = statements.pop()? else {
        return None;
    };
    let SetExpr::Select(select) = *query.body else {
        return None;
    };
    select.from.into_iter().next().map(|from| from.relation)
}

/// `name(columns...)` alias.
pub(crate) fn table_alias(name: Ident, columns: Vec<Ident>) -> TableAlias {
    let mut alias = match derived_template() {
        TableFactor::Derived {
            alias: Some(alias), ..
        } => alias.clone(),
        _ => unreachable!("derived table template carries an alias"),
    };
    alias.name = name;
    alias.columns = columns
        .into_iter()
        .map(|name| TableAliasColumnDef {
            name,
            data_type: None,
        })
        .collect();
    alias
}

/// `(query) AS alias`.
pub(crate) fn derived_table(query: Query, table_alias: TableAlias) -> TableFactor {
    let mut factor = derived_template().clone();
    if let TableFactor::Derived {
        subquery, alias, ..
    } = &mut factor
    {
        **subquery = query;
        *alias = Some(table_alias);
    }
    factor
}

/// Unquoted values of an object name's parts.
pub(crate) fn name_parts(name: &ObjectName) -> Vec<String> {
    name.0
        .iter()
        .map(|part| {
            part.as_ident()
                .map(|ident| ident.value.clone())
                .unwrap_or_else(|| part.to_string())
        })
        .collect()
}

pub(crate) fn last_name_part(name: &ObjectName) -> String {
    name_parts(name).pop().unwrap_or_default()
}

/// Builds an identifier for a generated reference, quoting it when the name
/// would not survive being read back unquoted.
pub(crate) fn ident(value: &str, dialect: Dialect, strategy: NormalizationStrategy) -> Ident {
    static PLAIN: OnceLock<Regex> = OnceLock::new();
    let plain = PLAIN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid regex pattern")
    });
    if plain.is_match(value) && strategy.fold(value) == value {
        Ident::new(value)
    } else {
        let quote = dialect.identifier_quotes().first().copied().unwrap_or('"');
        Ident::with_quote(quote, value)
    }
}

pub(crate) fn alias_column_names(alias: &TableAlias) -> Option<Vec<String>> {
    if alias.columns.is_empty() {
        None
    } else {
        Some(alias.columns.iter().map(|c| c.name.value.clone()).collect())
    }
}

pub(crate) fn join_on_expr_mut(join_operator: &mut JoinOperator) -> Option<&mut Expr> {
    let constraint = match join_operator {
        JoinOperator::Join(constraint)
        | JoinOperator::Inner(constraint)
        | JoinOperator::Left(constraint)
        | JoinOperator::LeftOuter(constraint)
        | JoinOperator::Right(constraint)
        | JoinOperator::RightOuter(constraint)
        | JoinOperator::FullOuter(constraint)
        | JoinOperator::CrossJoin(constraint)
        | JoinOperator::Semi(constraint)
        | JoinOperator::LeftSemi(constraint)
        | JoinOperator::RightSemi(constraint)
        | JoinOperator::Anti(constraint)
        | JoinOperator::LeftAnti(constraint)
        | JoinOperator::RightAnti(constraint)
        | JoinOperator::StraightJoin(constraint) => constraint,
        JoinOperator::AsOf { constraint, .. } => constraint,
        JoinOperator::CrossApply | JoinOperator::OuterApply => return None,
    };

    match constraint {
        JoinConstraint::On(expr) => Some(expr),
        _ => None,
    }
}

/// Column names listed in a `USING (...)` join constraint.
pub(crate) fn join_using_columns(join_operator: &JoinOperator) -> Vec<String> {
    let constraint = match join_operator {
        JoinOperator::Join(constraint)
        | JoinOperator::Inner(constraint)
        | JoinOperator::Left(constraint)
        | JoinOperator::LeftOuter(constraint)
        | JoinOperator::Right(constraint)
        | JoinOperator::RightOuter(constraint)
        | JoinOperator::FullOuter(constraint) => constraint,
        _ => return Vec::new(),
    };

    match constraint {
        JoinConstraint::Using(names) => names.iter().map(last_name_part).collect(),
        _ => Vec::new(),
    }
}

/// The value expression of a function argument, named or positional.
pub(crate) fn function_arg_expr(arg: &mut FunctionArg) -> Option<&mut Expr> {
    let arg = match arg {
        FunctionArg::Named { arg, .. } | FunctionArg::ExprNamed { arg, .. } => arg,
        FunctionArg::Unnamed(arg) => arg,
    };
    match arg {
        FunctionArgExpr::Expr(expr) => Some(expr),
        _ => None,
    }
}

/// Name of a named function argument.
pub(crate) fn function_arg_name(arg: &FunctionArg) -> Option<String> {
    match arg {
        FunctionArg::Named { name, .. } => Some(name.value.clone()),
        FunctionArg::ExprNamed {
            name: Expr::Identifier(ident),
            ..
        } => Some(ident.value.clone()),
        _ => None,
    }
}

/// Arguments of a function call expression, if it carries a plain list.
pub(crate) fn function_call_args(expr: &mut Expr) -> Option<(String, &mut Vec<FunctionArg>)> {
    let Expr::Function(function) = expr else {
        return None;
    };
    let name = last_name_part(&function.name);
    match &mut function.args {
        FunctionArguments::List(list) => Some((name, &mut list.args)),
        _ => None,
    }
}
