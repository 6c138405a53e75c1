//! Arena of qualified query scopes.
//!
//! Qualification turns one query into a [`ScopeIndex`]: every SELECT-level unit
//! (the root query, CTE bodies, derived tables, subqueries and set-operation
//! branches) becomes a [`Scope`] addressed by [`ScopeId`]. Scopes never point at
//! each other directly; relations and references carry ids, so substituted
//! sources can be reached from several places without shared ownership.

use std::sync::Arc;

use sqlparser::ast::{SelectItem, TableFactor};

use crate::lineage::SqlFragment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ScopeId(pub(crate) usize);

#[derive(Debug)]
pub(crate) struct Scope {
    /// Name of the caller-supplied source this scope belongs to, own or inherited.
    pub source_name: String,
    /// True for the root scope of a substituted source.
    pub substituted: bool,
    pub body: ScopeBody,
    /// Qualified text of the scope, frozen once the scope is complete.
    pub rendered: SqlFragment,
}

#[derive(Debug)]
pub(crate) enum ScopeBody {
    Select(SelectScope),
    /// One [`Relation::SetOperationBranch`] per flattened branch, left to right.
    SetOperation(Vec<Relation>),
}

#[derive(Debug, Default)]
pub(crate) struct SelectScope {
    pub projections: Vec<Projection>,
    pub relations: Vec<Relation>,
    /// A `*` that could not be expanded.
    pub star: Option<SelectItem>,
}

#[derive(Debug)]
pub(crate) struct Projection {
    pub name: String,
    pub item: SelectItem,
    /// Column and subquery references in syntax order.
    pub references: Vec<Reference>,
}

/// Position of a relation inside a select scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RelationRef {
    pub scope: ScopeId,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Reference {
    Column { relation: RelationRef, column: String },
    /// A scalar, `IN` or `EXISTS` subquery.
    Subquery(ScopeId),
    /// No owning relation could be determined.
    Unresolved { column: String },
}

/// Everything a FROM clause can introduce.
#[derive(Debug)]
pub(crate) enum Relation {
    BaseTable {
        alias: String,
        columns: Option<Vec<String>>,
        factor: TableFactor,
        /// `(VALUES ...) AS t(a)`: columns are addressed by name, not by the table.
        inline_values: bool,
    },
    DerivedTable {
        alias: String,
        scope: ScopeId,
        columns: Option<Vec<String>>,
    },
    CteRef {
        alias: String,
        cte: String,
        scope: ScopeId,
        columns: Option<Vec<String>>,
    },
    SetOperationBranch {
        index: usize,
        scope: ScopeId,
    },
    Pivot(Box<PivotRelation>),
    LateralFunction(Box<LateralRelation>),
}

#[derive(Debug)]
pub(crate) struct PivotRelation {
    pub alias: String,
    pub input: Relation,
    pub factor: TableFactor,
    pub aggregates: Vec<PivotAggregate>,
    pub output: Option<Vec<String>>,
}

#[derive(Debug)]
pub(crate) struct PivotAggregate {
    /// Output columns produced by this aggregate, one per pivoted value.
    pub outputs: Vec<String>,
    /// Input columns read by the aggregate.
    pub columns: Vec<String>,
}

#[derive(Debug)]
pub(crate) struct LateralRelation {
    pub alias: String,
    pub columns: Option<Vec<String>>,
    /// Output columns that carry no upstream value (sequence, key, offset, ...).
    pub structural: Vec<String>,
    /// References in the function's input arguments.
    pub references: Vec<Reference>,
    pub factor: TableFactor,
}

/// Where a substituted source appears in rendered text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SourceMarker {
    /// Rendered derived-table text, e.g. `(SELECT ...) AS z`.
    pub text: String,
    pub name: String,
}

#[derive(Debug)]
pub(crate) struct ScopeIndex {
    pub scopes: Vec<Scope>,
    /// Substitution markers in pre-order: enclosing sources before nested ones.
    pub markers: Arc<[SourceMarker]>,
    pub root: ScopeId,
}

impl ScopeIndex {
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn relation(&self, relation: RelationRef) -> Option<&Relation> {
        match &self.scope(relation.scope).body {
            ScopeBody::Select(select) => select.relations.get(relation.index),
            ScopeBody::SetOperation(_) => None,
        }
    }

    /// Output column names of a scope, or `None` while a `*` is left unexpanded.
    pub fn output_names(&self, id: ScopeId) -> Option<Vec<String>> {
        match &self.scope(id).body {
            ScopeBody::Select(select) if select.star.is_none() => {
                Some(select.projections.iter().map(|p| p.name.clone()).collect())
            }
            ScopeBody::Select(_) => None,
            ScopeBody::SetOperation(branches) => branches
                .first()
                .and_then(|branch| branch.known_columns(self)),
        }
    }
}

impl Relation {
    /// Name the relation is addressed by in qualified column references.
    pub fn alias(&self) -> &str {
        match self {
            Relation::BaseTable { alias, .. }
            | Relation::DerivedTable { alias, .. }
            | Relation::CteRef { alias, .. } => alias,
            Relation::SetOperationBranch { .. } => "",
            Relation::Pivot(pivot) => &pivot.alias,
            Relation::LateralFunction(lateral) => &lateral.alias,
        }
    }

    /// Columns the relation is statically known to expose.
    pub fn known_columns(&self, index: &ScopeIndex) -> Option<Vec<String>> {
        match self {
            Relation::BaseTable { columns, .. } => columns.clone(),
            Relation::DerivedTable { scope, columns, .. }
            | Relation::CteRef { scope, columns, .. } => {
                columns.clone().or_else(|| index.output_names(*scope))
            }
            Relation::SetOperationBranch { scope, .. } => index.output_names(*scope),
            Relation::Pivot(pivot) => pivot.output.clone(),
            Relation::LateralFunction(lateral) => lateral.columns.clone(),
        }
    }
}

impl SelectScope {
    pub fn projection(&self, name: &str) -> Option<&Projection> {
        self.projections.iter().find(|p| p.name == name)
    }
}
