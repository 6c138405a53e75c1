use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use sqlparser::ast::{Expr, Query, SelectItem, SetExpr, TableFactor};

use crate::ast;
use crate::scope::SourceMarker;

/// A piece of qualified SQL held by a [`Node`], rendered through [`Display`](fmt::Display).
#[derive(Debug, Clone, PartialEq)]
pub enum SqlFragment {
    Query(Box<Query>),
    SetExpr(Box<SetExpr>),
    SelectItem(Box<SelectItem>),
    Expr(Box<Expr>),
    TableFactor(Box<TableFactor>),
    /// Provenance could not be determined.
    Unknown,
}

impl fmt::Display for SqlFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlFragment::Query(query) => write!(f, "{query}"),
            SqlFragment::SetExpr(body) => write!(f, "{body}"),
            SqlFragment::SelectItem(item) => write!(f, "{item}"),
            SqlFragment::Expr(expr) => write!(f, "{expr}"),
            SqlFragment::TableFactor(factor) => write!(f, "{factor}"),
            SqlFragment::Unknown => f.write_str("?"),
        }
    }
}

/// One step in a lineage graph.
///
/// `Node` implements [`Drop`], so its fields cannot be moved out by
/// destructuring or struct-update syntax. Clone them, or take them with
/// [`std::mem::take`]:
///
/// ```
/// use colscope_core::{trace, Dialect};
///
/// let mut node = trace("a", "SELECT t.a FROM t", Dialect::Generic).unwrap();
/// let downstream = std::mem::take(&mut node.downstream);
/// assert_eq!(downstream[0].name, "t.a");
/// ```
#[derive(Debug, Clone)]
pub struct Node {
    /// `relation.column`, the bare column at the root, `*`, `?` or a branch index.
    pub name: String,
    /// The item this node's value is computed from.
    pub expression: SqlFragment,
    /// The scope, table or clause `expression` belongs to.
    pub source: SqlFragment,
    /// Key of the substituted source the node came from, or empty.
    pub source_name: String,
    /// CTE or derived table this node belongs to, or empty.
    pub reference_node_name: String,
    /// Upstream nodes, in the order their columns appear in `expression`.
    pub downstream: Vec<Node>,
    pub(crate) markers: Arc<[SourceMarker]>,
}

// Iterative, so arbitrarily deep chains drop without recursion.
impl Drop for Node {
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.downstream);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.downstream);
        }
    }
}

impl Node {
    /// Rendered `source` with a `/* source: name */` marker after every
    /// substituted source it contains.
    pub fn source_sql(&self) -> String {
        let mut sql = self.source.to_string();
        for marker in self.markers.iter() {
            sql = sql.replace(
                &marker.text,
                &format!("{} /* source: {} */", marker.text, marker.name),
            );
        }
        sql
    }

    pub fn expression_sql(&self) -> String {
        self.expression.to_string()
    }

    /// True for nodes that end a path.
    pub fn is_leaf(&self) -> bool {
        self.downstream.is_empty()
    }

    pub fn downstream_names(&self) -> Vec<&str> {
        self.downstream.iter().map(|n| n.name.as_str()).collect()
    }

    /// Pre-order traversal of the graph rooted here.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: vec![(self, None, 0)],
            next_id: 0,
        }
    }

    /// Base tables reached by the leaves of this graph.
    pub fn source_tables(&self) -> BTreeSet<String> {
        self.walk()
            .filter(|visit| visit.node.is_leaf())
            .filter_map(|visit| match &visit.node.source {
                SqlFragment::TableFactor(factor) => match factor.as_ref() {
                    TableFactor::Table { name, .. } => Some(ast::name_parts(name).join(".")),
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }
}

/// A node reached by [`Node::walk`].
#[derive(Debug, Clone, Copy)]
pub struct Visit<'a> {
    /// Position in pre-order, starting at 0 for the root.
    pub id: usize,
    pub parent: Option<usize>,
    pub depth: usize,
    pub node: &'a Node,
}

pub struct Walk<'a> {
    stack: Vec<(&'a Node, Option<usize>, usize)>,
    next_id: usize,
}

impl<'a> Iterator for Walk<'a> {
    type Item = Visit<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (node, parent, depth) = self.stack.pop()?;
        let id = self.next_id;
        self.next_id += 1;
        self.stack
            .extend(node.downstream.iter().rev().map(|child| (child, Some(id), depth + 1)));
        Some(Visit {
            id,
            parent,
            depth,
            node,
        })
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Node", 6)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("expression", &self.expression_sql())?;
        state.serialize_field("source", &self.source_sql())?;
        state.serialize_field("sourceName", &self.source_name)?;
        state.serialize_field("referenceNodeName", &self.reference_node_name)?;
        state.serialize_field("downstream", &self.downstream)?;
        state.end()
    }
}
