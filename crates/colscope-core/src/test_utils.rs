//! Helpers shared by unit tests.

use serde_json::Value;

use crate::{Node, SchemaMetadata};

/// Schema from the nested mapping form, e.g. `{"x": {"a": "int"}}`.
pub fn schema(mapping: Value) -> SchemaMetadata {
    SchemaMetadata::from_mapping(&mapping)
        .unwrap_or_else(|e| panic!("invalid test schema {mapping}: {e}"))
}

/// `(depth, name)` for every node, in pre-order.
pub fn outline(node: &Node) -> Vec<(usize, String)> {
    node.walk()
        .map(|visit| (visit.depth, visit.node.name.clone()))
        .collect()
}

/// Names of the leaves, in pre-order.
pub fn leaf_names(node: &Node) -> Vec<String> {
    node.walk()
        .filter(|visit| visit.node.is_leaf())
        .map(|visit| visit.node.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_helper_reads_mapping() {
        let schema = schema(json!({"db": {"x": {"a": "int"}}}));
        assert_eq!(schema.tables.len(), 1);
        assert_eq!(schema.tables[0].schema.as_deref(), Some("db"));
    }
}
