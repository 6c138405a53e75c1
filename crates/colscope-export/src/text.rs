use colscope_core::Node;

/// Renders the graph as an indented tree, one line per visit:
///
/// ```text
/// total
/// ├── o.price  (orders AS o)
/// └── o.qty  (orders AS o)
/// ```
///
/// Leaves show their source in parentheses and nodes reached through a
/// derived table or CTE show it after `via`.
pub fn export_text_tree(node: &Node) -> String {
    let mut out = String::new();
    // (node, prefix of its own line, prefix of its children's lines)
    let mut stack: Vec<(&Node, String, String)> = vec![(node, String::new(), String::new())];

    while let Some((current, line_prefix, prefix)) = stack.pop() {
        out.push_str(&line_prefix);
        out.push_str(&describe(current));
        out.push('\n');

        let count = current.downstream.len();
        for (index, child) in current.downstream.iter().enumerate().rev() {
            let (connector, indent) = if index + 1 == count {
                ("└── ", "    ")
            } else {
                ("├── ", "│   ")
            };
            stack.push((child, format!("{prefix}{connector}"), format!("{prefix}{indent}")));
        }
    }

    out
}

fn describe(node: &Node) -> String {
    let mut line = node.name.clone();
    if !node.source_name.is_empty() {
        line.push_str(&format!(" [{}]", node.source_name));
    }
    if !node.reference_node_name.is_empty() {
        line.push_str(&format!(" via {}", node.reference_node_name));
    }
    if node.is_leaf() && node.name != "?" {
        line.push_str(&format!("  ({})", node.source_sql()));
    }
    line
}

#[cfg(test)]
mod tests {
    use colscope_core::{trace, Dialect};

    use super::*;

    #[test]
    fn test_flat_tree() {
        let node = trace(
            "total",
            "SELECT o.price * o.qty AS total FROM orders AS o",
            Dialect::Generic,
        )
        .unwrap();
        insta::assert_snapshot!(export_text_tree(&node), @r"
        total
        ├── o.price  (orders AS o)
        └── o.qty  (orders AS o)
        ");
    }

    #[test]
    fn test_nested_tree() {
        let node = trace(
            "b",
            "WITH c AS (SELECT t.a + t.b AS b FROM t) SELECT c.b FROM c JOIN u ON c.b = u.b",
            Dialect::Generic,
        )
        .unwrap();
        insta::assert_snapshot!(export_text_tree(&node), @r"
        b
        └── c.b via c
            ├── t.a  (t AS t)
            └── t.b  (t AS t)
        ");
    }
}
