use std::collections::BTreeMap;

use colscope_core::{Node, SqlFragment};

/// How a vertex is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Root,
    Intermediate,
    /// A base-table column or a literal.
    Terminal,
    Star,
    Unknown,
}

impl Kind {
    fn of(node: &Node, is_root: bool) -> Self {
        if is_root {
            Kind::Root
        } else if node.name == "?" && node.source == SqlFragment::Unknown {
            Kind::Unknown
        } else if node.name == "*" {
            Kind::Star
        } else if node.is_leaf() {
            Kind::Terminal
        } else {
            Kind::Intermediate
        }
    }

    fn class(self) -> &'static str {
        match self {
            Kind::Root => "root",
            Kind::Intermediate => "step",
            Kind::Terminal => "terminal",
            Kind::Star => "star",
            Kind::Unknown => "unknown",
        }
    }

    fn shape(self, id: &str, label: &str) -> String {
        match self {
            Kind::Root => format!("{id}([\"{label}\"])"),
            Kind::Intermediate => format!("{id}[\"{label}\"]"),
            Kind::Terminal => format!("{id}[(\"{label}\")]"),
            Kind::Star => format!("{id}[/\"{label}\"/]"),
            Kind::Unknown => format!("{id}{{{{\"{label}\"}}}}"),
        }
    }
}

fn escape_label(label: &str) -> String {
    label.replace('"', "#quot;").replace('\n', " ")
}

fn vertex_id(id: usize) -> String {
    format!("n{id}")
}

/// Renders the graph as a mermaid flowchart, with data flowing from the
/// leaves towards the traced column.
///
/// Every visit becomes its own vertex, so a column reached along two paths
/// appears twice. Nodes from a substituted source are grouped in a subgraph
/// named after it.
pub fn export_mermaid(node: &Node) -> String {
    let mut lines = vec!["flowchart RL".to_string()];
    let mut groups: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    let mut edges = Vec::new();
    let mut used = [false; 5];

    for visit in node.walk() {
        let id = vertex_id(visit.id);
        let kind = Kind::of(visit.node, visit.parent.is_none());
        used[kind as usize] = true;

        let mut label = escape_label(&visit.node.name);
        if !visit.node.reference_node_name.is_empty() {
            label.push_str(&format!(" <i>via {}</i>", escape_label(&visit.node.reference_node_name)));
        }
        let vertex = format!("{}:::{}", kind.shape(&id, &label), kind.class());
        groups
            .entry(visit.node.source_name.as_str())
            .or_default()
            .push(vertex);

        if let Some(parent) = visit.parent {
            edges.push(format!("    {id} --> {}", vertex_id(parent)));
        }
    }

    for (index, (source_name, vertices)) in groups.into_iter().enumerate() {
        if source_name.is_empty() {
            lines.extend(vertices.into_iter().map(|v| format!("    {v}")));
        } else {
            lines.push(format!(
                "    subgraph source_{index}[\"source: {}\"]",
                escape_label(source_name)
            ));
            lines.extend(vertices.into_iter().map(|v| format!("        {v}")));
            lines.push("    end".to_string());
        }
    }
    lines.extend(edges);

    let styles = [
        (Kind::Root, "fill:#dbeafe,stroke:#1d4ed8"),
        (Kind::Intermediate, "fill:#f8fafc,stroke:#64748b"),
        (Kind::Terminal, "fill:#dcfce7,stroke:#16a34a"),
        (Kind::Star, "fill:#fef3c7,stroke:#d97706"),
        (Kind::Unknown, "fill:#fee2e2,stroke:#dc2626"),
    ];
    for (kind, style) in styles {
        if used[kind as usize] {
            lines.push(format!("    classDef {} {style}", kind.class()));
        }
    }

    lines.join("\n")
}
