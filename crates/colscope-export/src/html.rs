use chrono::{DateTime, Utc};

use colscope_core::{Node, SqlFragment};

use crate::mermaid::export_mermaid;

/// Renders a standalone HTML report: summary cards, the mermaid diagram and
/// one table row per visited node.
pub fn render_report(node: &Node, title: &str, exported_at: DateTime<Utc>) -> String {
    let diagram = export_mermaid(node);
    let export_date = exported_at.format("%Y-%m-%d %H:%M:%S UTC");

    let mut node_count = 0;
    let mut leaf_count = 0;
    let mut unknown_count = 0;
    let mut rows = String::new();
    for visit in node.walk() {
        node_count += 1;
        if visit.node.is_leaf() {
            leaf_count += 1;
        }
        if visit.node.source == SqlFragment::Unknown {
            unknown_count += 1;
        }
        rows.push_str(&format!(
            "<tr><td class=\"name\" style=\"padding-left: {indent}rem\">{name}</td><td><code>{expression}</code></td><td><code>{source}</code></td><td>{source_name}</td><td>{reference}</td></tr>",
            indent = 1 + visit.depth,
            name = escape_html(&visit.node.name),
            expression = escape_html(&visit.node.expression_sql()),
            source = escape_html(&visit.node.source_sql()),
            source_name = escape_html(&visit.node.source_name),
            reference = escape_html(&visit.node.reference_node_name),
        ));
    }
    let tables = node.source_tables();
    let table_list = tables
        .iter()
        .map(|table| format!("<span class=\"badge badge-table\">{}</span>", escape_html(table)))
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{title} - Column Lineage</title>
  <script src="https://cdn.jsdelivr.net/npm/mermaid/dist/mermaid.min.js"></script>
  <style>
    :root {{
      --bg-primary: #ffffff;
      --bg-secondary: #f8fafc;
      --text-primary: #1e293b;
      --text-secondary: #64748b;
      --border-color: #e2e8f0;
      --error-color: #ef4444;
    }}

    * {{ box-sizing: border-box; margin: 0; padding: 0; }}

    body {{
      font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', Arial, sans-serif;
      background-color: var(--bg-secondary);
      color: var(--text-primary);
      line-height: 1.6;
    }}

    .container {{ max-width: 1400px; margin: 0 auto; padding: 2rem; }}

    header {{
      background: var(--bg-primary);
      border-bottom: 1px solid var(--border-color);
      padding: 1.5rem 2rem;
      margin-bottom: 2rem;
    }}

    h1 {{ font-size: 1.75rem; font-weight: 600; }}
    .export-date {{ color: var(--text-secondary); font-size: 0.875rem; margin-top: 0.5rem; }}

    .summary-cards {{
      display: grid;
      grid-template-columns: repeat(auto-fit, minmax(150px, 1fr));
      gap: 1rem;
      margin-bottom: 2rem;
    }}

    .card {{
      background: var(--bg-primary);
      border: 1px solid var(--border-color);
      border-radius: 8px;
      padding: 1rem;
    }}

    .card-label {{ font-size: 0.75rem; text-transform: uppercase; color: var(--text-secondary); }}
    .card-value {{ font-size: 1.5rem; font-weight: 600; }}
    .card-value.error {{ color: var(--error-color); }}

    .diagram-container {{
      background: var(--bg-primary);
      border: 1px solid var(--border-color);
      border-radius: 8px;
      padding: 2rem;
      margin-bottom: 2rem;
      overflow-x: auto;
    }}

    .mermaid {{ text-align: center; }}

    table {{ width: 100%; border-collapse: collapse; background: var(--bg-primary); border: 1px solid var(--border-color); border-radius: 8px; overflow: hidden; margin-bottom: 2rem; }}
    th, td {{ padding: 0.75rem 1rem; text-align: left; border-bottom: 1px solid var(--border-color); vertical-align: top; }}
    th {{ background: var(--bg-secondary); font-weight: 600; font-size: 0.75rem; text-transform: uppercase; color: var(--text-secondary); }}
    tr:last-child td {{ border-bottom: none; }}
    tr:hover td {{ background: var(--bg-secondary); }}
    td.name {{ white-space: nowrap; font-weight: 500; }}
    code {{ font-size: 0.8rem; white-space: pre-wrap; }}

    .section-title {{ font-size: 1.25rem; font-weight: 600; margin-bottom: 1rem; }}
    .tables {{ margin-bottom: 2rem; }}

    .badge {{ display: inline-block; padding: 0.125rem 0.5rem; border-radius: 9999px; font-size: 0.75rem; font-weight: 500; }}
    .badge-table {{ background: #dcfce7; color: #16a34a; }}
  </style>
</head>
<body>
  <header>
    <h1>{title}</h1>
    <div class="export-date">Exported on {export_date}</div>
  </header>

  <div class="container">
    <div class="summary-cards">
      <div class="card"><div class="card-label">Nodes</div><div class="card-value">{node_count}</div></div>
      <div class="card"><div class="card-label">Leaves</div><div class="card-value">{leaf_count}</div></div>
      <div class="card"><div class="card-label">Tables</div><div class="card-value">{table_count}</div></div>
      <div class="card"><div class="card-label">Unknown</div><div class="card-value{unknown_class}">{unknown_count}</div></div>
    </div>

    <div class="section-title">Source Tables</div>
    <div class="tables">{table_list}</div>

    <div class="section-title">Diagram</div>
    <div class="diagram-container">
      <div class="mermaid">{diagram}</div>
    </div>

    <div class="section-title">Nodes</div>
    <table>
      <thead><tr><th>Name</th><th>Expression</th><th>Source</th><th>Source Name</th><th>Reference</th></tr></thead>
      <tbody>{rows}</tbody>
    </table>
  </div>

  <script>
    mermaid.initialize({{ startOnLoad: true, theme: 'neutral' }});
  </script>
</body>
</html>"#,
        title = escape_html(title),
        export_date = escape_html(&export_date.to_string()),
        node_count = node_count,
        leaf_count = leaf_count,
        table_count = tables.len(),
        unknown_count = unknown_count,
        unknown_class = if unknown_count > 0 { " error" } else { "" },
        table_list = table_list,
        diagram = escape_html(&diagram),
        rows = rows,
    )
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#039;")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use colscope_core::{trace, Dialect};

    use super::*;

    fn exported_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_report_summary() {
        let node = trace(
            "total",
            "SELECT o.price * o.qty AS total FROM orders AS o",
            Dialect::Generic,
        )
        .unwrap();
        let html = render_report(&node, "Orders <total>", exported_at());

        assert!(html.contains("<title>Orders &lt;total&gt; - Column Lineage</title>"));
        assert!(html.contains("Exported on 2026-10-16 09:00:00 UTC"));
        assert!(html.contains("<div class=\"card-label\">Nodes</div><div class=\"card-value\">3</div>"));
        assert!(html.contains("<div class=\"card-label\">Leaves</div><div class=\"card-value\">2</div>"));
        assert!(html.contains("<span class=\"badge badge-table\">orders</span>"));
        assert!(html.contains("<div class=\"card-value\">0</div>"));
    }

    #[test]
    fn test_report_flags_unknown_columns() {
        let node = trace("id", "SELECT id FROM a JOIN b USING (id)", Dialect::Generic).unwrap();
        let html = render_report(&node, "using", exported_at());
        assert!(html.contains("<div class=\"card-value error\">1</div>"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("a < b && c > 'd' \"e\""),
            "a &lt; b &amp;&amp; c &gt; &#039;d&#039; &quot;e&quot;"
        );
    }
}
