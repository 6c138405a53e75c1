use chrono::{TimeZone, Utc};
use colscope_core::{trace, Dialect, Node};
use colscope_export::{
    export, export_json, export_mermaid, export_text_tree, write_to_dir, ExportFormat,
    ExportNaming,
};

fn trace_sample() -> Node {
    trace(
        "total",
        "WITH o AS (SELECT orders.id, orders.price * orders.qty AS total FROM orders) \
         SELECT u.id, o.total FROM users u JOIN o ON u.id = o.id",
        Dialect::Postgres,
    )
    .expect("lineage")
}

fn naming() -> ExportNaming {
    ExportNaming::with_exported_at("total", Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap())
}

#[test]
fn exports_mermaid_flowchart() {
    let node = trace_sample();
    let mermaid = export_mermaid(&node);
    assert!(mermaid.starts_with("flowchart RL"));
    assert!(mermaid.contains("orders.price"));
    assert!(mermaid.contains("n1 --> n0"));
}

#[test]
fn exports_json_pretty_and_compact() {
    let node = trace_sample();
    let pretty = export_json(&node, false).expect("json export");
    assert!(pretty.contains('\n'));

    let compact = export_json(&node, true).expect("json export");
    assert!(!compact.contains('\n'));
    let value: serde_json::Value = serde_json::from_str(&compact).expect("valid json");
    assert_eq!(value["name"], "total");
    assert_eq!(value["downstream"][0]["name"], "o.total");
    assert_eq!(value["downstream"][0]["referenceNodeName"], "o");
}

#[test]
fn exports_html_report() {
    let node = trace_sample();
    let html = export(&node, ExportFormat::Html, &naming()).expect("html export");
    assert!(html.contains("<title>total - Column Lineage</title>"));
    assert!(html.contains("class=\"mermaid\""));
    assert!(html.contains("Exported on 2026-10-16 08:00:00 UTC"));
}

#[test]
fn exports_text_tree() {
    let node = trace_sample();
    let tree = export_text_tree(&node);
    let lines: Vec<&str> = tree.lines().collect();
    assert_eq!(lines[0], "total");
    assert_eq!(lines[1], "└── o.total via o");
    assert_eq!(lines.len(), 4);
}

#[test]
fn writes_named_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let node = trace_sample();
    let path = write_to_dir(&node, ExportFormat::Text, &naming(), dir.path()).expect("write");
    assert_eq!(
        path.file_name().and_then(|name| name.to_str()),
        Some("total-20261016-080000-tree.txt")
    );
    let content = std::fs::read_to_string(path).expect("read back");
    assert!(content.starts_with("total\n"));
}

#[test]
fn exports_nested_derived_tables() {
    let mut sql = "SELECT t.a AS a FROM t".to_string();
    for _ in 0..6 {
        sql = format!("SELECT q.a AS a FROM ({sql}) AS q");
    }
    let node = trace("a", &sql, Dialect::Generic).expect("lineage");
    let tree = export_text_tree(&node);
    assert_eq!(tree.lines().count(), 8);
    assert!(tree.lines().last().is_some_and(|line| line.ends_with("t.a  (t AS t)")));
    assert_eq!(export_mermaid(&node).matches("-->").count(), 7);
}
