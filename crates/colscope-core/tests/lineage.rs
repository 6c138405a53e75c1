use std::collections::BTreeMap;

use colscope_core::{
    lineage, resolve_lineage, trace, Dialect, LineageError, LineageRequest, Node, SchemaMetadata,
};
use rstest::rstest;
use serde_json::json;

fn schema(mapping: serde_json::Value) -> SchemaMetadata {
    SchemaMetadata::from_mapping(&mapping).expect("valid schema mapping")
}

fn outline(node: &Node) -> Vec<(usize, String)> {
    node.walk()
        .map(|visit| (visit.depth, visit.node.name.clone()))
        .collect()
}

fn leaves(node: &Node) -> Vec<String> {
    node.walk()
        .filter(|visit| visit.node.is_leaf())
        .map(|visit| visit.node.name.clone())
        .collect()
}

fn level(depth: usize, name: &str) -> (usize, String) {
    (depth, name.to_string())
}

#[test]
fn substituted_sources_chain_down_to_the_base_table() {
    let sources = BTreeMap::from([
        ("y".to_string(), "SELECT * FROM x".to_string()),
        ("z".to_string(), "SELECT a FROM y".to_string()),
    ]);
    let schema = schema(json!({"x": {"a": "int"}}));
    let node = resolve_lineage(
        "a",
        "SELECT a FROM z",
        Some(&schema),
        Some(&sources),
        Dialect::Generic,
        true,
    )
    .unwrap();

    assert_eq!(
        node.source_sql(),
        "SELECT z.a AS a FROM (SELECT y.a AS a FROM (SELECT x.a AS a FROM x AS x) AS y /* source: y */) AS z /* source: z */"
    );
    assert_eq!(node.source_name, "");

    let z = &node.downstream[0];
    assert_eq!(z.name, "z.a");
    assert_eq!(
        z.source_sql(),
        "SELECT y.a AS a FROM (SELECT x.a AS a FROM x AS x) AS y /* source: y */"
    );
    assert_eq!(z.source_name, "z");
    assert_eq!(z.reference_node_name, "");

    let y = &z.downstream[0];
    assert_eq!(y.name, "y.a");
    assert_eq!(y.source_sql(), "SELECT x.a AS a FROM x AS x");
    assert_eq!(y.source_name, "y");

    let x = &y.downstream[0];
    assert_eq!(x.name, "x.a");
    assert_eq!(x.source_sql(), "x AS x");
    assert_eq!(x.source_name, "y");
    assert!(x.is_leaf());
}

#[test]
fn union_in_derived_table_fans_out_per_branch() {
    let node = trace(
        "x",
        "SELECT x FROM (SELECT ax AS x FROM a UNION SELECT bx FROM b UNION SELECT cx FROM c)",
        Dialect::Generic,
    )
    .unwrap();

    assert_eq!(node.downstream_names(), vec!["0", "1", "2"]);
    assert_eq!(leaves(&node), vec!["a.ax", "b.bx", "c.cx"]);
    for branch in &node.downstream {
        assert_eq!(branch.reference_node_name, "_q_0");
    }
    assert_eq!(node.downstream[1].expression_sql(), "b.bx AS bx");
    assert_eq!(node.downstream[1].source_sql(), "SELECT b.bx AS bx FROM b AS b");
}

#[test]
fn root_set_operation_names_branches_by_position() {
    let node = trace(
        "a",
        "SELECT a FROM x UNION ALL SELECT b FROM y UNION ALL SELECT c FROM z",
        Dialect::Generic,
    )
    .unwrap();
    assert_eq!(node.name, "a");
    assert_eq!(node.expression_sql(), "x.a AS a");
    assert_eq!(
        outline(&node),
        vec![
            level(0, "a"),
            level(1, "0"),
            level(2, "x.a"),
            level(1, "1"),
            level(2, "y.b"),
            level(1, "2"),
            level(2, "z.c"),
        ]
    );
}

#[test]
fn cte_set_operation_branches_carry_the_cte_name() {
    let node = trace(
        "a",
        "WITH u AS (SELECT a FROM x UNION ALL SELECT a FROM y) SELECT a FROM u",
        Dialect::Generic,
    )
    .unwrap();
    assert_eq!(node.downstream_names(), vec!["0", "1"]);
    assert!(node
        .downstream
        .iter()
        .all(|branch| branch.reference_node_name == "u"));
    assert_eq!(leaves(&node), vec!["x.a", "y.a"]);
}

#[test]
fn substituted_union_source_keeps_source_name() {
    let request = LineageRequest::new("a", "SELECT a FROM s", Dialect::Generic)
        .with_source("s", "SELECT a FROM x UNION SELECT a FROM y");
    let node = lineage(&request).unwrap();
    assert_eq!(node.downstream_names(), vec!["0", "1"]);
    for branch in &node.downstream {
        assert_eq!(branch.source_name, "s");
        assert_eq!(branch.reference_node_name, "");
    }
}

#[test]
fn cte_reference_node_name() {
    let node = trace(
        "total",
        "WITH c AS (SELECT x.a + x.b AS s FROM x) SELECT c.s * 2 AS total FROM c",
        Dialect::Generic,
    )
    .unwrap();
    let cte = &node.downstream[0];
    assert_eq!(cte.name, "c.s");
    assert_eq!(cte.reference_node_name, "c");
    assert_eq!(cte.expression_sql(), "x.a + x.b AS s");
    assert_eq!(cte.downstream_names(), vec!["x.a", "x.b"]);
}

#[test]
fn pivot_pass_through_column_skips_the_pivot() {
    let schema = schema(json!({"sales": {"empid": "int", "amount": "int", "mon": "text"}}));
    let sql = "SELECT empid FROM sales PIVOT(SUM(amount) FOR mon IN ('JAN', 'FEB')) AS p";
    let node = resolve_lineage("empid", sql, Some(&schema), None, Dialect::Snowflake, true).unwrap();

    assert_eq!(node.name, "EMPID");
    assert_eq!(node.expression_sql(), "P.EMPID AS EMPID");
    assert_eq!(node.downstream_names(), vec!["SALES.EMPID"]);
    assert_eq!(node.downstream[0].source_sql(), "SALES AS SALES");
}

#[test]
fn pivot_aggregate_column_traces_the_aggregated_input() {
    let schema = schema(json!({"sales": {"empid": "int", "amount": "int", "mon": "text"}}));
    let sql = "SELECT * FROM sales PIVOT(SUM(amount) FOR mon IN ('JAN', 'FEB')) AS p";
    let node = resolve_lineage("JAN", sql, Some(&schema), None, Dialect::Snowflake, true).unwrap();

    assert_eq!(node.expression_sql(), "P.JAN AS JAN");
    assert_eq!(node.downstream_names(), vec!["SALES.AMOUNT"]);
}

#[test]
fn pivot_values_fold_like_identifiers_inside_a_cte() {
    let sql = "WITH t AS (SELECT a AS other_a FROM sample_data PIVOT (sum(value) FOR category IN ('a', 'b'))) SELECT other_a FROM t";
    let node = trace("other_a", sql, Dialect::Snowflake).unwrap();

    let cte = &node.downstream[0];
    assert_eq!(cte.name, "T.OTHER_A");
    assert_eq!(cte.reference_node_name, "T");
    assert_eq!(cte.downstream_names(), vec!["SAMPLE_DATA.VALUE"]);
}

#[test]
fn pivot_over_unaliased_derived_table_traces_the_aggregate() {
    let sql = "SELECT a FROM (SELECT value, category FROM sample_data) PIVOT (sum(value) FOR category IN ('a', 'b'))";
    let node = trace("a", sql, Dialect::Snowflake).unwrap();

    assert_eq!(node.downstream_names(), vec!["_q_0.VALUE"]);
    assert_eq!(leaves(&node), vec!["SAMPLE_DATA.VALUE"]);
}

#[test]
fn pivot_column_missing_from_its_input_is_unknown() {
    let schema = schema(json!({"sales": {"empid": "int", "amount": "int", "mon": "text"}}));
    let sql = "SELECT p.other FROM sales PIVOT(SUM(amount) FOR mon IN ('JAN', 'FEB')) AS p";
    let node = resolve_lineage("other", sql, Some(&schema), None, Dialect::Snowflake, true).unwrap();

    assert_eq!(node.downstream_names(), vec!["?"]);
    assert!(node.downstream[0].is_leaf());
}

#[test]
fn lateral_flatten_recurses_into_its_input() {
    let node = trace(
        "VALUE",
        "SELECT FLATTENED.VALUE FROM TEST_TABLE, LATERAL FLATTEN(INPUT => RESULT, OUTER => TRUE) FLATTENED",
        Dialect::Snowflake,
    )
    .unwrap();
    assert_eq!(node.name, "VALUE");

    let flattened = &node.downstream[0];
    assert_eq!(flattened.name, "FLATTENED.VALUE");
    assert_eq!(flattened.expression_sql(), "VALUE");
    let source = flattened.source_sql();
    assert!(source.starts_with("LATERAL FLATTEN(INPUT => TEST_TABLE.RESULT, OUTER => TRUE) AS FLATTENED"));
    assert!(source.contains("SEQ, KEY, PATH, INDEX, VALUE, THIS"));

    assert_eq!(flattened.downstream_names(), vec!["TEST_TABLE.RESULT"]);
    assert_eq!(flattened.downstream[0].source_sql(), "TEST_TABLE AS TEST_TABLE");
}

#[test]
fn flatten_structural_columns_are_terminal() {
    let node = trace(
        "INDEX",
        "SELECT f.index FROM t, LATERAL FLATTEN(INPUT => t.items) AS f",
        Dialect::Snowflake,
    )
    .unwrap();
    assert_eq!(outline(&node), vec![level(0, "INDEX"), level(1, "F.INDEX")]);
}

#[test]
fn unnest_traces_the_array_expression() {
    let node = trace("v", "SELECT v FROM t, UNNEST(t.arr) AS v", Dialect::Bigquery).unwrap();
    assert_eq!(
        outline(&node),
        vec![level(0, "v"), level(1, "v.v"), level(2, "t.arr")]
    );
}

#[test]
fn scalar_subquery_is_its_own_scope() {
    let node = trace(
        "total",
        "SELECT x.c + (SELECT MAX(y.b) AS mb FROM y) AS total FROM x",
        Dialect::Generic,
    )
    .unwrap();
    assert_eq!(
        outline(&node),
        vec![
            level(0, "total"),
            level(1, "x.c"),
            level(1, "mb"),
            level(2, "y.b"),
        ]
    );
}

#[test]
fn correlated_subquery_sees_outer_relations() {
    let node = trace(
        "n",
        "SELECT (SELECT COUNT(*) AS cnt FROM y WHERE y.id = x.id) + x.k AS n FROM x",
        Dialect::Generic,
    )
    .unwrap();
    assert_eq!(node.downstream_names(), vec!["cnt", "x.k"]);
    assert!(node.downstream[0].is_leaf());
    assert!(node.source_sql().contains("WHERE y.id = x.id"));
}

#[test]
fn unexpanded_star_yields_star_leaves() {
    let node = trace("x", "SELECT x FROM (SELECT * FROM t)", Dialect::Generic).unwrap();
    assert_eq!(
        outline(&node),
        vec![level(0, "x"), level(1, "_q_0.x"), level(2, "*")]
    );
    let star = &node.downstream[0].downstream[0];
    assert_eq!(star.source_sql(), "t AS t");
}

#[test]
fn star_is_expanded_with_schema() {
    let schema = schema(json!({"t": {"x": "int", "y": "int"}}));
    let node = resolve_lineage(
        "x",
        "SELECT x FROM (SELECT * FROM t)",
        Some(&schema),
        None,
        Dialect::Generic,
        true,
    )
    .unwrap();
    assert_eq!(
        outline(&node),
        vec![level(0, "x"), level(1, "_q_0.x"), level(2, "t.x")]
    );
    assert_eq!(node.downstream[0].source_sql(), "SELECT t.x AS x FROM t AS t");
}

#[test]
fn ambiguous_using_column_is_unknown() {
    let node = trace("id", "SELECT id FROM a JOIN b USING (id)", Dialect::Generic).unwrap();
    assert_eq!(node.downstream_names(), vec!["?"]);
    assert_eq!(node.downstream[0].source_sql(), "?");
}

#[test]
fn using_column_with_known_tables_takes_the_first() {
    let schema = schema(json!({"a": {"id": "int"}, "b": {"id": "int", "v": "int"}}));
    let node = resolve_lineage(
        "id",
        "SELECT id FROM a JOIN b USING (id)",
        Some(&schema),
        None,
        Dialect::Generic,
        true,
    )
    .unwrap();
    assert_eq!(node.downstream_names(), vec!["a.id"]);
}

#[test]
fn derived_alias_columns_map_by_position() {
    let node = trace("c", "SELECT t.c FROM (SELECT a FROM x) AS t(c)", Dialect::Generic).unwrap();
    assert_eq!(
        outline(&node),
        vec![level(0, "c"), level(1, "t.c"), level(2, "x.a")]
    );
    assert_eq!(node.downstream[0].reference_node_name, "t");
}

#[test]
fn values_relation_terminates() {
    let node = trace("a", "SELECT t.a FROM (VALUES (1), (2)) AS t(a)", Dialect::Generic).unwrap();
    assert_eq!(node.downstream_names(), vec!["t.a"]);
    assert_eq!(node.downstream[0].expression_sql(), "a");
    assert!(node.downstream[0].is_leaf());
}

#[test]
fn literal_projection_has_no_downstream() {
    let node = trace("one", "SELECT 1 AS one", Dialect::Generic).unwrap();
    assert!(node.is_leaf());
    assert_eq!(node.expression_sql(), "1 AS one");
}

#[test]
fn repeated_references_are_listed_once() {
    let node = trace("d", "SELECT x.a * x.a + x.b AS d FROM x", Dialect::Generic).unwrap();
    assert_eq!(node.downstream_names(), vec!["x.a", "x.b"]);
}

#[test]
fn filters_do_not_feed_the_projection() {
    let node = trace(
        "a",
        "SELECT x.a FROM x JOIN y ON x.id = y.id WHERE y.flag",
        Dialect::Generic,
    )
    .unwrap();
    assert_eq!(node.downstream_names(), vec!["x.a"]);
}

#[test]
fn insert_select_traces_the_query() {
    let node = trace("a", "INSERT INTO t (c) SELECT a FROM x", Dialect::Generic).unwrap();
    assert_eq!(node.name, "a");
    assert_eq!(node.downstream_names(), vec!["x.a"]);
}

#[test]
fn comments_do_not_leak_into_names() {
    let node = trace(
        "a",
        "SELECT /* lead */ x.a /* tail */ FROM x -- trailing\n",
        Dialect::Generic,
    )
    .unwrap();
    assert_eq!(outline(&node), vec![level(0, "a"), level(1, "x.a")]);
}

#[test]
fn trimming_only_changes_rendered_sources() {
    let sql = "WITH c AS (SELECT x.a AS a, x.b AS b FROM x) SELECT c.a AS a, c.b AS b FROM c";
    let trimmed = resolve_lineage("a", sql, None, None, Dialect::Generic, true).unwrap();
    let full = resolve_lineage("a", sql, None, None, Dialect::Generic, false).unwrap();

    assert_eq!(outline(&trimmed), outline(&full));
    assert_eq!(
        trimmed.downstream[0].source_sql(),
        "SELECT x.a AS a FROM x AS x"
    );
    assert_eq!(
        full.downstream[0].source_sql(),
        "SELECT x.a AS a, x.b AS b FROM x AS x"
    );
}

#[rstest]
#[case::lowercase_request("a", "A")]
#[case::uppercase_request("A", "A")]
#[case::quoted_exact_request("\"A\"", "A")]
fn snowflake_folds_requested_columns(#[case] column: &str, #[case] expected: &str) {
    let node = trace(column, "WITH x AS (SELECT 1 a) SELECT a FROM x", Dialect::Snowflake).unwrap();
    assert_eq!(node.name, expected);
    assert_eq!(node.downstream_names(), vec!["X.A"]);
    assert_eq!(node.downstream[0].reference_node_name, "X");
}

#[rstest]
#[case::quoted_output_column("\"a\"", "WITH x AS (SELECT 1 a) SELECT a FROM x")]
#[case::quoted_projection_reference("A", "SELECT \"a\" AS a FROM (SELECT 1 AS a) AS t")]
#[case::quoted_qualified_reference("X", "SELECT t.\"a\" AS x FROM (SELECT 1 AS a) AS t")]
#[case::quoted_fully_qualified_reference("X", "SELECT db.t.\"a\" AS x FROM (SELECT 1 AS a) AS t")]
fn quoted_identifiers_must_match_exactly(#[case] column: &str, #[case] sql: &str) {
    let err = trace(column, sql, Dialect::Snowflake).unwrap_err();
    assert!(
        matches!(err, LineageError::Qualification { .. }),
        "unexpected error: {err}"
    );
}

#[test]
fn quoted_qualified_reference_is_checked_against_the_schema() {
    let schema = schema(json!({"T": {"A": "int"}}));
    let err = resolve_lineage(
        "x",
        "SELECT t.\"a\" AS x FROM t",
        Some(&schema),
        None,
        Dialect::Snowflake,
        true,
    )
    .unwrap_err();
    assert!(
        matches!(err, LineageError::Qualification { .. }),
        "unexpected error: {err}"
    );

    let node = resolve_lineage(
        "x",
        "SELECT t.\"A\" AS x FROM t",
        Some(&schema),
        None,
        Dialect::Snowflake,
        true,
    )
    .unwrap();
    assert_eq!(node.downstream_names(), vec!["T.A"]);
}

#[test]
fn missing_column_is_not_found() {
    let err = trace("b", "SELECT a FROM x", Dialect::Generic).unwrap_err();
    assert!(matches!(err, LineageError::ColumnNotFound { ref column } if column == "b"));
}

#[test]
fn repeated_source_gets_one_marker_per_occurrence() {
    let request = LineageRequest::new(
        "a",
        "SELECT a FROM y UNION ALL SELECT a FROM y",
        Dialect::Generic,
    )
    .with_source("y", "SELECT a FROM x");
    let node = lineage(&request).unwrap();

    let source = node.source_sql();
    assert_eq!(source.matches("/* source: y */").count(), 2);
    assert!(!source.contains("/* source: y */ /* source: y */"));
    assert_eq!(
        source,
        "SELECT y.a AS a FROM (SELECT x.a AS a FROM x AS x) AS y /* source: y */ UNION ALL SELECT y.a AS a FROM (SELECT x.a AS a FROM x AS x) AS y /* source: y */"
    );
}

#[test]
fn invalid_source_names_the_source() {
    let request = LineageRequest::new("a", "SELECT a FROM y", Dialect::Generic)
        .with_source("y", "SELEC a FROM");
    let err = lineage(&request).unwrap_err();
    assert!(matches!(err, LineageError::SourceSubstitution { ref name, .. } if name == "y"));
}

#[test]
fn unmatched_quoted_source_key_is_rejected() {
    let request = LineageRequest::new("a", "SELECT a FROM y", Dialect::Generic)
        .with_source("\"Y\"", "SELECT 1 AS a");
    let err = lineage(&request).unwrap_err();
    assert!(matches!(err, LineageError::Qualification { .. }));
}

#[test]
fn self_referencing_source_stays_a_table() {
    let request = LineageRequest::new("a", "SELECT a FROM s", Dialect::Generic)
        .with_source("s", "SELECT a FROM s WHERE a > 0");
    let node = lineage(&request).unwrap();
    assert_eq!(
        outline(&node),
        vec![level(0, "a"), level(1, "s.a"), level(2, "s.a")]
    );
    assert_eq!(node.downstream[0].downstream[0].source_sql(), "s AS s");
}

#[test]
fn non_query_statements_are_unsupported() {
    let err = trace("a", "DELETE FROM x", Dialect::Generic).unwrap_err();
    assert!(matches!(err, LineageError::Unsupported(_)));
}

#[test]
fn source_tables_lists_reached_tables() {
    let node = trace(
        "v",
        "SELECT a.v + b.v AS v FROM db.a AS a JOIN b ON a.id = b.id",
        Dialect::Generic,
    )
    .unwrap();
    let tables: Vec<_> = node.source_tables().into_iter().collect();
    assert_eq!(tables, vec!["b", "db.a"]);
}

#[test]
fn node_serializes_rendered_sql() {
    let node = trace("a", "SELECT a FROM x", Dialect::Generic).unwrap();
    let value = serde_json::to_value(&node).unwrap();
    assert_eq!(value["name"], "a");
    assert_eq!(value["expression"], "x.a AS a");
    assert_eq!(value["source"], "SELECT x.a AS a FROM x AS x");
    assert_eq!(value["downstream"][0]["name"], "x.a");
    assert_eq!(value["downstream"][0]["sourceName"], "");
}

#[test]
fn cte_subtree_json_shape() {
    let node = trace(
        "a",
        "WITH c AS (SELECT x.a AS a, x.b AS b FROM x) SELECT c.a FROM c",
        Dialect::Generic,
    )
    .unwrap();
    insta::assert_json_snapshot!(&node.downstream[0], @r#"
    {
      "name": "c.a",
      "expression": "x.a AS a",
      "source": "SELECT x.a AS a FROM x AS x",
      "sourceName": "",
      "referenceNodeName": "c",
      "downstream": [
        {
          "name": "x.a",
          "expression": "x AS x",
          "source": "x AS x",
          "sourceName": "",
          "referenceNodeName": "",
          "downstream": []
        }
      ]
    }
    "#);
}
