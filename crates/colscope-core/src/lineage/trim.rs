//! Projection trimming for rendered scopes.

use sqlparser::ast::{SelectItem, SetExpr};

use super::SqlFragment;

/// Copy of `rendered` whose outermost SELECT projects only `item`.
///
/// Set operations are returned unchanged: trimming one branch would change
/// the positional meaning of the others.
pub(crate) fn trim_projection(rendered: &SqlFragment, item: &SelectItem) -> SqlFragment {
    let mut trimmed = rendered.clone();
    match &mut trimmed {
        SqlFragment::Query(query) => project_only(&mut query.body, item),
        SqlFragment::SetExpr(body) => project_only(body, item),
        _ => {}
    }
    trimmed
}

fn project_only(body: &mut SetExpr, item: &SelectItem) {
    match body {
        SetExpr::Select(select) => select.projection = vec![item.clone()],
        SetExpr::Query(query) => project_only(&mut query.body, item),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_query;
    use crate::Dialect;

    fn first_item(sql: &str) -> SelectItem {
        let query = parse_query(sql, Dialect::Generic).unwrap();
        match *query.body {
            SetExpr::Select(select) => select.projection[0].clone(),
            _ => panic!("not a select"),
        }
    }

    #[test]
    fn test_trim_keeps_ctes_and_filters() {
        let query = parse_query(
            "WITH c AS (SELECT 1 AS a) SELECT c.a AS a, c.a + 1 AS b FROM c AS c WHERE c.a > 0",
            Dialect::Generic,
        )
        .unwrap();
        let item = first_item("SELECT c.a + 1 AS b");
        let trimmed = trim_projection(&SqlFragment::Query(Box::new(query)), &item);
        assert_eq!(
            trimmed.to_string(),
            "WITH c AS (SELECT 1 AS a) SELECT c.a + 1 AS b FROM c AS c WHERE c.a > 0"
        );
    }

    #[test]
    fn test_trim_leaves_set_operations() {
        let query = parse_query("SELECT a, b FROM x UNION SELECT c, d FROM y", Dialect::Generic)
            .unwrap();
        let rendered = SqlFragment::Query(Box::new(query));
        let trimmed = trim_projection(&rendered, &first_item("SELECT a"));
        assert_eq!(trimmed, rendered);
    }
}
