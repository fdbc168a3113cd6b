//! Property-based tests for the query parser.

use proptest::prelude::*;
use td_rust::query::{Expr, Field, Op, parse};

fn atom() -> impl Strategy<Value = String> {
    let value = "[a-z][a-z0-9_]{0,8}";
    prop_oneof![
        value.prop_map(|v| format!("title ~ \"{v}\"")),
        value.prop_map(|v| format!("labels ~ {v}")),
        prop_oneof![Just("open"), Just("closed"), Just("in_progress")]
            .prop_map(|s| format!("status = {s}")),
        (0u8..4).prop_map(|p| format!("priority = P{p}")),
        value.prop_map(|v| format!("descendant_of({v})")),
        Just("is_ready()".to_string()),
        Just("rework()".to_string()),
    ]
}

fn query() -> impl Strategy<Value = String> {
    atom().prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{a} AND {b}")),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("({a}) OR ({b})")),
            inner.prop_map(|a| format!("NOT ({a})")),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        ..Default::default()
    })]

    /// Arbitrary input yields a tree or a positioned error, never a panic.
    #[test]
    fn parser_never_panics(input in "\\PC{0,64}") {
        let _ = parse(&input);
    }

    /// Rendering a parsed tree and parsing it again gives the same tree.
    #[test]
    fn display_reparses_to_same_tree(q in query()) {
        let expr = parse(&q).unwrap();
        let rendered = expr.to_string();
        let reparsed = parse(&rendered).unwrap();
        prop_assert_eq!(expr, reparsed, "rendered as {}", rendered);
    }

    /// Any value text survives rendering, including quotes, backslashes and control characters.
    #[test]
    fn rendered_values_round_trip(value in "(\\PC|[\\n\\t\\r\"\\\\]){0,24}") {
        let expr = Expr::Not(Box::new(Expr::compare(Field::Description, Op::Contains, value)));
        prop_assert_eq!(parse(&expr.to_string()).unwrap(), expr);
    }

    /// Keywords are case-insensitive.
    #[test]
    fn keyword_case_does_not_matter(q in query()) {
        let lower = q.replace(" AND ", " and ").replace(" OR ", " or ").replace("NOT ", "not ");
        prop_assert_eq!(parse(&q).unwrap(), parse(&lower).unwrap());
    }
}
