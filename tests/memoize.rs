use be_tree::{AttributeDefinition, BETree};

fn definitions() -> Vec<AttributeDefinition> {
    vec![
        AttributeDefinition::boolean("b", false),
        AttributeDefinition::bounded_integer("i", false, 0, 10),
        AttributeDefinition::bounded_float("f", false, 0., 10.),
        AttributeDefinition::bounded_string("s", false, 100),
        AttributeDefinition::integer_list("il", false),
        AttributeDefinition::string_list("sl", false),
    ]
}

/// Insert both expressions, search, and return the report's
/// `(evaluated, matched, memoized)` counters.
fn counters(expression_a: &str, expression_b: &str, event: &str) -> (usize, usize, usize) {
    let mut tree = BETree::new(&definitions()).unwrap();
    tree.insert(1, expression_a).unwrap();
    tree.insert(2, expression_b).unwrap();
    let mut report = tree.make_report();
    tree.search(event, &mut report).unwrap();
    (report.evaluated(), report.matched(), report.memoized())
}

#[test]
fn an_identical_comparison_is_memoized() {
    assert_eq!((2, 2, 1), counters("i > 1", "i > 1", r#"{"i": 2}"#));
    assert_eq!((2, 2, 1), counters("i >= 1", "i >= 1", r#"{"i": 2}"#));
    assert_eq!((2, 2, 1), counters("i < 1", "i < 1", r#"{"i": 0}"#));
    assert_eq!((2, 2, 1), counters("i <= 1", "i <= 1", r#"{"i": 1}"#));
}

#[test]
fn different_comparisons_are_not_memoized() {
    assert_eq!((2, 2, 0), counters("i > 0", "i > 1", r#"{"i": 2}"#));
}

#[test]
fn an_identical_float_comparison_is_memoized() {
    assert_eq!((2, 2, 1), counters("f > 1.", "f > 1.", r#"{"f": 2.0}"#));
    assert_eq!((2, 2, 0), counters("f > 0.", "f > 1.", r#"{"f": 2.0}"#));
}

#[test]
fn an_identical_equality_is_memoized() {
    assert_eq!((2, 2, 1), counters("i = 1", "i = 1", r#"{"i": 1}"#));
    assert_eq!((2, 2, 1), counters("i <> 1", "i <> 1", r#"{"i": 0}"#));
    assert_eq!((2, 2, 0), counters("i <> 0", "i <> 1", r#"{"i": 2}"#));
}

#[test]
fn an_identical_string_equality_is_memoized() {
    assert_eq!(
        (2, 2, 1),
        counters(r#"s = "a""#, r#"s = "a""#, r#"{"s": "a"}"#)
    );
    assert_eq!(
        (2, 2, 0),
        counters(r#"s <> "a""#, r#"s <> "b""#, r#"{"s": "c"}"#)
    );
}

#[test]
fn an_identical_set_expression_is_memoized() {
    assert_eq!((2, 2, 1), counters("i in (1, 2)", "i in (1, 2)", r#"{"i": 1}"#));
    assert_eq!(
        (2, 2, 1),
        counters("i not in (1, 2)", "i not in (1, 2)", r#"{"i": 3}"#)
    );
    assert_eq!(
        (2, 2, 0),
        counters("i in (1, 3)", "i in (1, 2)", r#"{"i": 1}"#)
    );
}

#[test]
fn list_canonicalisation_feeds_the_memoization() {
    // Same set after sorting and deduplication, so the fingerprints agree.
    assert_eq!(
        (2, 2, 1),
        counters("i in (2, 1)", "i in (1, 2, 2)", r#"{"i": 1}"#)
    );
}

#[test]
fn an_identical_membership_test_is_memoized() {
    assert_eq!((2, 2, 1), counters("1 in il", "1 in il", r#"{"il": [1, 2]}"#));
    assert_eq!(
        (2, 2, 1),
        counters(r#""1" in sl"#, r#""1" in sl"#, r#"{"sl": ["1", "2"]}"#)
    );
    assert_eq!((2, 2, 0), counters("1 in il", "2 in il", r#"{"il": [1, 2]}"#));
}

#[test]
fn an_identical_list_expression_is_memoized() {
    assert_eq!(
        (2, 2, 1),
        counters("il one of (1, 2)", "il one of (1, 2)", r#"{"il": [1, 2]}"#)
    );
    assert_eq!(
        (2, 2, 1),
        counters("il none of (1, 2)", "il none of (1, 2)", r#"{"il": [3, 4]}"#)
    );
    assert_eq!(
        (2, 2, 1),
        counters("il all of (1, 2)", "il all of (1, 2)", r#"{"il": [1, 2]}"#)
    );
    assert_eq!(
        (2, 2, 0),
        counters("il one of (1, 2)", "il one of (1, 3)", r#"{"il": [1, 2]}"#)
    );
}

#[test]
fn boolean_variables_and_their_compositions_are_memoized() {
    assert_eq!((2, 2, 1), counters("b", "b", r#"{"b": true}"#));
    assert_eq!((2, 2, 1), counters("not b", "not b", r#"{"b": false}"#));
    // The right `b` of the first conjunction already hits the memoization.
    assert_eq!((2, 2, 2), counters("b and b", "b and b", r#"{"b": true}"#));
    // The first disjunction short-circuits, so only the root is replayed.
    assert_eq!((2, 2, 1), counters("b or b", "b or b", r#"{"b": true}"#));
    assert_eq!(
        (2, 2, 1),
        counters("not (i = 0)", "not (i = 0)", r#"{"i": 1}"#)
    );
    assert_eq!(
        (2, 2, 2),
        counters("(i = 0) and (i = 0)", "(i = 0) and (i = 0)", r#"{"i": 0}"#)
    );
}

#[test]
fn a_shared_sub_expression_is_memoized_across_different_roots() {
    assert_eq!(
        (2, 2, 1),
        counters("(i = 0) or (i = 1)", "(i = 0) or (i = 2)", r#"{"i": 0}"#)
    );
}

#[test]
fn a_shared_conjunction_side_is_memoized_across_different_roots() {
    assert_eq!(
        (2, 2, 1),
        counters(
            r#"((((not b) or (i = 6 and ("s2" in sl)))) and (il one of (2, 3)))"#,
            r#"((((not b) or (i = 6 and ("s2" in sl)))) and (il one of (2, 4)))"#,
            r#"{"b": false, "i": 6, "sl": ["s1", "s2"], "il": [1, 2]}"#
        )
    );
}

#[test]
fn memoization_does_not_change_the_matches() {
    let mut tree = BETree::new(&definitions()).unwrap();
    let expressions = [
        "b and i = 1",
        "b and i = 1",
        "b or i = 2",
        "not (i = 1)",
        "il one of (1, 2) and b",
    ];
    for (index, expression) in expressions.iter().enumerate() {
        tree.insert(index as u64 + 1, expression).unwrap();
    }
    let event = r#"{"b": true, "i": 1, "il": [5]}"#;

    let mut first = tree.make_report();
    tree.search(event, &mut first).unwrap();
    let mut second = tree.make_report();
    tree.search(event, &mut second).unwrap();

    // Each search owns its memoization state; the verdicts are identical and
    // the duplicated expression is answered from the bitmaps.
    assert_eq!(first.matches(), second.matches());
    let mut matches = first.matches().to_vec();
    matches.sort();
    assert_eq!(vec![1, 2, 3], matches);
    assert!(first.memoized() > 0);
}
