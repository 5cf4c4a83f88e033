use be_tree::{AttributeDefinition, BETree, Reason};

const FIRST_EXPRESSION: &str = r#"exchange_id = 1 and deal_ids one of ["deal-1", "deal-2"] and segment_ids one of [1, 2, 3]"#;
const SECOND_EXPRESSION: &str =
    r#"exchange_id = 1 and (country = "CA" or country = "US") and not private"#;
const THIRD_EXPRESSION: &str = r#"exchange_id = 2 or deal_ids one of ["deal-3"]"#;

fn main() {
    // Create the BE-tree
    let attributes = [
        AttributeDefinition::bounded_integer("exchange_id", false, 0, 10),
        AttributeDefinition::string_list("deal_ids", false),
        AttributeDefinition::integer_list("segment_ids", false),
        AttributeDefinition::bounded_string("country", false, 200),
        AttributeDefinition::boolean("private", false),
    ];
    let mut tree = BETree::new(&attributes).unwrap();

    // Insert the boolean expressions
    let expressions_by_ids = [
        (1, FIRST_EXPRESSION),
        (2, SECOND_EXPRESSION),
        (3, THIRD_EXPRESSION),
    ];
    for (id, expression) in expressions_by_ids {
        tree.insert(id, expression).unwrap();
    }

    // Match an event against every subscription
    let mut report = tree.make_report();
    tree.search(
        r#"{"exchange_id": 1, "deal_ids": ["deal-2"], "segment_ids": [2], "country": "FR", "private": false}"#,
        &mut report,
    )
    .unwrap();

    for id in report.matches() {
        println!("matched: {id}");
    }
    for (reason, ids) in report.reasons() {
        match reason {
            Reason::Attribute(_) => println!("failed on an attribute: {ids:?}"),
            other => println!("failed with {other:?}: {ids:?}"),
        }
    }
}
