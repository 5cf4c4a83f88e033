//! An in-memory boolean-expression indexing engine for high-fanout
//! subscription matching: a large set of subscriber predicates (each a
//! boolean expression over a fixed schema of typed attributes) is indexed so
//! that an incoming event can be matched against all of them in time closer
//! to the number of *relevant* subscriptions than to their total count. For
//! every subscription that did not match, the report blames a single reason:
//! the attribute (or sentinel) recorded at the leaf that decided the failure.
//!
//! # Examples
//!
//! Searching for matching subscriptions and inspecting the failure reasons:
//!
//! ```
//! use be_tree::{AttributeDefinition, BETree, Reason};
//!
//! // Register the attribute domains, then build the tree
//! let mut tree = BETree::new(&[
//!     AttributeDefinition::boolean("private", false),
//!     AttributeDefinition::bounded_integer("exchange_id", false, 0, 10),
//!     AttributeDefinition::string_list("deal_ids", true),
//! ])
//! .unwrap();
//!
//! // Insert the boolean expressions
//! tree.insert(1, r#"deal_ids one of ["deal-1", "deal-2"]"#).unwrap();
//! tree.insert(2, "exchange_id = 2 and not private").unwrap();
//!
//! // Match an event against every subscription
//! let mut report = tree.make_report();
//! tree.search(
//!     r#"{"private": false, "exchange_id": 2, "deal_ids": ["deal-3"]}"#,
//!     &mut report,
//! )
//! .unwrap();
//!
//! assert_eq!(&[2], report.matches());
//! // Subscription 1 failed because of its deal_ids test
//! let deal_ids = tree.attribute_id("deal_ids").unwrap();
//! assert_eq!(&[1], report.reason(Reason::Attribute(deal_ids)));
//! ```
//!
//! # Domain Specific Language (DSL)
//!
//! Subscriptions are written in a small expression language over the
//! registered attributes:
//!
//! * Boolean operators: `and` (`&&`), `or` (`||`), `not` (`!`) and bare
//!   boolean variables;
//! * Comparison: `<`, `<=`, `>`, `>=` on `integer` and `float`;
//! * Equality: `=` and `<>` on `integer`, `float`, `string` and integer
//!   enumerations;
//! * Null: `is null`, `is not null` (for variables) and `is empty` (for
//!   lists);
//! * Set: `in` and `not in`, with the variable on either side
//!   (`exchange_id in (1, 2)`, `1 in segment_ids`);
//! * List: `one of`, `none of` and `all of` on lists of `integer` or
//!   `string`;
//! * Specials: `segment_within(seg, id, seconds)`,
//!   `segment_before(seg, id, seconds)`,
//!   `within_frequency_cap("type", "namespace", value, length)`,
//!   `geo_within_radius(latitude, longitude, radius)`, `contains(s, "text")`,
//!   `starts_with(s, "text")` and `ends_with(s, "text")`.
//!
//! Events are JSON objects from attribute name to value; list values are
//! sorted on entry, segments are `[segment-id, timestamp]` pairs and
//! frequency caps are `[type, id, namespace, value, timestamp]` records with
//! timestamps in microseconds.
//!
//! # Matching
//!
//! The tree clusters subscriptions by attribute (partition directories) and
//! by attribute range (cluster directories), rebuilding incrementally when a
//! leaf overflows. A search walks only the clusters whose range contains the
//! event's value for the partitioned attribute; everything skipped is
//! guaranteed not to match and is charged with the partition's attribute in
//! the report. Candidate subscriptions go through an evaluator that consults
//! per-subscription short-circuit masks for undefined attributes first, and
//! memoizes the verdict of canonically-identical sub-expressions across the
//! whole search.
//!
//! The tree is built once and then serves: insertions happen before matching
//! starts, and matching only takes `&self`, so concurrent searches are safe.

mod ast;
mod bounds;
mod error;
mod evaluation;
mod events;
mod lexer;
mod parser;
mod report;
mod strings;
#[cfg(test)]
mod test_utils;
mod tree;
mod values;

pub use crate::{
    error::{BETreeError, InsertionError, ParserError, ValidationError},
    events::{Event, EventBuilder, EventError},
    report::{Reason, Report},
    tree::{BETree, Constant, TreeParams},
    values::{AttributeDefinition, FrequencyCap, FrequencyCapKind, Segment, ValueKind, VariableId},
};
