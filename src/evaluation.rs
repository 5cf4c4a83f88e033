use crate::{
    ast::{
        BoolExpr, CompareOp, CompareValue, EqualityOp, EqualityValue, Expr, ListLiteral, ListOp,
        Node, NullOp, SegmentOp, SetLeft, SetOp, SetRight, Special, StringOp,
    },
    events::Event,
    report::{Reason, Report},
    strings::StringId,
    values::{feq, AttributeTable, AttributeValue, StringValue, VariableId},
};

/// A growable fixed-width bitmap over 64-bit words.
#[derive(Clone, Debug)]
pub(crate) struct Bitmap {
    words: Vec<u64>,
}

impl Bitmap {
    const BITS_PER_WORD: usize = 64;

    pub(crate) fn new(bits: usize) -> Self {
        Self {
            words: vec![0; bits / Self::BITS_PER_WORD + 1],
        }
    }

    #[inline]
    pub(crate) fn set(&mut self, index: usize) {
        self.words[index / Self::BITS_PER_WORD] |= 1u64 << (index % Self::BITS_PER_WORD);
    }

    #[inline]
    pub(crate) fn test(&self, index: usize) -> bool {
        self.words[index / Self::BITS_PER_WORD] & (1u64 << (index % Self::BITS_PER_WORD)) != 0
    }

    #[inline]
    pub(crate) fn words(&self) -> &[u64] {
        &self.words
    }
}

/// Per-search memoization state: one pass bit, one fail bit, and the blame
/// recorded when the node was first evaluated, per memoize id.
#[derive(Debug)]
pub(crate) struct Memoize {
    pass: Bitmap,
    fail: Bitmap,
    reasons: Vec<Option<Reason>>,
}

impl Memoize {
    pub(crate) fn new(count: usize) -> Self {
        Self {
            pass: Bitmap::new(count),
            fail: Bitmap::new(count),
            reasons: vec![None; count],
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ShortCircuitKind {
    Pass,
    Fail,
    None,
}

/// Per-subscription masks: bit `a` of `pass` means the expression is forced
/// true whenever attribute `a` is undefined, independent of every other
/// attribute; `fail` is the symmetric forced-false mask.
#[derive(Clone, Debug)]
pub(crate) struct ShortCircuit {
    pass: Bitmap,
    fail: Bitmap,
}

impl ShortCircuit {
    pub(crate) fn build(attributes: &AttributeTable, node: &Node) -> Self {
        let mut pass = Bitmap::new(attributes.len());
        let mut fail = Bitmap::new(attributes.len());
        for domain in attributes.iter() {
            if !domain.allow_undefined {
                continue;
            }
            match short_circuit_for_node(domain.var, false, node) {
                ShortCircuitKind::Pass => pass.set(domain.var.0),
                ShortCircuitKind::Fail => fail.set(domain.var.0),
                ShortCircuitKind::None => {}
            }
        }
        Self { pass, fail }
    }
}

fn short_circuit_for_attr_var(
    id: VariableId,
    inverted: bool,
    attr: &crate::ast::AttrVar,
) -> ShortCircuitKind {
    if id == attr.var {
        if inverted {
            ShortCircuitKind::Pass
        } else {
            ShortCircuitKind::Fail
        }
    } else {
        ShortCircuitKind::None
    }
}

fn combine_and(lhs: ShortCircuitKind, rhs: ShortCircuitKind) -> ShortCircuitKind {
    if lhs == ShortCircuitKind::Fail || rhs == ShortCircuitKind::Fail {
        ShortCircuitKind::Fail
    } else if lhs == ShortCircuitKind::Pass && rhs == ShortCircuitKind::Pass {
        ShortCircuitKind::Pass
    } else {
        ShortCircuitKind::None
    }
}

fn combine_or(lhs: ShortCircuitKind, rhs: ShortCircuitKind) -> ShortCircuitKind {
    if lhs == ShortCircuitKind::Pass || rhs == ShortCircuitKind::Pass {
        ShortCircuitKind::Pass
    } else if lhs == ShortCircuitKind::Fail && rhs == ShortCircuitKind::Fail {
        ShortCircuitKind::Fail
    } else {
        ShortCircuitKind::None
    }
}

fn short_circuit_for_node(id: VariableId, inverted: bool, node: &Node) -> ShortCircuitKind {
    match &node.expr {
        Expr::IsNull { op, attr } => match op {
            // A missing attribute makes `is null` true.
            NullOp::IsNull => short_circuit_for_attr_var(id, !inverted, attr),
            NullOp::IsNotNull | NullOp::IsEmpty => short_circuit_for_attr_var(id, inverted, attr),
        },
        Expr::Compare { attr, .. } => short_circuit_for_attr_var(id, inverted, attr),
        Expr::Equality { attr, .. } => short_circuit_for_attr_var(id, inverted, attr),
        Expr::Bool(bool_expr) => match bool_expr {
            BoolExpr::Literal(_) => ShortCircuitKind::None,
            BoolExpr::Variable(attr) => short_circuit_for_attr_var(id, inverted, attr),
            BoolExpr::Not(child) => short_circuit_for_node(id, !inverted, child),
            BoolExpr::And(lhs, rhs) => combine_and(
                short_circuit_for_node(id, inverted, lhs),
                short_circuit_for_node(id, inverted, rhs),
            ),
            BoolExpr::Or(lhs, rhs) => combine_or(
                short_circuit_for_node(id, inverted, lhs),
                short_circuit_for_node(id, inverted, rhs),
            ),
        },
        Expr::Set { left, right, .. } => match (left, right) {
            (SetLeft::Variable(attr), _) => short_circuit_for_attr_var(id, inverted, attr),
            (_, SetRight::Variable(attr)) => short_circuit_for_attr_var(id, inverted, attr),
            (left, right) => {
                unreachable!("set expression between {left:?} and {right:?}; this is a bug")
            }
        },
        Expr::List { attr, .. } => short_circuit_for_attr_var(id, inverted, attr),
        Expr::Special(special) => match special {
            Special::Frequency(frequency) => combine_and(
                short_circuit_for_attr_var(id, inverted, &frequency.caps),
                short_circuit_for_attr_var(id, inverted, &frequency.now),
            ),
            Special::Segment(segment) => combine_and(
                short_circuit_for_attr_var(id, inverted, &segment.attr),
                short_circuit_for_attr_var(id, inverted, &segment.now),
            ),
            Special::Geo(geo) => combine_and(
                short_circuit_for_attr_var(id, inverted, &geo.latitude_var),
                short_circuit_for_attr_var(id, inverted, &geo.longitude_var),
            ),
            Special::String(string) => short_circuit_for_attr_var(id, inverted, &string.attr),
        },
    }
}

fn try_short_circuit(
    short_circuit: &ShortCircuit,
    undefined: &Bitmap,
    last_reason: &mut Reason,
) -> Option<bool> {
    let words = short_circuit
        .pass
        .words()
        .iter()
        .zip(short_circuit.fail.words())
        .zip(undefined.words())
        .enumerate();
    for (index, ((pass, fail), undefined)) in words {
        if pass & undefined != 0 {
            return Some(true);
        }
        let failed = fail & undefined;
        if failed != 0 {
            let bit = index * Bitmap::BITS_PER_WORD + failed.trailing_zeros() as usize;
            *last_reason = Reason::Attribute(VariableId(bit));
            return Some(false);
        }
    }
    None
}

/// Match one subscription expression against an event. The short-circuit
/// masks are consulted first, then the expression is evaluated with
/// memoization. `last_reason` carries the blame of the innermost leaf that
/// decided a false outcome.
#[allow(clippy::too_many_arguments)]
pub(crate) fn match_subscription(
    node: &Node,
    short_circuit: &ShortCircuit,
    event: &Event,
    undefined: &Bitmap,
    memoize: &mut Memoize,
    report: &mut Report,
    last_reason: &mut Reason,
) -> bool {
    if let Some(result) = try_short_circuit(short_circuit, undefined, last_reason) {
        report.bump_shorted();
        return result;
    }
    match_node(node, event, memoize, report, last_reason)
}

pub(crate) fn match_node(
    node: &Node,
    event: &Event,
    memoize: &mut Memoize,
    report: &mut Report,
    last_reason: &mut Reason,
) -> bool {
    if let Some(id) = node.memoize_id {
        if memoize.pass.test(id) {
            report.bump_memoized();
            if let Some(reason) = memoize.reasons[id] {
                *last_reason = reason;
            }
            return true;
        }
        if memoize.fail.test(id) {
            report.bump_memoized();
            if let Some(reason) = memoize.reasons[id] {
                *last_reason = reason;
            }
            return false;
        }
    }
    let result = match &node.expr {
        Expr::Compare { op, attr, value } => {
            *last_reason = Reason::Attribute(attr.var);
            match_compare(*op, value, &event[attr.var])
        }
        Expr::Equality { op, attr, value } => {
            *last_reason = Reason::Attribute(attr.var);
            match_equality(*op, value, &event[attr.var])
        }
        Expr::Bool(bool_expr) => match_bool(bool_expr, event, memoize, report, last_reason),
        Expr::Set { op, left, right } => match_set(*op, left, right, event, last_reason),
        Expr::List { op, attr, value } => {
            *last_reason = Reason::Attribute(attr.var);
            match_list(*op, value, &event[attr.var])
        }
        Expr::IsNull { op, attr } => {
            *last_reason = Reason::Attribute(attr.var);
            match_is_null(*op, &event[attr.var])
        }
        Expr::Special(special) => match_special(special, event, last_reason),
    };
    if let Some(id) = node.memoize_id {
        if result {
            memoize.pass.set(id);
        } else {
            memoize.fail.set(id);
        }
        memoize.reasons[id] = Some(*last_reason);
    }
    result
}

fn match_compare(op: CompareOp, value: &CompareValue, variable: &AttributeValue) -> bool {
    match (value, variable) {
        (_, AttributeValue::Undefined) => false,
        (CompareValue::Integer(constant), AttributeValue::Integer(variable)) => match op {
            CompareOp::LessThan => variable < constant,
            CompareOp::LessThanEqual => variable <= constant,
            CompareOp::GreaterThan => variable > constant,
            CompareOp::GreaterThanEqual => variable >= constant,
        },
        (CompareValue::Float(constant), AttributeValue::Float(variable)) => match op {
            CompareOp::LessThan => variable < constant,
            CompareOp::LessThanEqual => variable <= constant,
            CompareOp::GreaterThan => variable > constant,
            CompareOp::GreaterThanEqual => variable >= constant,
        },
        (value, variable) => {
            unreachable!(
                "comparison ({op:?}) between {value:?} and {variable:?} should never happen. This is a bug."
            )
        }
    }
}

fn match_equality(op: EqualityOp, value: &EqualityValue, variable: &AttributeValue) -> bool {
    let equal = match (value, variable) {
        (_, AttributeValue::Undefined) => return false,
        (EqualityValue::Integer(constant), AttributeValue::Integer(variable)) => {
            variable == constant
        }
        (EqualityValue::Float(constant), AttributeValue::Float(variable)) => {
            feq(*variable, *constant)
        }
        (EqualityValue::String(constant), AttributeValue::String(variable)) => {
            variable.id == constant.id
        }
        (EqualityValue::IntegerEnum { id, .. }, AttributeValue::IntegerEnum(variable)) => {
            *variable == *id
        }
        (value, variable) => {
            unreachable!(
                "equality ({op:?}) between {value:?} and {variable:?} should never happen. This is a bug."
            )
        }
    };
    match op {
        EqualityOp::Equal => equal,
        EqualityOp::NotEqual => !equal,
    }
}

fn match_bool(
    bool_expr: &BoolExpr,
    event: &Event,
    memoize: &mut Memoize,
    report: &mut Report,
    last_reason: &mut Reason,
) -> bool {
    match bool_expr {
        BoolExpr::Literal(value) => *value,
        BoolExpr::Variable(attr) => {
            *last_reason = Reason::Attribute(attr.var);
            match &event[attr.var] {
                AttributeValue::Boolean(value) => *value,
                AttributeValue::Undefined => false,
                value => {
                    unreachable!("boolean variable read {value:?}; this is a bug")
                }
            }
        }
        BoolExpr::Not(child) => !match_node(child, event, memoize, report, last_reason),
        BoolExpr::And(lhs, rhs) => {
            // A false left side keeps its blame.
            if !match_node(lhs, event, memoize, report, last_reason) {
                return false;
            }
            match_node(rhs, event, memoize, report, last_reason)
        }
        BoolExpr::Or(lhs, rhs) => {
            // When both sides are false the right side's blame is kept, to
            // mirror the left-to-right evaluation order.
            if match_node(lhs, event, memoize, report, last_reason) {
                return true;
            }
            match_node(rhs, event, memoize, report, last_reason)
        }
    }
}

fn match_set(
    op: SetOp,
    left: &SetLeft,
    right: &SetRight,
    event: &Event,
    last_reason: &mut Reason,
) -> bool {
    let is_in = match (left, right) {
        (SetLeft::Integer(needle), SetRight::Variable(attr)) => {
            *last_reason = Reason::Attribute(attr.var);
            match &event[attr.var] {
                AttributeValue::IntegerList(values) => values.binary_search(needle).is_ok(),
                AttributeValue::Undefined => return false,
                value => {
                    unreachable!("integer set membership in {value:?}; this is a bug")
                }
            }
        }
        (SetLeft::String(needle), SetRight::Variable(attr)) => {
            *last_reason = Reason::Attribute(attr.var);
            match &event[attr.var] {
                AttributeValue::StringList(values) => values.binary_search(&needle.id).is_ok(),
                AttributeValue::Undefined => return false,
                value => {
                    unreachable!("string set membership in {value:?}; this is a bug")
                }
            }
        }
        (SetLeft::Variable(attr), SetRight::IntegerList(values)) => {
            *last_reason = Reason::Attribute(attr.var);
            match &event[attr.var] {
                AttributeValue::Integer(needle) => values.binary_search(needle).is_ok(),
                AttributeValue::Undefined => return false,
                value => {
                    unreachable!("integer set membership of {value:?}; this is a bug")
                }
            }
        }
        (SetLeft::Variable(attr), SetRight::StringList(values)) => {
            *last_reason = Reason::Attribute(attr.var);
            match &event[attr.var] {
                AttributeValue::String(needle) => values
                    .binary_search_by_key(&needle.id, |value| value.id)
                    .is_ok(),
                AttributeValue::Undefined => return false,
                value => {
                    unreachable!("string set membership of {value:?}; this is a bug")
                }
            }
        }
        (left, right) => {
            unreachable!("set expression between {left:?} and {right:?}; this is a bug")
        }
    };
    match op {
        SetOp::In => is_in,
        SetOp::NotIn => !is_in,
    }
}

fn match_list(op: ListOp, value: &ListLiteral, variable: &AttributeValue) -> bool {
    match (value, variable) {
        (_, AttributeValue::Undefined) => false,
        (ListLiteral::IntegerList(literal), AttributeValue::IntegerList(values)) => match op {
            ListOp::OneOf => integer_lists_intersect(values, literal),
            ListOp::NoneOf => !integer_lists_intersect(values, literal),
            ListOp::AllOf => integer_list_contains_all(values, literal),
        },
        (ListLiteral::StringList(literal), AttributeValue::StringList(values)) => match op {
            ListOp::OneOf => string_lists_intersect(values, literal),
            ListOp::NoneOf => !string_lists_intersect(values, literal),
            ListOp::AllOf => string_list_contains_all(values, literal),
        },
        (value, variable) => {
            unreachable!(
                "list operation ({op:?}) between {value:?} and {variable:?} should never happen. This is a bug."
            )
        }
    }
}

fn match_is_null(op: NullOp, variable: &AttributeValue) -> bool {
    match op {
        NullOp::IsNull => variable.is_undefined(),
        NullOp::IsNotNull => !variable.is_undefined(),
        NullOp::IsEmpty => match variable {
            AttributeValue::IntegerList(values) => values.is_empty(),
            AttributeValue::StringList(values) => values.is_empty(),
            AttributeValue::Undefined => false,
            value => {
                unreachable!("emptiness check for {value:?} should never happen. This is a bug.")
            }
        },
    }
}

fn match_special(special: &Special, event: &Event, last_reason: &mut Reason) -> bool {
    match special {
        Special::Frequency(frequency) => {
            *last_reason = Reason::Attribute(frequency.caps.var);
            let caps = match &event[frequency.caps.var] {
                AttributeValue::FrequencyCaps(caps) => caps,
                AttributeValue::Undefined => return false,
                value => {
                    unreachable!("frequency caps read {value:?}; this is a bug")
                }
            };
            if caps.is_empty() {
                // Nothing has been capped yet.
                return true;
            }
            let now = match &event[frequency.now.var] {
                AttributeValue::Integer(now) => *now,
                AttributeValue::Undefined => return false,
                value => {
                    unreachable!("now read {value:?}; this is a bug")
                }
            };
            let Some(id) = frequency.id else {
                unreachable!("frequency cap expression without a bound id; this is a bug")
            };
            for cap in caps {
                if cap.kind == frequency.kind
                    && cap.id == id
                    && cap.namespace == frequency.namespace
                {
                    // Timestamps are microseconds on the wire.
                    if now - cap.timestamp / 1_000_000 > frequency.length {
                        return true;
                    }
                    return cap.value < frequency.value;
                }
            }
            true
        }
        Special::Segment(segment) => {
            *last_reason = Reason::Attribute(segment.attr.var);
            let segments = match &event[segment.attr.var] {
                AttributeValue::Segments(segments) => segments,
                AttributeValue::Undefined => return false,
                value => {
                    unreachable!("segments read {value:?}; this is a bug")
                }
            };
            let now = match &event[segment.now.var] {
                AttributeValue::Integer(now) => *now,
                AttributeValue::Undefined => return false,
                value => {
                    unreachable!("now read {value:?}; this is a bug")
                }
            };
            let start = now - segment.seconds;
            for candidate in segments {
                if candidate.id == segment.segment_id {
                    let timestamp = candidate.timestamp / 1_000_000;
                    return match segment.op {
                        SegmentOp::Within => start <= timestamp,
                        SegmentOp::Before => timestamp < start,
                    };
                }
            }
            false
        }
        Special::Geo(geo) => {
            *last_reason = Reason::Geo;
            let latitude = match &event[geo.latitude_var.var] {
                AttributeValue::Float(latitude) => *latitude,
                AttributeValue::Undefined => return false,
                value => {
                    unreachable!("latitude read {value:?}; this is a bug")
                }
            };
            let longitude = match &event[geo.longitude_var.var] {
                AttributeValue::Float(longitude) => *longitude,
                AttributeValue::Undefined => return false,
                value => {
                    unreachable!("longitude read {value:?}; this is a bug")
                }
            };
            geo_within_radius(geo.latitude, geo.longitude, latitude, longitude, geo.radius)
        }
        Special::String(string) => {
            *last_reason = Reason::Attribute(string.attr.var);
            let value = match &event[string.attr.var] {
                AttributeValue::String(value) => value,
                AttributeValue::Undefined => return false,
                value => {
                    unreachable!("string special read {value:?}; this is a bug")
                }
            };
            match string.op {
                StringOp::Contains => value.value.contains(&string.pattern),
                StringOp::StartsWith => value.value.starts_with(&string.pattern),
                StringOp::EndsWith => value.value.ends_with(&string.pattern),
            }
        }
    }
}

/// Great-circle distance on a spherical earth, in kilometres.
fn geo_within_radius(
    latitude: f64,
    longitude: f64,
    event_latitude: f64,
    event_longitude: f64,
    radius: f64,
) -> bool {
    const EARTH_RADIUS: f64 = 6372.8;
    let delta_latitude = (event_latitude - latitude).to_radians() / 2.;
    let delta_longitude = (event_longitude - longitude).to_radians() / 2.;
    let a = delta_latitude.sin().powi(2)
        + latitude.to_radians().cos()
            * event_latitude.to_radians().cos()
            * delta_longitude.sin().powi(2);
    let distance = 2. * EARTH_RADIUS * a.sqrt().asin();
    distance <= radius
}

/// First index at or after `from` whose value is not below `target`.
#[inline]
fn next_low(values: &[i64], from: usize, target: i64) -> usize {
    from + values[from..].partition_point(|value| *value < target)
}

fn integer_lists_intersect(left: &[i64], right: &[i64]) -> bool {
    let (needles, haystack) = if left.len() < right.len() {
        (left, right)
    } else {
        (right, left)
    };
    let mut from = 0;
    for needle in needles {
        from = next_low(haystack, from, *needle);
        if from < haystack.len() && haystack[from] == *needle {
            return true;
        }
    }
    false
}

/// Gallop merge: every literal element must be present in the event list.
fn integer_list_contains_all(values: &[i64], literal: &[i64]) -> bool {
    if literal.len() > values.len() {
        return false;
    }
    let mut from = 0;
    for needle in literal {
        from = next_low(values, from, *needle);
        if from >= values.len() || values[from] != *needle {
            return false;
        }
    }
    true
}

fn string_lists_intersect(values: &[StringId], literal: &[StringValue]) -> bool {
    use std::cmp::Ordering;

    let mut i = 0;
    let mut j = 0;
    while i < values.len() && j < literal.len() {
        match values[i].cmp(&literal[j].id) {
            Ordering::Less => i += 1,
            Ordering::Equal => return true,
            Ordering::Greater => j += 1,
        }
    }
    false
}

fn string_list_contains_all(values: &[StringId], literal: &[StringValue]) -> bool {
    use std::cmp::Ordering;

    if literal.len() > values.len() {
        return false;
    }
    let mut i = 0;
    let mut j = 0;
    while i < values.len() && j < literal.len() {
        match values[i].cmp(&literal[j].id) {
            Ordering::Less => i += 1,
            Ordering::Equal => {
                i += 1;
                j += 1;
            }
            Ordering::Greater => return false,
        }
    }
    j >= literal.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast::PredMap,
        events::EventBuilder,
        parser,
        tree::Constant,
        values::AttributeDefinition,
    };
    use itertools::Itertools;
    use proptest::prelude::{proptest, *};

    fn define_attributes() -> AttributeTable {
        AttributeTable::new(&[
            AttributeDefinition::boolean("b", false),
            AttributeDefinition::bounded_integer("i", true, 0, 10),
            AttributeDefinition::float("f", true),
            AttributeDefinition::bounded_string("s", true, 10),
            AttributeDefinition::integer_list("il", true),
            AttributeDefinition::string_list("sl", true),
            AttributeDefinition::segments("seg", true),
            AttributeDefinition::frequency_caps("frequency_caps", true),
            AttributeDefinition::integer("now", true),
            AttributeDefinition::float("latitude", true),
            AttributeDefinition::float("longitude", true),
        ])
        .unwrap()
    }

    fn canonical(
        text: &str,
        constants: &[Constant],
        attributes: &mut AttributeTable,
    ) -> Node {
        let mut node = parser::parse(text).unwrap();
        crate::ast::assign_variable_ids(&mut node, attributes).unwrap();
        crate::ast::check_validity(&node, attributes).unwrap();
        crate::ast::assign_constants(&mut node, constants).unwrap();
        crate::ast::assign_string_ids(&mut node, attributes, true).unwrap();
        crate::ast::assign_ienum_ids(&mut node, attributes, true).unwrap();
        crate::ast::sort_lists(&mut node);
        crate::ast::coerce_float_literals(&mut node, attributes);
        node
    }

    fn evaluate_with_constants<F>(text: &str, constants: &[Constant], build: F) -> (bool, Reason)
    where
        F: FnOnce(&mut EventBuilder),
    {
        let mut attributes = define_attributes();
        let mut node = canonical(text, constants, &mut attributes);
        let mut pred_map = PredMap::new();
        pred_map.assign(&mut node);
        let short_circuit = ShortCircuit::build(&attributes, &node);
        let mut builder = EventBuilder::new(&attributes);
        build(&mut builder);
        let event = builder.build().unwrap();
        let undefined = event.undefined_bitmap();
        let mut memoize = Memoize::new(pred_map.memoize_count());
        let mut report = Report::new(attributes.len());
        let mut last_reason = Reason::Unknown;
        let result = match_subscription(
            &node,
            &short_circuit,
            &event,
            &undefined,
            &mut memoize,
            &mut report,
            &mut last_reason,
        );
        (result, last_reason)
    }

    fn evaluate<F>(text: &str, build: F) -> (bool, Reason)
    where
        F: FnOnce(&mut EventBuilder),
    {
        evaluate_with_constants(text, &[], build)
    }

    fn attribute(index: usize) -> Reason {
        Reason::Attribute(VariableId(index))
    }

    #[test]
    fn can_set_and_test_bits() {
        let mut bitmap = Bitmap::new(128);

        bitmap.set(1);
        bitmap.set(67);

        assert!(bitmap.test(1));
        assert!(bitmap.test(67));
        assert!(!bitmap.test(2));
        assert!(!bitmap.test(66));
    }

    #[test]
    fn a_bitmap_smaller_than_a_word_works() {
        let mut bitmap = Bitmap::new(15);

        bitmap.set(14);

        assert!(bitmap.test(14));
    }

    #[test]
    fn a_true_boolean_variable_matches() {
        let (result, _) = evaluate("b", |builder| {
            builder.with_boolean("b", true).unwrap();
        });

        assert!(result);
    }

    #[test]
    fn a_false_and_side_keeps_its_blame() {
        let (result, reason) = evaluate("b and i = 1", |builder| {
            builder.with_boolean("b", false).unwrap();
            builder.with_integer("i", 1).unwrap();
        });

        assert!(!result);
        assert_eq!(attribute(0), reason);
    }

    #[test]
    fn a_false_and_right_side_takes_the_blame() {
        let (result, reason) = evaluate("b and i = 1", |builder| {
            builder.with_boolean("b", true).unwrap();
            builder.with_integer("i", 2).unwrap();
        });

        assert!(!result);
        assert_eq!(attribute(1), reason);
    }

    #[test]
    fn a_failed_or_blames_its_right_side() {
        let (result, reason) = evaluate("b or i = 1", |builder| {
            builder.with_boolean("b", false).unwrap();
            builder.with_integer("i", 2).unwrap();
        });

        assert!(!result);
        assert_eq!(attribute(1), reason);
    }

    #[test]
    fn a_failed_not_keeps_the_blame_of_its_child() {
        let (result, reason) = evaluate("not b", |builder| {
            builder.with_boolean("b", true).unwrap();
        });

        assert!(!result);
        assert_eq!(attribute(0), reason);
    }

    #[test]
    fn a_missing_variable_fails_with_its_own_blame() {
        let (result, reason) = evaluate("b and f > 0.5", |builder| {
            builder.with_boolean("b", true).unwrap();
        });

        assert!(!result);
        assert_eq!(attribute(2), reason);
    }

    #[test]
    fn float_equality_is_epsilon_tolerant() {
        let (result, _) = evaluate("f = 0.1", |builder| {
            builder.with_float("f", 0.1).unwrap();
        });
        let (other, _) = evaluate("f = 0.1", |builder| {
            builder.with_float("f", 0.2).unwrap();
        });

        assert!(result);
        assert!(!other);
    }

    #[test]
    fn strict_float_comparison_uses_the_raw_operators() {
        let (result, _) = evaluate("f > 3.13", |builder| {
            builder.with_float("f", 3.14).unwrap();
        });
        let (other, _) = evaluate("f > 3.13", |builder| {
            builder.with_float("f", 3.13).unwrap();
        });

        assert!(result);
        assert!(!other);
    }

    #[test]
    fn an_unknown_event_string_never_equals_a_literal() {
        let (result, reason) = evaluate(r#"s = "known""#, |builder| {
            builder.with_string("s", "never-interned").unwrap();
        });

        assert!(!result);
        assert_eq!(attribute(3), reason);
    }

    #[test]
    fn is_null_matches_an_undefined_attribute() {
        let (result, _) = evaluate("i is null", |_| {});
        let (other, _) = evaluate("i is not null", |_| {});

        assert!(result);
        assert!(!other);
    }

    #[test]
    fn is_empty_matches_an_empty_list() {
        let (result, _) = evaluate("il is empty", |builder| {
            builder.with_integer_list("il", &[]).unwrap();
        });
        let (other, _) = evaluate("il is empty", |builder| {
            builder.with_integer_list("il", &[1]).unwrap();
        });

        assert!(result);
        assert!(!other);
    }

    #[test]
    fn a_short_circuit_fail_blames_the_undefined_attribute() {
        let (result, reason) = evaluate("b and f = 0.1", |builder| {
            builder.with_boolean("b", false).unwrap();
        });

        // f is undefined and the conjunction needs it: shorted before the
        // evaluator would have blamed b.
        assert!(!result);
        assert_eq!(attribute(2), reason);
    }

    #[test]
    fn a_short_circuit_pass_matches_without_evaluating() {
        let (result, _) = evaluate("f is null or b", |_| {});

        assert!(result);
    }

    #[test]
    fn a_segment_outside_the_window_fails() {
        let (result, reason) = evaluate("segment_within(seg, 1, 10)", |builder| {
            builder.with_segments("seg", &[(1, 10_000_000)]).unwrap();
            builder.with_integer("now", 30).unwrap();
        });

        assert!(!result);
        assert_eq!(attribute(6), reason);
    }

    #[test]
    fn a_segment_inside_the_window_matches() {
        let (result, _) = evaluate("segment_within(seg, 1, 20)", |builder| {
            builder.with_segments("seg", &[(1, 20_000_001)]).unwrap();
            builder.with_integer("now", 30).unwrap();
        });

        assert!(result);
    }

    #[test]
    fn segment_before_is_the_complement_of_the_window() {
        let (result, _) = evaluate("segment_before(seg, 1, 10)", |builder| {
            builder.with_segments("seg", &[(1, 10_000_000)]).unwrap();
            builder.with_integer("now", 30).unwrap();
        });

        assert!(result);
    }

    #[test]
    fn an_absent_frequency_cap_record_is_within_the_cap() {
        let constants = [Constant::integer("advertiser_id", 20)];
        let (result, _) = evaluate_with_constants(
            r#"within_frequency_cap("advertiser", "ns", 100, 100)"#,
            &constants,
            |builder| {
                builder
                    .with_frequency_caps(
                        "frequency_caps",
                        &[crate::values::FrequencyCap {
                            kind: crate::values::FrequencyCapKind::Campaign,
                            id: 30,
                            namespace: "ns".to_string(),
                            value: 20,
                            timestamp: 10,
                        }],
                    )
                    .unwrap();
                builder.with_integer("now", 30).unwrap();
            },
        );

        assert!(result);
    }

    #[test]
    fn a_cap_over_its_value_fails_unless_stale() {
        let constants = [Constant::integer("campaign_id", 30)];
        let expression = r#"within_frequency_cap("campaign", "ns", 10, 100)"#;
        let over = |builder: &mut EventBuilder| {
            builder
                .with_frequency_caps(
                    "frequency_caps",
                    &[crate::values::FrequencyCap {
                        kind: crate::values::FrequencyCapKind::Campaign,
                        id: 30,
                        namespace: "ns".to_string(),
                        value: 20,
                        timestamp: 10_000_000,
                    }],
                )
                .unwrap();
        };

        let (fresh, reason) = evaluate_with_constants(expression, &constants, |builder| {
            over(builder);
            builder.with_integer("now", 30).unwrap();
        });
        let (stale, _) = evaluate_with_constants(expression, &constants, |builder| {
            over(builder);
            builder.with_integer("now", 1000).unwrap();
        });

        assert!(!fresh);
        assert_eq!(attribute(7), reason);
        assert!(stale);
    }

    #[test]
    fn an_event_outside_the_geo_radius_fails_with_the_geo_blame() {
        let (result, reason) = evaluate("geo_within_radius(10, 100, 100)", |builder| {
            builder.with_float("latitude", 101.0).unwrap();
            builder.with_float("longitude", 99.0).unwrap();
        });

        assert!(!result);
        assert_eq!(Reason::Geo, reason);
    }

    #[test]
    fn an_event_at_the_centre_is_within_the_geo_radius() {
        let (result, _) = evaluate("geo_within_radius(10, 100, 100)", |builder| {
            builder.with_float("latitude", 10.0).unwrap();
            builder.with_float("longitude", 100.0).unwrap();
        });

        assert!(result);
    }

    #[test]
    fn substring_specials_use_the_original_text() {
        let mut attributes = define_attributes();
        // Intern the value so the equality-side machinery is irrelevant here.
        let _ = canonical(r#"s = "betrees""#, &[], &mut attributes);

        let mut check = |expression: &str, value: &str| {
            let mut node = canonical(expression, &[], &mut attributes);
            let mut pred_map = PredMap::new();
            pred_map.assign(&mut node);
            let short_circuit = ShortCircuit::build(&attributes, &node);
            let mut builder = EventBuilder::new(&attributes);
            builder.with_string("s", value).unwrap();
            let event = builder.build().unwrap();
            let undefined = event.undefined_bitmap();
            let mut memoize = Memoize::new(pred_map.memoize_count());
            let mut report = Report::new(attributes.len());
            let mut last_reason = Reason::Unknown;
            match_subscription(
                &node,
                &short_circuit,
                &event,
                &undefined,
                &mut memoize,
                &mut report,
                &mut last_reason,
            )
        };

        assert!(check(r#"contains(s, "tree")"#, "betrees"));
        assert!(!check(r#"contains(s, "oak")"#, "betrees"));
        assert!(check(r#"starts_with(s, "be")"#, "betrees"));
        assert!(check(r#"ends_with(s, "trees")"#, "betrees"));
    }

    #[test]
    fn a_memoized_node_replays_its_blame() {
        let mut attributes = define_attributes();
        let mut pred_map = PredMap::new();
        let mut first = canonical("b and i = 1", &[], &mut attributes);
        let mut second = canonical("b and i = 1", &[], &mut attributes);
        pred_map.assign(&mut first);
        pred_map.assign(&mut second);
        let mut builder = EventBuilder::new(&attributes);
        builder.with_boolean("b", true).unwrap();
        builder.with_integer("i", 2).unwrap();
        let event = builder.build().unwrap();
        let undefined = event.undefined_bitmap();
        let mut memoize = Memoize::new(pred_map.memoize_count());
        let mut report = Report::new(attributes.len());
        let short_circuit = ShortCircuit::build(&attributes, &first);

        let mut first_reason = Reason::Unknown;
        let first_result = match_subscription(
            &first,
            &short_circuit,
            &event,
            &undefined,
            &mut memoize,
            &mut report,
            &mut first_reason,
        );
        let mut second_reason = Reason::Unknown;
        let second_result = match_subscription(
            &second,
            &short_circuit,
            &event,
            &undefined,
            &mut memoize,
            &mut report,
            &mut second_reason,
        );

        assert!(!first_result);
        assert!(!second_result);
        assert_eq!(first_reason, second_reason);
        assert!(report.memoized() > 0);
    }

    proptest! {
        #[test]
        fn in_is_the_complement_of_not_in(needle in 0i64..10) {
            let (is_in, _) = evaluate("i in (0, 2, 4, 6, 8)", |builder| {
                builder.with_integer("i", needle).unwrap();
            });
            let (not_in, _) = evaluate("i not in (0, 2, 4, 6, 8)", |builder| {
                builder.with_integer("i", needle).unwrap();
            });
            prop_assert_eq!(is_in, !not_in);
        }

        #[test]
        fn one_of_matches_a_naive_intersection(left in prop::collection::vec(0i64..50, 0..30), right in prop::collection::vec(0i64..50, 0..30)) {
            let left = left.into_iter().sorted().dedup().collect_vec();
            let right = right.into_iter().sorted().dedup().collect_vec();
            let expected = left.iter().any(|value| right.contains(value));
            prop_assert_eq!(expected, integer_lists_intersect(&left, &right));
        }

        #[test]
        fn none_of_means_an_empty_intersection(left in prop::collection::vec(0i64..50, 0..30), right in prop::collection::vec(0i64..50, 0..30)) {
            let left = left.into_iter().sorted().dedup().collect_vec();
            let right = right.into_iter().sorted().dedup().collect_vec();
            let expected = left.iter().all(|value| !right.contains(value));
            prop_assert_eq!(expected, !integer_lists_intersect(&left, &right));
        }

        #[test]
        fn all_of_matches_a_naive_subset_check(values in prop::collection::vec(0i64..50, 0..30), literal in prop::collection::vec(0i64..50, 0..30)) {
            let values = values.into_iter().sorted().dedup().collect_vec();
            let literal = literal.into_iter().sorted().dedup().collect_vec();
            let expected = literal.iter().all(|value| values.contains(value));
            prop_assert_eq!(expected, integer_list_contains_all(&values, &literal));
        }
    }
}
