use crate::{
    error::{InsertionError, ValidationError},
    evaluation::Bitmap,
    strings::{IenumId, StringId},
    tree::Constant,
    values::{AttributeTable, FrequencyCapKind, StringValue, ValueKind, VariableId},
};
use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
};

pub(crate) type TreeNode = Box<Node>;

/// One node of a subscription expression. The `memoize_id` is assigned after
/// canonicalisation; nodes with the same canonical form share one.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Node {
    pub(crate) memoize_id: Option<usize>,
    pub(crate) expr: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Expr {
    Compare {
        op: CompareOp,
        attr: AttrVar,
        value: CompareValue,
    },
    Equality {
        op: EqualityOp,
        attr: AttrVar,
        value: EqualityValue,
    },
    Bool(BoolExpr),
    Set {
        op: SetOp,
        left: SetLeft,
        right: SetRight,
    },
    List {
        op: ListOp,
        attr: AttrVar,
        value: ListLiteral,
    },
    IsNull {
        op: NullOp,
        attr: AttrVar,
    },
    Special(Special),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum BoolExpr {
    Literal(bool),
    Variable(AttrVar),
    Not(TreeNode),
    And(TreeNode, TreeNode),
    Or(TreeNode, TreeNode),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum CompareOp {
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
}

impl CompareOp {
    /// Mirror the operator so that `15 < price` can be stored as
    /// `price > 15`.
    pub(crate) fn flipped(self) -> Self {
        match self {
            Self::LessThan => Self::GreaterThan,
            Self::LessThanEqual => Self::GreaterThanEqual,
            Self::GreaterThan => Self::LessThan,
            Self::GreaterThanEqual => Self::LessThanEqual,
        }
    }

    /// The operator under a `not`.
    pub(crate) fn inverted(self) -> Self {
        match self {
            Self::LessThan => Self::GreaterThanEqual,
            Self::LessThanEqual => Self::GreaterThan,
            Self::GreaterThan => Self::LessThanEqual,
            Self::GreaterThanEqual => Self::LessThan,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum CompareValue {
    Integer(i64),
    Float(f64),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum EqualityOp {
    Equal,
    NotEqual,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum EqualityValue {
    Integer(i64),
    Float(f64),
    String(StringValue),
    IntegerEnum { id: IenumId, value: i64 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum SetOp {
    In,
    NotIn,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum SetLeft {
    Integer(i64),
    String(StringValue),
    Variable(AttrVar),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum SetRight {
    IntegerList(Vec<i64>),
    StringList(Vec<StringValue>),
    Variable(AttrVar),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum ListOp {
    OneOf,
    NoneOf,
    AllOf,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ListLiteral {
    IntegerList(Vec<i64>),
    StringList(Vec<StringValue>),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum NullOp {
    IsNull,
    IsNotNull,
    IsEmpty,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Special {
    Frequency(SpecialFrequency),
    Segment(SpecialSegment),
    Geo(SpecialGeo),
    String(SpecialString),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SpecialFrequency {
    pub(crate) kind: FrequencyCapKind,
    pub(crate) namespace: String,
    /// Subscription-side cap id, bound from the insertion constants.
    pub(crate) id: Option<i64>,
    pub(crate) value: i64,
    pub(crate) length: i64,
    pub(crate) caps: AttrVar,
    pub(crate) now: AttrVar,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum SegmentOp {
    Within,
    Before,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SpecialSegment {
    pub(crate) op: SegmentOp,
    pub(crate) attr: AttrVar,
    pub(crate) now: AttrVar,
    pub(crate) segment_id: i64,
    pub(crate) seconds: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SpecialGeo {
    pub(crate) latitude: f64,
    pub(crate) longitude: f64,
    pub(crate) radius: f64,
    pub(crate) latitude_var: AttrVar,
    pub(crate) longitude_var: AttrVar,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum StringOp {
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SpecialString {
    pub(crate) op: StringOp,
    pub(crate) attr: AttrVar,
    pub(crate) pattern: String,
}

/// An attribute reference: the name from the expression text and the dense id
/// resolved against the registered domains.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct AttrVar {
    pub(crate) attr: String,
    pub(crate) var: VariableId,
}

impl AttrVar {
    pub(crate) fn new(attr: &str) -> Self {
        Self {
            attr: attr.to_string(),
            var: VariableId::INVALID,
        }
    }
}

impl Node {
    fn new(expr: Expr) -> Self {
        Self {
            memoize_id: None,
            expr,
        }
    }

    pub(crate) fn and(lhs: Node, rhs: Node) -> Self {
        Self::new(Expr::Bool(BoolExpr::And(Box::new(lhs), Box::new(rhs))))
    }

    pub(crate) fn or(lhs: Node, rhs: Node) -> Self {
        Self::new(Expr::Bool(BoolExpr::Or(Box::new(lhs), Box::new(rhs))))
    }

    pub(crate) fn negate(value: Node) -> Self {
        Self::new(Expr::Bool(BoolExpr::Not(Box::new(value))))
    }

    pub(crate) fn literal(value: bool) -> Self {
        Self::new(Expr::Bool(BoolExpr::Literal(value)))
    }

    pub(crate) fn variable(name: &str) -> Self {
        Self::new(Expr::Bool(BoolExpr::Variable(AttrVar::new(name))))
    }

    pub(crate) fn compare(op: CompareOp, name: &str, value: CompareValue) -> Self {
        Self::new(Expr::Compare {
            op,
            attr: AttrVar::new(name),
            value,
        })
    }

    pub(crate) fn equality(op: EqualityOp, name: &str, value: EqualityValue) -> Self {
        Self::new(Expr::Equality {
            op,
            attr: AttrVar::new(name),
            value,
        })
    }

    pub(crate) fn set_with_literal(op: SetOp, name: &str, literal: ListLiteral) -> Self {
        let right = match literal {
            ListLiteral::IntegerList(values) => SetRight::IntegerList(values),
            ListLiteral::StringList(values) => SetRight::StringList(values),
        };
        Self::new(Expr::Set {
            op,
            left: SetLeft::Variable(AttrVar::new(name)),
            right,
        })
    }

    pub(crate) fn set_integer_in_variable(op: SetOp, value: i64, name: &str) -> Self {
        Self::new(Expr::Set {
            op,
            left: SetLeft::Integer(value),
            right: SetRight::Variable(AttrVar::new(name)),
        })
    }

    pub(crate) fn set_string_in_variable(op: SetOp, value: &str, name: &str) -> Self {
        Self::new(Expr::Set {
            op,
            left: SetLeft::String(StringValue::new(value)),
            right: SetRight::Variable(AttrVar::new(name)),
        })
    }

    pub(crate) fn list(op: ListOp, name: &str, value: ListLiteral) -> Self {
        Self::new(Expr::List {
            op,
            attr: AttrVar::new(name),
            value,
        })
    }

    pub(crate) fn is_null(op: NullOp, name: &str) -> Self {
        Self::new(Expr::IsNull {
            op,
            attr: AttrVar::new(name),
        })
    }

    pub(crate) fn frequency(kind: FrequencyCapKind, namespace: &str, value: i64, length: i64) -> Self {
        Self::new(Expr::Special(Special::Frequency(SpecialFrequency {
            kind,
            namespace: namespace.to_string(),
            id: None,
            value,
            length,
            caps: AttrVar::new("frequency_caps"),
            now: AttrVar::new("now"),
        })))
    }

    pub(crate) fn segment(op: SegmentOp, name: Option<&str>, segment_id: i64, seconds: i64) -> Self {
        Self::new(Expr::Special(Special::Segment(SpecialSegment {
            op,
            attr: AttrVar::new(name.unwrap_or("segments")),
            now: AttrVar::new("now"),
            segment_id,
            seconds,
        })))
    }

    pub(crate) fn geo(latitude: f64, longitude: f64, radius: f64) -> Self {
        Self::new(Expr::Special(Special::Geo(SpecialGeo {
            latitude,
            longitude,
            radius,
            latitude_var: AttrVar::new("latitude"),
            longitude_var: AttrVar::new("longitude"),
        })))
    }

    pub(crate) fn string_special(op: StringOp, name: &str, pattern: &str) -> Self {
        Self::new(Expr::Special(Special::String(SpecialString {
            op,
            attr: AttrVar::new(name),
            pattern: pattern.to_string(),
        })))
    }
}

/// Resolve every attribute reference against the registered domains.
pub(crate) fn assign_variable_ids(
    node: &mut Node,
    attributes: &AttributeTable,
) -> Result<(), ValidationError> {
    visit_attr_vars(node, &mut |attr_var| {
        match attributes.by_name(&attr_var.attr) {
            Some(id) => {
                attr_var.var = id;
                Ok(())
            }
            None => Err(ValidationError::UnknownAttribute(attr_var.attr.clone())),
        }
    })
}

fn visit_attr_vars<F>(node: &mut Node, visit: &mut F) -> Result<(), ValidationError>
where
    F: FnMut(&mut AttrVar) -> Result<(), ValidationError>,
{
    match &mut node.expr {
        Expr::Compare { attr, .. } => visit(attr),
        Expr::Equality { attr, .. } => visit(attr),
        Expr::Bool(bool_expr) => match bool_expr {
            BoolExpr::Literal(_) => Ok(()),
            BoolExpr::Variable(attr) => visit(attr),
            BoolExpr::Not(child) => visit_attr_vars(child, visit),
            BoolExpr::And(lhs, rhs) | BoolExpr::Or(lhs, rhs) => {
                visit_attr_vars(lhs, visit)?;
                visit_attr_vars(rhs, visit)
            }
        },
        Expr::Set { left, right, .. } => {
            if let SetLeft::Variable(attr) = left {
                visit(attr)?;
            }
            if let SetRight::Variable(attr) = right {
                visit(attr)?;
            }
            Ok(())
        }
        Expr::List { attr, .. } => visit(attr),
        Expr::IsNull { attr, .. } => visit(attr),
        Expr::Special(special) => match special {
            Special::Frequency(frequency) => {
                visit(&mut frequency.caps)?;
                visit(&mut frequency.now)
            }
            Special::Segment(segment) => {
                visit(&mut segment.attr)?;
                visit(&mut segment.now)
            }
            Special::Geo(geo) => {
                visit(&mut geo.latitude_var)?;
                visit(&mut geo.longitude_var)
            }
            Special::String(string) => visit(&mut string.attr),
        },
    }
}

/// Check that every expression uses its attribute with the registered kind.
pub(crate) fn check_validity(
    node: &Node,
    attributes: &AttributeTable,
) -> Result<(), ValidationError> {
    let mismatch = |attr: &AttrVar| ValidationError::MismatchingKinds {
        name: attr.attr.clone(),
        kind: attributes.domain(attr.var).kind,
    };
    let kind_of = |attr: &AttrVar| attributes.domain(attr.var).kind;
    match &node.expr {
        Expr::Compare { attr, value, .. } => match (value, kind_of(attr)) {
            (CompareValue::Integer(_), ValueKind::Integer | ValueKind::Float) => Ok(()),
            (CompareValue::Float(_), ValueKind::Float) => Ok(()),
            _ => Err(mismatch(attr)),
        },
        Expr::Equality { attr, value, .. } => match (value, kind_of(attr)) {
            (EqualityValue::Integer(_), ValueKind::Integer | ValueKind::Float) => Ok(()),
            (EqualityValue::Integer(_), ValueKind::IntegerEnum) => Ok(()),
            (EqualityValue::IntegerEnum { .. }, ValueKind::IntegerEnum) => Ok(()),
            (EqualityValue::Float(_), ValueKind::Float) => Ok(()),
            (EqualityValue::String(_), ValueKind::String) => Ok(()),
            _ => Err(mismatch(attr)),
        },
        Expr::Bool(bool_expr) => match bool_expr {
            BoolExpr::Literal(_) => Ok(()),
            BoolExpr::Variable(attr) => match kind_of(attr) {
                ValueKind::Boolean => Ok(()),
                _ => Err(mismatch(attr)),
            },
            BoolExpr::Not(child) => check_validity(child, attributes),
            BoolExpr::And(lhs, rhs) | BoolExpr::Or(lhs, rhs) => {
                check_validity(lhs, attributes)?;
                check_validity(rhs, attributes)
            }
        },
        Expr::Set { left, right, .. } => match (left, right) {
            (SetLeft::Variable(attr), SetRight::IntegerList(_)) => match kind_of(attr) {
                ValueKind::Integer => Ok(()),
                _ => Err(mismatch(attr)),
            },
            (SetLeft::Variable(attr), SetRight::StringList(_)) => match kind_of(attr) {
                ValueKind::String => Ok(()),
                _ => Err(mismatch(attr)),
            },
            (SetLeft::Integer(_), SetRight::Variable(attr)) => match kind_of(attr) {
                ValueKind::IntegerList => Ok(()),
                _ => Err(mismatch(attr)),
            },
            (SetLeft::String(_), SetRight::Variable(attr)) => match kind_of(attr) {
                ValueKind::StringList => Ok(()),
                _ => Err(mismatch(attr)),
            },
            (left, right) => {
                unreachable!("set expression between {left:?} and {right:?}; this is a bug")
            }
        },
        Expr::List { attr, value, .. } => match (value, kind_of(attr)) {
            (ListLiteral::IntegerList(_), ValueKind::IntegerList) => Ok(()),
            (ListLiteral::StringList(_), ValueKind::StringList) => Ok(()),
            _ => Err(mismatch(attr)),
        },
        Expr::IsNull { op, attr } => match op {
            NullOp::IsNull | NullOp::IsNotNull => Ok(()),
            NullOp::IsEmpty => match kind_of(attr) {
                ValueKind::IntegerList | ValueKind::StringList => Ok(()),
                _ => Err(mismatch(attr)),
            },
        },
        Expr::Special(special) => match special {
            Special::Frequency(frequency) => {
                if kind_of(&frequency.caps) != ValueKind::FrequencyCaps {
                    return Err(mismatch(&frequency.caps));
                }
                match kind_of(&frequency.now) {
                    ValueKind::Integer => Ok(()),
                    _ => Err(mismatch(&frequency.now)),
                }
            }
            Special::Segment(segment) => {
                if kind_of(&segment.attr) != ValueKind::Segments {
                    return Err(mismatch(&segment.attr));
                }
                match kind_of(&segment.now) {
                    ValueKind::Integer => Ok(()),
                    _ => Err(mismatch(&segment.now)),
                }
            }
            Special::Geo(geo) => {
                if kind_of(&geo.latitude_var) != ValueKind::Float {
                    return Err(mismatch(&geo.latitude_var));
                }
                match kind_of(&geo.longitude_var) {
                    ValueKind::Float => Ok(()),
                    _ => Err(mismatch(&geo.longitude_var)),
                }
            }
            Special::String(string) => match kind_of(&string.attr) {
                ValueKind::String => Ok(()),
                _ => Err(mismatch(&string.attr)),
            },
        },
    }
}

/// Bind the subscription-side cap ids of every frequency expression from the
/// caller-supplied constants.
pub(crate) fn assign_constants(
    node: &mut Node,
    constants: &[Constant],
) -> Result<(), InsertionError> {
    match &mut node.expr {
        Expr::Bool(BoolExpr::Not(child)) => assign_constants(child, constants),
        Expr::Bool(BoolExpr::And(lhs, rhs)) | Expr::Bool(BoolExpr::Or(lhs, rhs)) => {
            assign_constants(lhs, constants)?;
            assign_constants(rhs, constants)
        }
        Expr::Special(Special::Frequency(frequency)) => {
            let name = frequency.kind.constant_name();
            let constant = constants
                .iter()
                .find(|constant| constant.name == name)
                .ok_or_else(|| InsertionError::MissingConstant(name.to_string()))?;
            frequency.id = Some(constant.value);
            Ok(())
        }
        _ => Ok(()),
    }
}

fn intern_string(
    attributes: &mut AttributeTable,
    var: VariableId,
    value: &mut StringValue,
    create_if_missing: bool,
) -> Result<(), ValidationError> {
    let domain = attributes.domain_mut(var);
    let name = domain.name.clone();
    let capacity = domain.capacity;
    let Some(table) = domain.strings.as_mut() else {
        unreachable!("interning a string for the non-string attribute {name:?}; this is a bug")
    };
    if let Some(id) = table.get(&value.value) {
        value.id = id;
        return Ok(());
    }
    if !create_if_missing {
        value.id = StringId::UNKNOWN;
        return Ok(());
    }
    if capacity.is_some_and(|capacity| table.len() >= capacity) {
        return Err(ValidationError::OutOfBoundsString {
            name,
            value: value.value.clone(),
        });
    }
    value.id = table.get_or_update(&value.value);
    Ok(())
}

/// Assign interned ids to every string literal. The insert path creates
/// missing ids (failing on bounded domains that are full); the query path
/// leaves them unknown.
pub(crate) fn assign_string_ids(
    node: &mut Node,
    attributes: &mut AttributeTable,
    create_if_missing: bool,
) -> Result<(), ValidationError> {
    match &mut node.expr {
        Expr::Equality { attr, value, .. } => {
            if let EqualityValue::String(value) = value {
                intern_string(attributes, attr.var, value, create_if_missing)?;
            }
            Ok(())
        }
        Expr::Bool(BoolExpr::Not(child)) => assign_string_ids(child, attributes, create_if_missing),
        Expr::Bool(BoolExpr::And(lhs, rhs)) | Expr::Bool(BoolExpr::Or(lhs, rhs)) => {
            assign_string_ids(lhs, attributes, create_if_missing)?;
            assign_string_ids(rhs, attributes, create_if_missing)
        }
        Expr::Set { left, right, .. } => match (left, right) {
            (SetLeft::String(value), SetRight::Variable(attr)) => {
                intern_string(attributes, attr.var, value, create_if_missing)
            }
            (SetLeft::Variable(attr), SetRight::StringList(values)) => {
                for value in values {
                    intern_string(attributes, attr.var, value, create_if_missing)?;
                }
                Ok(())
            }
            _ => Ok(()),
        },
        Expr::List { attr, value, .. } => {
            if let ListLiteral::StringList(values) = value {
                for value in values {
                    intern_string(attributes, attr.var, value, create_if_missing)?;
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Rewrite integer equality literals into interned enum ids when the compared
/// attribute is an integer enumeration.
pub(crate) fn assign_ienum_ids(
    node: &mut Node,
    attributes: &mut AttributeTable,
    create_if_missing: bool,
) -> Result<(), ValidationError> {
    match &mut node.expr {
        Expr::Equality { attr, value, .. } => {
            let raw = match value {
                EqualityValue::Integer(raw) => *raw,
                EqualityValue::IntegerEnum { value: raw, .. } => *raw,
                _ => return Ok(()),
            };
            let domain = attributes.domain_mut(attr.var);
            if domain.kind != ValueKind::IntegerEnum {
                return Ok(());
            }
            let name = domain.name.clone();
            let capacity = domain.capacity;
            let Some(table) = domain.ienums.as_mut() else {
                unreachable!("missing enum table for attribute {name:?}; this is a bug")
            };
            let id = if let Some(id) = table.get(raw) {
                id
            } else if !create_if_missing {
                IenumId::UNKNOWN
            } else if capacity.is_some_and(|capacity| table.len() >= capacity) {
                return Err(ValidationError::OutOfBoundsIntegerEnum { name, value: raw });
            } else {
                table.get_or_update(raw)
            };
            *value = EqualityValue::IntegerEnum { id, value: raw };
            Ok(())
        }
        Expr::Bool(BoolExpr::Not(child)) => assign_ienum_ids(child, attributes, create_if_missing),
        Expr::Bool(BoolExpr::And(lhs, rhs)) | Expr::Bool(BoolExpr::Or(lhs, rhs)) => {
            assign_ienum_ids(lhs, attributes, create_if_missing)?;
            assign_ienum_ids(rhs, attributes, create_if_missing)
        }
        _ => Ok(()),
    }
}

/// Sort list literals ascending and drop duplicates so that membership tests
/// can binary search.
pub(crate) fn sort_lists(node: &mut Node) {
    fn sort_integers(values: &mut Vec<i64>) {
        values.sort_unstable();
        values.dedup();
    }

    fn sort_strings(values: &mut Vec<StringValue>) {
        values.sort_unstable_by_key(|value| value.id);
        values.dedup_by_key(|value| value.id);
    }

    match &mut node.expr {
        Expr::Bool(BoolExpr::Not(child)) => sort_lists(child),
        Expr::Bool(BoolExpr::And(lhs, rhs)) | Expr::Bool(BoolExpr::Or(lhs, rhs)) => {
            sort_lists(lhs);
            sort_lists(rhs);
        }
        Expr::Set { right, .. } => match right {
            SetRight::IntegerList(values) => sort_integers(values),
            SetRight::StringList(values) => sort_strings(values),
            SetRight::Variable(_) => {}
        },
        Expr::List { value, .. } => match value {
            ListLiteral::IntegerList(values) => sort_integers(values),
            ListLiteral::StringList(values) => sort_strings(values),
        },
        _ => {}
    }
}

/// Rewrite integer literals compared against float attributes into floats.
pub(crate) fn coerce_float_literals(node: &mut Node, attributes: &AttributeTable) {
    match &mut node.expr {
        Expr::Compare { attr, value, .. } => {
            if let CompareValue::Integer(raw) = value {
                if attributes.domain(attr.var).kind == ValueKind::Float {
                    *value = CompareValue::Float(*raw as f64);
                }
            }
        }
        Expr::Equality { attr, value, .. } => {
            if let EqualityValue::Integer(raw) = value {
                if attributes.domain(attr.var).kind == ValueKind::Float {
                    *value = EqualityValue::Float(*raw as f64);
                }
            }
        }
        Expr::Bool(BoolExpr::Not(child)) => coerce_float_literals(child, attributes),
        Expr::Bool(BoolExpr::And(lhs, rhs)) | Expr::Bool(BoolExpr::Or(lhs, rhs)) => {
            coerce_float_literals(lhs, attributes);
            coerce_float_literals(rhs, attributes);
        }
        _ => {}
    }
}

fn for_each_attr_var<F>(node: &Node, visit: &mut F)
where
    F: FnMut(&AttrVar),
{
    match &node.expr {
        Expr::Compare { attr, .. } => visit(attr),
        Expr::Equality { attr, .. } => visit(attr),
        Expr::Bool(bool_expr) => match bool_expr {
            BoolExpr::Literal(_) => {}
            BoolExpr::Variable(attr) => visit(attr),
            BoolExpr::Not(child) => for_each_attr_var(child, visit),
            BoolExpr::And(lhs, rhs) | BoolExpr::Or(lhs, rhs) => {
                for_each_attr_var(lhs, visit);
                for_each_attr_var(rhs, visit);
            }
        },
        Expr::Set { left, right, .. } => {
            if let SetLeft::Variable(attr) = left {
                visit(attr);
            }
            if let SetRight::Variable(attr) = right {
                visit(attr);
            }
        }
        Expr::List { attr, .. } => visit(attr),
        Expr::IsNull { attr, .. } => visit(attr),
        Expr::Special(special) => match special {
            Special::Frequency(frequency) => {
                visit(&frequency.caps);
                visit(&frequency.now);
            }
            Special::Segment(segment) => {
                visit(&segment.attr);
                visit(&segment.now);
            }
            Special::Geo(geo) => {
                visit(&geo.latitude_var);
                visit(&geo.longitude_var);
            }
            Special::String(string) => visit(&string.attr),
        },
    }
}

/// The set of attributes the expression reads, as a bitmap over variable ids.
pub(crate) fn attribute_set(node: &Node, attribute_count: usize) -> Bitmap {
    let mut bitmap = Bitmap::new(attribute_count);
    for_each_attr_var(node, &mut |attr_var| bitmap.set(attr_var.var.0));
    bitmap
}

/// Assigns dense memoize ids from canonical fingerprints. One map spans every
/// subscription of a tree, so identical sub-expressions share ids.
#[derive(Clone, Debug, Default)]
pub(crate) struct PredMap {
    ids: HashMap<String, usize>,
}

impl PredMap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn memoize_count(&self) -> usize {
        self.ids.len()
    }

    /// Post-order walk so children are fingerprinted before their parents.
    /// Boolean literals are too cheap to be worth memoizing.
    pub(crate) fn assign(&mut self, node: &mut Node) {
        match &mut node.expr {
            Expr::Bool(BoolExpr::Not(child)) => self.assign(child),
            Expr::Bool(BoolExpr::And(lhs, rhs)) | Expr::Bool(BoolExpr::Or(lhs, rhs)) => {
                self.assign(lhs);
                self.assign(rhs);
            }
            _ => {}
        }
        if matches!(node.expr, Expr::Bool(BoolExpr::Literal(_))) {
            return;
        }
        let next = self.ids.len();
        let id = *self.ids.entry(node.to_string()).or_insert(next);
        node.memoize_id = Some(id);
    }
}

impl Display for Node {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.expr {
            Expr::Compare { op, attr, value } => {
                let op = match op {
                    CompareOp::LessThan => "lt",
                    CompareOp::LessThanEqual => "le",
                    CompareOp::GreaterThan => "gt",
                    CompareOp::GreaterThanEqual => "ge",
                };
                write!(formatter, "({op} v{} {value})", attr.var.0)
            }
            Expr::Equality { op, attr, value } => {
                let op = match op {
                    EqualityOp::Equal => "eq",
                    EqualityOp::NotEqual => "ne",
                };
                write!(formatter, "({op} v{} {value})", attr.var.0)
            }
            Expr::Bool(bool_expr) => match bool_expr {
                BoolExpr::Literal(value) => write!(formatter, "(lit {value})"),
                BoolExpr::Variable(attr) => write!(formatter, "(var v{})", attr.var.0),
                BoolExpr::Not(child) => write!(formatter, "(not {child})"),
                BoolExpr::And(lhs, rhs) => write!(formatter, "(and {lhs} {rhs})"),
                BoolExpr::Or(lhs, rhs) => write!(formatter, "(or {lhs} {rhs})"),
            },
            Expr::Set { op, left, right } => {
                let op = match op {
                    SetOp::In => "in",
                    SetOp::NotIn => "not-in",
                };
                write!(formatter, "({op} {left} {right})")
            }
            Expr::List { op, attr, value } => {
                let op = match op {
                    ListOp::OneOf => "one-of",
                    ListOp::NoneOf => "none-of",
                    ListOp::AllOf => "all-of",
                };
                write!(formatter, "({op} v{} {value})", attr.var.0)
            }
            Expr::IsNull { op, attr } => {
                let op = match op {
                    NullOp::IsNull => "null",
                    NullOp::IsNotNull => "not-null",
                    NullOp::IsEmpty => "empty",
                };
                write!(formatter, "({op} v{})", attr.var.0)
            }
            Expr::Special(special) => match special {
                Special::Frequency(frequency) => write!(
                    formatter,
                    "(frequency-cap {} {:?} {:?} {} {} v{} v{})",
                    frequency.kind,
                    frequency.namespace,
                    frequency.id,
                    frequency.value,
                    frequency.length,
                    frequency.caps.var.0,
                    frequency.now.var.0,
                ),
                Special::Segment(segment) => {
                    let op = match segment.op {
                        SegmentOp::Within => "segment-within",
                        SegmentOp::Before => "segment-before",
                    };
                    write!(
                        formatter,
                        "({op} v{} v{} {} {})",
                        segment.attr.var.0, segment.now.var.0, segment.segment_id, segment.seconds,
                    )
                }
                Special::Geo(geo) => write!(
                    formatter,
                    "(geo {:?} {:?} {:?} v{} v{})",
                    geo.latitude,
                    geo.longitude,
                    geo.radius,
                    geo.latitude_var.var.0,
                    geo.longitude_var.var.0,
                ),
                Special::String(string) => {
                    let op = match string.op {
                        StringOp::Contains => "contains",
                        StringOp::StartsWith => "starts-with",
                        StringOp::EndsWith => "ends-with",
                    };
                    write!(formatter, "({op} v{} {:?})", string.attr.var.0, string.pattern)
                }
            },
        }
    }
}

impl Display for CompareValue {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(value) => write!(formatter, "i{value}"),
            Self::Float(value) => write!(formatter, "f{value:?}"),
        }
    }
}

impl Display for EqualityValue {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(value) => write!(formatter, "i{value}"),
            Self::Float(value) => write!(formatter, "f{value:?}"),
            Self::String(value) => write!(formatter, "s{}", value.id.0),
            Self::IntegerEnum { id, .. } => write!(formatter, "e{}", id.0),
        }
    }
}

impl Display for SetLeft {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(value) => write!(formatter, "i{value}"),
            Self::String(value) => write!(formatter, "s{}", value.id.0),
            Self::Variable(attr) => write!(formatter, "v{}", attr.var.0),
        }
    }
}

impl Display for SetRight {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IntegerList(values) => write!(formatter, "il{values:?}"),
            Self::StringList(values) => {
                let ids: Vec<_> = values.iter().map(|value| value.id.0).collect();
                write!(formatter, "sl{ids:?}")
            }
            Self::Variable(attr) => write!(formatter, "v{}", attr.var.0),
        }
    }
}

impl Display for ListLiteral {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IntegerList(values) => write!(formatter, "il{values:?}"),
            Self::StringList(values) => {
                let ids: Vec<_> = values.iter().map(|value| value.id.0).collect();
                write!(formatter, "sl{ids:?}")
            }
        }
    }
}
