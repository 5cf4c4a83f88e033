use crate::{
    events::EventError,
    strings::{IenumId, IntegerEnumTable, StringId, StringTable},
};
use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
};

/// Tolerant float equality, matching the evaluator's `=`/`<>` semantics.
/// Strict comparisons (`<`, `>`) use the raw operators.
#[inline]
pub(crate) fn feq(a: f64, b: f64) -> bool {
    (a - b).abs() <= f64::EPSILON
}

#[inline]
pub(crate) fn fne(a: f64, b: f64) -> bool {
    !feq(a, b)
}

/// Dense, 0-based identifier of a registered attribute.
#[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Debug, Hash)]
pub struct VariableId(pub(crate) usize);

impl VariableId {
    pub(crate) const INVALID: VariableId = VariableId(usize::MAX);
}

impl Display for VariableId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "attribute({})", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ValueKind {
    Boolean,
    Integer,
    Float,
    String,
    IntegerEnum,
    IntegerList,
    StringList,
    Segments,
    FrequencyCaps,
}

/// An interned string: the dense id drives comparisons, the original text is
/// kept for the substring specials.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct StringValue {
    pub(crate) id: StringId,
    pub(crate) value: String,
}

impl StringValue {
    pub(crate) fn new(value: &str) -> Self {
        Self {
            id: StringId::UNKNOWN,
            value: value.to_string(),
        }
    }

    pub(crate) fn interned(id: StringId, value: &str) -> Self {
        Self {
            id,
            value: value.to_string(),
        }
    }
}

/// One `(segment-id, timestamp)` pair. Timestamps are in microseconds, as on
/// the wire.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Segment {
    pub id: i64,
    pub timestamp: i64,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum FrequencyCapKind {
    Advertiser,
    AdvertiserIp,
    Campaign,
    CampaignIp,
    Flight,
    FlightIp,
    Product,
    ProductIp,
}

impl FrequencyCapKind {
    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "advertiser" => Some(Self::Advertiser),
            "advertiser:ip" => Some(Self::AdvertiserIp),
            "campaign" => Some(Self::Campaign),
            "campaign:ip" => Some(Self::CampaignIp),
            "flight" => Some(Self::Flight),
            "flight:ip" => Some(Self::FlightIp),
            "product" => Some(Self::Product),
            "product:ip" => Some(Self::ProductIp),
            _ => None,
        }
    }

    /// Name of the insertion constant carrying the subscription-side id for
    /// this cap kind.
    pub(crate) fn constant_name(&self) -> &'static str {
        match self {
            Self::Advertiser | Self::AdvertiserIp => "advertiser_id",
            Self::Campaign | Self::CampaignIp => "campaign_id",
            Self::Flight | Self::FlightIp => "flight_id",
            Self::Product | Self::ProductIp => "product_id",
        }
    }
}

impl Display for FrequencyCapKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Advertiser => "advertiser",
            Self::AdvertiserIp => "advertiser:ip",
            Self::Campaign => "campaign",
            Self::CampaignIp => "campaign:ip",
            Self::Flight => "flight",
            Self::FlightIp => "flight:ip",
            Self::Product => "product",
            Self::ProductIp => "product:ip",
        };
        write!(formatter, "{name}")
    }
}

/// One `(type, id, namespace, value, timestamp)` record of a frequency-caps
/// attribute. The timestamp is in microseconds.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FrequencyCap {
    pub kind: FrequencyCapKind,
    pub id: i64,
    pub namespace: String,
    pub value: i64,
    pub timestamp: i64,
}

#[derive(Clone, Debug)]
pub enum AttributeValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(StringValue),
    IntegerEnum(IenumId),
    IntegerList(Vec<i64>),
    StringList(Vec<StringId>),
    Segments(Vec<Segment>),
    FrequencyCaps(Vec<FrequencyCap>),
    Undefined,
}

impl AttributeValue {
    pub(crate) fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }
}

/// Closed interval of admissible values for one attribute, in the
/// representation the tree partitions over. String-ish kinds (strings, string
/// lists, integer enums) are ranges of interned ids; integer lists share the
/// integer range.
#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) enum ValueBound {
    Boolean { min: bool, max: bool },
    Integer { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    Str { min: usize, max: usize },
    /// Segments and frequency caps are never partitioned or clustered.
    Unbounded,
}

impl ValueBound {
    /// Smallest bound covering both operands.
    pub(crate) fn union(&self, other: &ValueBound) -> ValueBound {
        match (self, other) {
            (Self::Boolean { min: a, max: b }, Self::Boolean { min: c, max: d }) => Self::Boolean {
                min: *a.min(c),
                max: *b.max(d),
            },
            (Self::Integer { min: a, max: b }, Self::Integer { min: c, max: d }) => Self::Integer {
                min: *a.min(c),
                max: *b.max(d),
            },
            (Self::Float { min: a, max: b }, Self::Float { min: c, max: d }) => Self::Float {
                min: a.min(*c),
                max: b.max(*d),
            },
            (Self::Str { min: a, max: b }, Self::Str { min: c, max: d }) => Self::Str {
                min: *a.min(c),
                max: *b.max(d),
            },
            (Self::Unbounded, Self::Unbounded) => Self::Unbounded,
            (a, b) => {
                unreachable!("cannot unite bounds {a:?} and {b:?}; this is a bug")
            }
        }
    }

    /// Whether `other` is fully contained in `self`.
    pub(crate) fn encloses(&self, other: &ValueBound) -> bool {
        match (self, other) {
            (Self::Boolean { min: a, max: b }, Self::Boolean { min: c, max: d }) => {
                a <= c && b >= d
            }
            (Self::Integer { min: a, max: b }, Self::Integer { min: c, max: d }) => {
                a <= c && b >= d
            }
            (Self::Float { min: a, max: b }, Self::Float { min: c, max: d }) => a <= c && b >= d,
            (Self::Str { min: a, max: b }, Self::Str { min: c, max: d }) => a <= c && b >= d,
            (a, b) => {
                unreachable!("cannot compare bounds {a:?} and {b:?}; this is a bug")
            }
        }
    }

    pub(crate) fn is_atomic(&self) -> bool {
        match self {
            Self::Boolean { min, max } => min == max,
            Self::Integer { min, max } => min == max,
            Self::Float { min, max } => feq(*min, *max),
            Self::Str { min, max } => min == max,
            Self::Unbounded => true,
        }
    }

    /// Width of the interval, saturating to `u64::MAX` for the unbounded
    /// sentinels.
    pub(crate) fn width(&self) -> u64 {
        match self {
            Self::Boolean { .. } => 1,
            Self::Integer { min, max } => {
                if *min == i64::MIN && *max == i64::MAX {
                    u64::MAX
                } else {
                    (*max as i128 - *min as i128).unsigned_abs().min(u64::MAX as u128) as u64
                }
            }
            Self::Float { min, max } => {
                if feq(*min, -f64::MAX) && feq(*max, f64::MAX) {
                    u64::MAX
                } else {
                    let diff = (max - min).abs();
                    if diff >= u64::MAX as f64 {
                        u64::MAX
                    } else {
                        diff as u64
                    }
                }
            }
            Self::Str { min, max } => (max - min) as u64,
            Self::Unbounded => u64::MAX,
        }
    }

    /// Halve the interval. Spans of one value per side pivot into two atomic
    /// halves, spans of two pivot on the middle point, larger spans pivot on
    /// the midpoint, which both halves share.
    pub(crate) fn split(&self) -> (ValueBound, ValueBound) {
        match self {
            Self::Integer { min: start, max: end } => {
                let span = (*end as i128 - *start as i128).unsigned_abs();
                if span > 2 {
                    let middle = start + ((end - start) / 2);
                    (
                        Self::Integer { min: *start, max: middle },
                        Self::Integer { min: middle, max: *end },
                    )
                } else if span == 2 {
                    let middle = start + 1;
                    (
                        Self::Integer { min: *start, max: middle },
                        Self::Integer { min: middle, max: *end },
                    )
                } else if span == 1 {
                    (
                        Self::Integer { min: *start, max: *start },
                        Self::Integer { min: *end, max: *end },
                    )
                } else {
                    unreachable!("trying to split the atomic bound {self:?}; this is a bug")
                }
            }
            Self::Float { min: start, max: end } => {
                let span = (end - start).abs();
                if span > 2. {
                    let middle = start + ((end - start) / 2.).ceil();
                    (
                        Self::Float { min: *start, max: middle },
                        Self::Float { min: middle, max: *end },
                    )
                } else if feq(span, 2.) {
                    let middle = start + 1.;
                    (
                        Self::Float { min: *start, max: middle },
                        Self::Float { min: middle, max: *end },
                    )
                } else if feq(span, 1.) {
                    (
                        Self::Float { min: *start, max: *start },
                        Self::Float { min: *end, max: *end },
                    )
                } else {
                    unreachable!("trying to split the atomic bound {self:?}; this is a bug")
                }
            }
            Self::Boolean { min: start, max: end } => {
                if start != end {
                    (
                        Self::Boolean { min: *start, max: *start },
                        Self::Boolean { min: *end, max: *end },
                    )
                } else {
                    unreachable!("trying to split the atomic bound {self:?}; this is a bug")
                }
            }
            Self::Str { min: start, max: end } => {
                let span = end - start;
                if span > 2 {
                    let middle = start + ((end - start) / 2);
                    (
                        Self::Str { min: *start, max: middle },
                        Self::Str { min: middle, max: *end },
                    )
                } else if span == 2 {
                    let middle = start + 1;
                    (
                        Self::Str { min: *start, max: middle },
                        Self::Str { min: middle, max: *end },
                    )
                } else if span == 1 {
                    (
                        Self::Str { min: *start, max: *start },
                        Self::Str { min: *end, max: *end },
                    )
                } else {
                    unreachable!("trying to split the atomic bound {self:?}; this is a bug")
                }
            }
            Self::Unbounded => {
                unreachable!("trying to split an unbounded attribute; this is a bug")
            }
        }
    }
}

/// A registered attribute: its dense id, declared kind, bound, and the
/// interning tables its values go through.
#[derive(Clone, Debug)]
pub(crate) struct AttrDomain {
    pub(crate) var: VariableId,
    pub(crate) name: String,
    pub(crate) kind: ValueKind,
    pub(crate) allow_undefined: bool,
    pub(crate) bound: ValueBound,
    pub(crate) strings: Option<StringTable>,
    pub(crate) ienums: Option<IntegerEnumTable>,
    /// Maximum interned-id count for bounded string/enum domains.
    pub(crate) capacity: Option<usize>,
}

impl AttrDomain {
    pub(crate) fn splittable(&self, max_domain_for_split: u64) -> bool {
        match &self.bound {
            ValueBound::Integer { min, max } => {
                if *min == i64::MIN || *max == i64::MAX {
                    return false;
                }
                self.bound.width() < max_domain_for_split
            }
            ValueBound::Float { min, max } => {
                if feq(*min, -f64::MAX) || feq(*max, f64::MAX) {
                    return false;
                }
                self.bound.width() < max_domain_for_split
            }
            ValueBound::Boolean { .. } => true,
            ValueBound::Str { max, .. } => {
                if *max == usize::MAX {
                    return false;
                }
                self.bound.width() < max_domain_for_split
            }
            ValueBound::Unbounded => false,
        }
    }
}

/// The definition of an attribute that is usable by the [`crate::BETree`]
#[derive(Debug, Clone)]
pub struct AttributeDefinition {
    pub(crate) name: String,
    pub(crate) kind: ValueKind,
    pub(crate) allow_undefined: bool,
    pub(crate) bound: ValueBound,
    pub(crate) capacity: Option<usize>,
}

impl AttributeDefinition {
    fn new(
        name: &str,
        kind: ValueKind,
        allow_undefined: bool,
        bound: ValueBound,
        capacity: Option<usize>,
    ) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            allow_undefined,
            bound,
            capacity,
        }
    }

    /// Create a boolean attribute definition.
    pub fn boolean(name: &str, allow_undefined: bool) -> Self {
        Self::new(
            name,
            ValueKind::Boolean,
            allow_undefined,
            ValueBound::Boolean { min: false, max: true },
            None,
        )
    }

    /// Create an integer attribute definition with an unbounded domain.
    pub fn integer(name: &str, allow_undefined: bool) -> Self {
        Self::bounded_integer(name, allow_undefined, i64::MIN, i64::MAX)
    }

    /// Create an integer attribute definition with a closed `[min, max]`
    /// domain.
    pub fn bounded_integer(name: &str, allow_undefined: bool, min: i64, max: i64) -> Self {
        Self::new(
            name,
            ValueKind::Integer,
            allow_undefined,
            ValueBound::Integer { min, max },
            None,
        )
    }

    /// Create a float attribute definition with an unbounded domain.
    pub fn float(name: &str, allow_undefined: bool) -> Self {
        Self::bounded_float(name, allow_undefined, -f64::MAX, f64::MAX)
    }

    /// Create a float attribute definition with a closed `[min, max]` domain.
    pub fn bounded_float(name: &str, allow_undefined: bool, min: f64, max: f64) -> Self {
        Self::new(
            name,
            ValueKind::Float,
            allow_undefined,
            ValueBound::Float { min, max },
            None,
        )
    }

    /// Create a string attribute definition with no limit on the number of
    /// distinct interned strings.
    pub fn string(name: &str, allow_undefined: bool) -> Self {
        Self::new(
            name,
            ValueKind::String,
            allow_undefined,
            ValueBound::Str { min: 0, max: usize::MAX },
            None,
        )
    }

    /// Create a string attribute definition admitting at most `count`
    /// distinct strings.
    pub fn bounded_string(name: &str, allow_undefined: bool, count: usize) -> Self {
        Self::new(
            name,
            ValueKind::String,
            allow_undefined,
            ValueBound::Str { min: 0, max: count.saturating_sub(1) },
            Some(count),
        )
    }

    /// Create an integer-enum attribute definition admitting at most `count`
    /// distinct integers.
    pub fn integer_enum(name: &str, allow_undefined: bool, count: usize) -> Self {
        Self::new(
            name,
            ValueKind::IntegerEnum,
            allow_undefined,
            ValueBound::Str { min: 0, max: count.saturating_sub(1) },
            Some(count),
        )
    }

    /// Create a list of integers attribute definition.
    pub fn integer_list(name: &str, allow_undefined: bool) -> Self {
        Self::new(
            name,
            ValueKind::IntegerList,
            allow_undefined,
            ValueBound::Integer { min: i64::MIN, max: i64::MAX },
            None,
        )
    }

    /// Create a list of strings attribute definition.
    pub fn string_list(name: &str, allow_undefined: bool) -> Self {
        Self::new(
            name,
            ValueKind::StringList,
            allow_undefined,
            ValueBound::Str { min: 0, max: usize::MAX },
            None,
        )
    }

    /// Create a segments attribute definition.
    pub fn segments(name: &str, allow_undefined: bool) -> Self {
        Self::new(
            name,
            ValueKind::Segments,
            allow_undefined,
            ValueBound::Unbounded,
            None,
        )
    }

    /// Create a frequency-caps attribute definition.
    pub fn frequency_caps(name: &str, allow_undefined: bool) -> Self {
        Self::new(
            name,
            ValueKind::FrequencyCaps,
            allow_undefined,
            ValueBound::Unbounded,
            None,
        )
    }
}

#[derive(Clone, Debug)]
pub(crate) struct AttributeTable {
    by_names: HashMap<String, VariableId>,
    domains: Vec<AttrDomain>,
}

impl AttributeTable {
    pub(crate) fn new(definitions: &[AttributeDefinition]) -> Result<Self, EventError> {
        let size = definitions.len();
        let mut by_names = HashMap::with_capacity(size);
        let mut domains = Vec::with_capacity(size);
        for (i, definition) in definitions.iter().enumerate() {
            let name = definition.name.clone();
            if by_names.contains_key(&name) {
                return Err(EventError::AlreadyPresent(name));
            }

            let strings = matches!(definition.kind, ValueKind::String | ValueKind::StringList)
                .then(StringTable::new);
            let ienums =
                matches!(definition.kind, ValueKind::IntegerEnum).then(IntegerEnumTable::new);
            by_names.insert(name.clone(), VariableId(i));
            domains.push(AttrDomain {
                var: VariableId(i),
                name,
                kind: definition.kind,
                allow_undefined: definition.allow_undefined,
                bound: definition.bound,
                strings,
                ienums,
                capacity: definition.capacity,
            });
        }

        Ok(Self { by_names, domains })
    }

    #[inline]
    pub(crate) fn by_name(&self, name: &str) -> Option<VariableId> {
        self.by_names.get(name).copied()
    }

    #[inline]
    pub(crate) fn domain(&self, id: VariableId) -> &AttrDomain {
        &self.domains[id.0]
    }

    #[inline]
    pub(crate) fn domain_mut(&mut self, id: VariableId) -> &mut AttrDomain {
        &mut self.domains[id.0]
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.domains.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &AttrDomain> {
        self.domains.iter()
    }
}
