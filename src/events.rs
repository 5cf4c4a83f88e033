use crate::{
    evaluation::Bitmap,
    strings::{IenumId, StringId},
    values::{
        AttrDomain, AttributeTable, AttributeValue, FrequencyCap, FrequencyCapKind, Segment,
        StringValue, ValueKind, VariableId,
    },
};
use itertools::Itertools;
use std::ops::Index;
use thiserror::Error;

#[derive(Error, PartialEq, Debug)]
pub enum EventError {
    #[error("attribute {0} has already been defined")]
    AlreadyPresent(String),
    #[error("event refers to non-existing attribute {0:?}")]
    NonExistingAttribute(String),
    #[error("{name:?}: wrong types => expected: {expected:?}, found: {actual}")]
    WrongType {
        name: String,
        expected: ValueKind,
        actual: String,
    },
    #[error("unknown frequency cap type {0:?}")]
    InvalidFrequencyType(String),
    #[error("malformed event: {0}")]
    Malformed(String),
}

/// An [`Event`] builder
///
/// During the builder creation, it will set all the attributes to `undefined`.
/// If some attributes are not assigned, they will be left `undefined`.
#[derive(Debug)]
pub struct EventBuilder<'betree> {
    by_ids: Vec<AttributeValue>,
    attributes: &'betree AttributeTable,
}

impl<'betree> EventBuilder<'betree> {
    pub(crate) fn new(attributes: &'betree AttributeTable) -> Self {
        Self {
            by_ids: vec![AttributeValue::Undefined; attributes.len()],
            attributes,
        }
    }

    /// Build the corresponding [`Event`].
    ///
    /// By default, the non-assigned attributes will be undefined.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use be_tree::{AttributeDefinition, BETree};
    ///
    /// let definitions = [
    ///     AttributeDefinition::boolean("private", false),
    ///     AttributeDefinition::integer("exchange_id", false),
    ///     AttributeDefinition::string_list("deal_ids", true),
    /// ];
    /// let tree = BETree::new(&definitions).unwrap();
    ///
    /// let mut builder = tree.make_event();
    /// builder.with_integer("exchange_id", 1).unwrap();
    /// builder.with_boolean("private", false).unwrap();
    ///
    /// // The returned `Event` will have its `deal_ids` attribute `undefined`
    /// // since it was not set by the builder
    /// let event = builder.build().unwrap();
    /// ```
    pub fn build(self) -> Result<Event, EventError> {
        Ok(Event(self.by_ids))
    }

    /// Set the specified boolean attribute.
    pub fn with_boolean(&mut self, name: &str, value: bool) -> Result<(), EventError> {
        self.add_value(name, ValueKind::Boolean, |_| AttributeValue::Boolean(value))
    }

    /// Set the specified integer attribute.
    pub fn with_integer(&mut self, name: &str, value: i64) -> Result<(), EventError> {
        self.add_value(name, ValueKind::Integer, |_| AttributeValue::Integer(value))
    }

    /// Set the specified float attribute.
    pub fn with_float(&mut self, name: &str, value: f64) -> Result<(), EventError> {
        self.add_value(name, ValueKind::Float, |_| AttributeValue::Float(value))
    }

    /// Set the specified string attribute. Strings never interned by any
    /// subscription stay unknown and compare unequal to every literal.
    pub fn with_string(&mut self, name: &str, value: &str) -> Result<(), EventError> {
        self.add_value(name, ValueKind::String, |domain| {
            AttributeValue::String(intern_event_string(domain, value))
        })
    }

    /// Set the specified integer-enum attribute.
    pub fn with_integer_enum(&mut self, name: &str, value: i64) -> Result<(), EventError> {
        self.add_value(name, ValueKind::IntegerEnum, |domain| {
            AttributeValue::IntegerEnum(intern_event_ienum(domain, value))
        })
    }

    /// Set the specified list of integers attribute.
    pub fn with_integer_list(&mut self, name: &str, value: &[i64]) -> Result<(), EventError> {
        self.add_value(name, ValueKind::IntegerList, |_| {
            let values = value.iter().sorted().dedup().copied().collect_vec();
            AttributeValue::IntegerList(values)
        })
    }

    /// Set the specified string list attribute.
    pub fn with_string_list(&mut self, name: &str, values: &[&str]) -> Result<(), EventError> {
        self.add_value(name, ValueKind::StringList, |domain| {
            let values = values
                .iter()
                .map(|value| intern_event_string(domain, value).id)
                .sorted()
                .dedup()
                .collect_vec();
            AttributeValue::StringList(values)
        })
    }

    /// Set the specified segments attribute from `(segment-id, timestamp)`
    /// pairs. Timestamps are in microseconds.
    pub fn with_segments(&mut self, name: &str, values: &[(i64, i64)]) -> Result<(), EventError> {
        self.add_value(name, ValueKind::Segments, |_| {
            let values = values
                .iter()
                .map(|(id, timestamp)| Segment {
                    id: *id,
                    timestamp: *timestamp,
                })
                .sorted_by_key(|segment| segment.id)
                .collect_vec();
            AttributeValue::Segments(values)
        })
    }

    /// Set the specified frequency-caps attribute.
    pub fn with_frequency_caps(
        &mut self,
        name: &str,
        values: &[FrequencyCap],
    ) -> Result<(), EventError> {
        self.add_value(name, ValueKind::FrequencyCaps, |_| {
            AttributeValue::FrequencyCaps(values.to_vec())
        })
    }

    /// Set the specified attribute to `undefined`.
    pub fn with_undefined(&mut self, name: &str) -> Result<(), EventError> {
        let index = self
            .attributes
            .by_name(name)
            .ok_or_else(|| EventError::NonExistingAttribute(name.to_string()))?;
        self.by_ids[index.0] = AttributeValue::Undefined;
        Ok(())
    }

    fn add_value<F>(&mut self, name: &str, kind: ValueKind, f: F) -> Result<(), EventError>
    where
        F: FnOnce(&AttrDomain) -> AttributeValue,
    {
        let index = self
            .attributes
            .by_name(name)
            .ok_or_else(|| EventError::NonExistingAttribute(name.to_string()))?;
        let domain = self.attributes.domain(index);
        if domain.kind != kind {
            return Err(EventError::WrongType {
                name: name.to_owned(),
                expected: domain.kind,
                actual: format!("{kind:?}"),
            });
        }
        self.by_ids[index.0] = f(domain);
        Ok(())
    }
}

fn intern_event_string(domain: &AttrDomain, value: &str) -> StringValue {
    let id = domain
        .strings
        .as_ref()
        .and_then(|table| table.get(value))
        .unwrap_or(StringId::UNKNOWN);
    StringValue::interned(id, value)
}

fn intern_event_ienum(domain: &AttrDomain, value: i64) -> IenumId {
    domain
        .ienums
        .as_ref()
        .and_then(|table| table.get(value))
        .unwrap_or(IenumId::UNKNOWN)
}

/// An event to match against every subscription of a [`crate::BETree`]: a
/// dense array of attribute values indexed by variable id.
#[derive(Clone, Debug)]
pub struct Event(pub(crate) Vec<AttributeValue>);

impl Index<VariableId> for Event {
    type Output = AttributeValue;

    #[inline]
    fn index(&self, index: VariableId) -> &Self::Output {
        &self.0[index.0]
    }
}

impl Event {
    #[inline]
    pub(crate) fn is_defined(&self, index: VariableId) -> bool {
        !self.0[index.0].is_undefined()
    }

    pub(crate) fn undefined_bitmap(&self) -> Bitmap {
        let mut bitmap = Bitmap::new(self.0.len());
        for (index, value) in self.0.iter().enumerate() {
            if value.is_undefined() {
                bitmap.set(index);
            }
        }
        bitmap
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Parse the serialised event form: a JSON object from attribute name to
/// value. List values are sorted ascending, segments by segment id.
pub(crate) fn parse_event(
    attributes: &AttributeTable,
    text: &str,
) -> Result<Event, EventError> {
    let parsed: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(text).map_err(|error| EventError::Malformed(error.to_string()))?;

    let mut by_ids = vec![AttributeValue::Undefined; attributes.len()];
    for (name, value) in &parsed {
        let index = attributes
            .by_name(name)
            .ok_or_else(|| EventError::NonExistingAttribute(name.clone()))?;
        let domain = attributes.domain(index);
        let wrong_type = || EventError::WrongType {
            name: name.clone(),
            expected: domain.kind,
            actual: json_kind(value).to_string(),
        };
        let parsed_value = match domain.kind {
            ValueKind::Boolean => value
                .as_bool()
                .map(AttributeValue::Boolean)
                .ok_or_else(wrong_type)?,
            ValueKind::Integer => value
                .as_i64()
                .map(AttributeValue::Integer)
                .ok_or_else(wrong_type)?,
            ValueKind::Float => value
                .as_f64()
                .map(AttributeValue::Float)
                .ok_or_else(wrong_type)?,
            ValueKind::String => value
                .as_str()
                .map(|value| AttributeValue::String(intern_event_string(domain, value)))
                .ok_or_else(wrong_type)?,
            ValueKind::IntegerEnum => value
                .as_i64()
                .map(|value| AttributeValue::IntegerEnum(intern_event_ienum(domain, value)))
                .ok_or_else(wrong_type)?,
            ValueKind::IntegerList => {
                let values = value.as_array().ok_or_else(wrong_type)?;
                let values: Vec<i64> = values
                    .iter()
                    .map(|value| value.as_i64().ok_or_else(wrong_type))
                    .collect::<Result<_, _>>()?;
                AttributeValue::IntegerList(values.into_iter().sorted().dedup().collect())
            }
            ValueKind::StringList => {
                let values = value.as_array().ok_or_else(wrong_type)?;
                let values: Vec<StringId> = values
                    .iter()
                    .map(|value| {
                        value
                            .as_str()
                            .map(|value| intern_event_string(domain, value).id)
                            .ok_or_else(wrong_type)
                    })
                    .collect::<Result<_, _>>()?;
                AttributeValue::StringList(values.into_iter().sorted().dedup().collect())
            }
            ValueKind::Segments => {
                let values = value.as_array().ok_or_else(wrong_type)?;
                let values: Vec<Segment> = values
                    .iter()
                    .map(|value| {
                        let pair = value.as_array().filter(|pair| pair.len() == 2);
                        let pair = pair.ok_or_else(wrong_type)?;
                        let id = pair[0].as_i64().ok_or_else(wrong_type)?;
                        let timestamp = pair[1].as_i64().ok_or_else(wrong_type)?;
                        Ok(Segment { id, timestamp })
                    })
                    .collect::<Result<_, EventError>>()?;
                AttributeValue::Segments(
                    values
                        .into_iter()
                        .sorted_by_key(|segment| segment.id)
                        .collect(),
                )
            }
            ValueKind::FrequencyCaps => {
                let values = value.as_array().ok_or_else(wrong_type)?;
                let values: Vec<FrequencyCap> = values
                    .iter()
                    .map(|value| {
                        let record = value.as_array().filter(|record| record.len() == 5);
                        let record = record.ok_or_else(wrong_type)?;
                        let kind = record[0].as_str().ok_or_else(wrong_type)?;
                        let kind = FrequencyCapKind::parse(kind)
                            .ok_or_else(|| EventError::InvalidFrequencyType(kind.to_string()))?;
                        let id = record[1].as_i64().ok_or_else(wrong_type)?;
                        let namespace = record[2].as_str().ok_or_else(wrong_type)?;
                        let value_count = record[3].as_i64().ok_or_else(wrong_type)?;
                        let timestamp = record[4].as_i64().ok_or_else(wrong_type)?;
                        Ok(FrequencyCap {
                            kind,
                            id,
                            namespace: namespace.to_string(),
                            value: value_count,
                            timestamp,
                        })
                    })
                    .collect::<Result<_, EventError>>()?;
                AttributeValue::FrequencyCaps(values)
            }
        };
        by_ids[index.0] = parsed_value;
    }

    Ok(Event(by_ids))
}
