use std::collections::HashMap;

/// Interning table for the strings of one bounded-string or string-list
/// attribute. Ids are dense and 0-based so that a bounded domain can cap the
/// number of admissible ids.
#[derive(Clone, Debug, Default)]
pub(crate) struct StringTable {
    by_values: HashMap<String, usize>,
    counter: usize,
}

impl StringTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Query-only lookup, used on the event path.
    pub(crate) fn get(&self, value: &str) -> Option<StringId> {
        self.by_values.get(value).copied().map(StringId)
    }

    /// Inserting lookup, used on the subscription path.
    pub(crate) fn get_or_update(&mut self, value: &str) -> StringId {
        let counter = self.by_values.entry(value.to_string()).or_insert_with(|| {
            let counter = self.counter;
            self.counter += 1;
            counter
        });

        StringId(*counter)
    }

    pub(crate) fn len(&self) -> usize {
        self.counter
    }
}

#[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Debug, Hash)]
pub struct StringId(pub(crate) usize);

impl StringId {
    /// Sentinel for event strings that were never interned by any
    /// subscription. It compares unequal to every real id.
    pub(crate) const UNKNOWN: StringId = StringId(usize::MAX);
}

/// Interning table for the admissible integers of one integer-enum attribute.
#[derive(Clone, Debug, Default)]
pub(crate) struct IntegerEnumTable {
    by_values: HashMap<i64, usize>,
    counter: usize,
}

impl IntegerEnumTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, value: i64) -> Option<IenumId> {
        self.by_values.get(&value).copied().map(IenumId)
    }

    pub(crate) fn get_or_update(&mut self, value: i64) -> IenumId {
        let counter = self.by_values.entry(value).or_insert_with(|| {
            let counter = self.counter;
            self.counter += 1;
            counter
        });

        IenumId(*counter)
    }

    pub(crate) fn len(&self) -> usize {
        self.counter
    }
}

#[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Debug, Hash)]
pub struct IenumId(pub(crate) usize);

impl IenumId {
    pub(crate) const UNKNOWN: IenumId = IenumId(usize::MAX);
}
