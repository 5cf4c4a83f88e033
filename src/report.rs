use crate::values::VariableId;

/// Why a subscription did not match: the attribute recorded by the evaluator
/// at the failing leaf, or one of the sentinels.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Reason {
    Attribute(VariableId),
    Geo,
    InvalidEvent,
    Unknown,
}

const SENTINEL_COUNT: usize = 3;

impl Reason {
    fn index(&self, attribute_count: usize) -> usize {
        match self {
            Self::Attribute(id) => id.0,
            Self::Geo => attribute_count,
            Self::InvalidEvent => attribute_count + 1,
            Self::Unknown => attribute_count + 2,
        }
    }
}

/// The outcome of one search: counters, the matched subscription ids, and one
/// reason bucket per attribute plus the three sentinels.
#[derive(Clone, Debug)]
pub struct Report {
    evaluated: usize,
    memoized: usize,
    shorted: usize,
    matched: Vec<u64>,
    attribute_count: usize,
    reasons: Vec<Vec<u64>>,
}

impl Report {
    pub(crate) fn new(attribute_count: usize) -> Self {
        Self {
            evaluated: 0,
            memoized: 0,
            shorted: 0,
            matched: Vec::new(),
            attribute_count,
            reasons: vec![Vec::new(); attribute_count + SENTINEL_COUNT],
        }
    }

    /// How many candidate subscriptions reached the evaluator.
    #[inline]
    pub fn evaluated(&self) -> usize {
        self.evaluated
    }

    /// How many matched.
    #[inline]
    pub fn matched(&self) -> usize {
        self.matched.len()
    }

    /// How many expression nodes were answered from the memoization bitmaps
    /// instead of being evaluated.
    #[inline]
    pub fn memoized(&self) -> usize {
        self.memoized
    }

    /// How many subscriptions were decided by their short-circuit masks
    /// without evaluating the expression.
    #[inline]
    pub fn shorted(&self) -> usize {
        self.shorted
    }

    /// The matched subscription ids, in evaluation order.
    #[inline]
    pub fn matches(&self) -> &[u64] {
        &self.matched
    }

    /// The subscriptions blamed on the given reason.
    #[inline]
    pub fn reason(&self, reason: Reason) -> &[u64] {
        &self.reasons[reason.index(self.attribute_count)]
    }

    /// Every non-empty `(reason, subscriptions)` bucket.
    pub fn reasons(&self) -> impl Iterator<Item = (Reason, &[u64])> {
        self.reasons
            .iter()
            .enumerate()
            .filter(|(_, bucket)| !bucket.is_empty())
            .map(|(index, bucket)| {
                let reason = if index < self.attribute_count {
                    Reason::Attribute(VariableId(index))
                } else if index == self.attribute_count {
                    Reason::Geo
                } else if index == self.attribute_count + 1 {
                    Reason::InvalidEvent
                } else {
                    Reason::Unknown
                };
                (reason, bucket.as_slice())
            })
    }

    #[inline]
    pub(crate) fn bump_evaluated(&mut self) {
        self.evaluated += 1;
    }

    #[inline]
    pub(crate) fn bump_memoized(&mut self) {
        self.memoized += 1;
    }

    #[inline]
    pub(crate) fn bump_shorted(&mut self) {
        self.shorted += 1;
    }

    #[inline]
    pub(crate) fn add_match(&mut self, id: u64) {
        self.matched.push(id);
    }

    #[inline]
    pub(crate) fn add_reason(&mut self, reason: Reason, id: u64) {
        let index = reason.index(self.attribute_count);
        self.reasons[index].push(id);
    }

    pub(crate) fn extend_reason(&mut self, reason: Reason, ids: &[u64]) {
        let index = reason.index(self.attribute_count);
        self.reasons[index].extend_from_slice(ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATTRIBUTE_COUNT: usize = 4;

    #[test]
    fn a_fresh_report_is_empty() {
        let report = Report::new(ATTRIBUTE_COUNT);

        assert_eq!(0, report.evaluated());
        assert_eq!(0, report.matched());
        assert_eq!(0, report.memoized());
        assert_eq!(0, report.shorted());
        assert!(report.matches().is_empty());
        assert_eq!(0, report.reasons().count());
    }

    #[test]
    fn keeps_one_bucket_per_attribute_and_sentinel() {
        let mut report = Report::new(ATTRIBUTE_COUNT);

        report.add_reason(Reason::Attribute(VariableId(2)), 1);
        report.add_reason(Reason::Geo, 2);
        report.add_reason(Reason::InvalidEvent, 3);
        report.add_reason(Reason::Unknown, 4);

        assert_eq!(&[1], report.reason(Reason::Attribute(VariableId(2))));
        assert_eq!(&[2], report.reason(Reason::Geo));
        assert_eq!(&[3], report.reason(Reason::InvalidEvent));
        assert_eq!(&[4], report.reason(Reason::Unknown));
        assert!(report.reason(Reason::Attribute(VariableId(0))).is_empty());
    }

    #[test]
    fn buckets_append_in_order() {
        let mut report = Report::new(ATTRIBUTE_COUNT);

        report.add_reason(Reason::Attribute(VariableId(0)), 3);
        report.add_reason(Reason::Attribute(VariableId(0)), 1);
        report.extend_reason(Reason::Attribute(VariableId(0)), &[2]);

        assert_eq!(&[3, 1, 2], report.reason(Reason::Attribute(VariableId(0))));
    }

    #[test]
    fn reasons_iterates_non_empty_buckets_only() {
        let mut report = Report::new(ATTRIBUTE_COUNT);
        report.add_reason(Reason::Attribute(VariableId(1)), 1);
        report.add_reason(Reason::Unknown, 2);

        let buckets: Vec<_> = report.reasons().collect();

        assert_eq!(
            vec![
                (Reason::Attribute(VariableId(1)), &[1u64][..]),
                (Reason::Unknown, &[2u64][..]),
            ],
            buckets
        );
    }
}
