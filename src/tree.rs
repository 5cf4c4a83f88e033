use crate::{
    ast::{self, Node, PredMap},
    bounds,
    error::{BETreeError, InsertionError},
    evaluation::{self, Bitmap, Memoize, ShortCircuit},
    events::{self, Event, EventBuilder, EventError},
    parser,
    report::{Reason, Report},
    values::{AttrDomain, AttributeDefinition, AttributeTable, AttributeValue, ValueBound, VariableId},
};
use slab::Slab;
use std::collections::HashSet;
use tracing::debug;

/// Tuning parameters for the tree's rebalancing operations.
#[derive(Clone, Copy, Debug)]
pub struct TreeParams {
    /// Leaf overflow threshold; larger values mean wider leaves and less
    /// partitioning.
    pub lnode_max_cap: usize,
    /// Minimum number of subscriptions mentioning an attribute before a
    /// partition is created for it.
    pub partition_min_size: usize,
    /// Upper bound on the attribute domain width eligible for cluster
    /// splitting.
    pub max_domain_for_split: u64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            lnode_max_cap: 3,
            partition_min_size: 3,
            max_domain_for_split: 1000,
        }
    }
}

/// A named integer bound at insertion time to the `within_frequency_cap`
/// family of expressions.
#[derive(Clone, Debug)]
pub struct Constant {
    pub(crate) name: String,
    pub(crate) value: i64,
}

impl Constant {
    pub fn integer(name: &str, value: i64) -> Self {
        Self {
            name: name.to_owned(),
            value,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Subscription {
    pub(crate) id: u64,
    pub(crate) expr: Node,
    pub(crate) attr_vars: Bitmap,
    pub(crate) short_circuit: ShortCircuit,
}

impl Subscription {
    #[inline]
    fn reads(&self, var: VariableId) -> bool {
        self.attr_vars.test(var.0)
    }
}

type SubId = usize;
type CNodeId = usize;
type CDirId = usize;
type PNodeId = usize;

const UNLINKED: usize = usize::MAX;

#[derive(Debug)]
struct LNode {
    subs: Vec<SubId>,
    max: usize,
}

#[derive(Debug)]
struct CNode {
    parent: Option<CDirId>,
    lnode: LNode,
    pdir: Vec<PNodeId>,
}

#[derive(Clone, Copy, Debug)]
enum CDirParent {
    PNode(PNodeId),
    CDir(CDirId),
}

#[derive(Debug)]
struct CDir {
    parent: CDirParent,
    attr: VariableId,
    bound: ValueBound,
    cnode: CNodeId,
    lchild: Option<CDirId>,
    rchild: Option<CDirId>,
}

#[derive(Debug)]
struct PNode {
    parent: CNodeId,
    attr: VariableId,
    cdir: CDirId,
    score: f64,
}

/// The BE-tree: an index over boolean-expression subscriptions that matches
/// an event against all of them in time closer to the number of relevant
/// subscriptions than to their total count, and reports a failure reason for
/// every subscription that did not match.
///
/// # Examples
///
/// ```rust
/// use be_tree::{AttributeDefinition, BETree};
///
/// let mut tree = BETree::new(&[
///     AttributeDefinition::boolean("private", false),
///     AttributeDefinition::integer("exchange_id", false),
/// ])
/// .unwrap();
/// tree.insert(1, "exchange_id = 5 and not private").unwrap();
/// tree.insert(2, "exchange_id = 7").unwrap();
///
/// let mut report = tree.make_report();
/// tree.search(r#"{"private": false, "exchange_id": 5}"#, &mut report)
///     .unwrap();
/// assert_eq!(&[1], report.matches());
/// ```
#[derive(Debug)]
pub struct BETree {
    params: TreeParams,
    attributes: AttributeTable,
    pred_map: PredMap,
    subs: Slab<Subscription>,
    cnodes: Slab<CNode>,
    cdirs: Slab<CDir>,
    pnodes: Slab<PNode>,
    root: CNodeId,
    sub_ids: Vec<u64>,
    known_ids: HashSet<u64>,
}

impl BETree {
    /// Create a new [`BETree`] over the given attribute domains. Domains are
    /// registered once, before any subscription is inserted.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use be_tree::{AttributeDefinition, BETree};
    ///
    /// let definitions = [
    ///     AttributeDefinition::boolean("private", false),
    ///     AttributeDefinition::bounded_integer("exchange_id", false, 0, 10),
    /// ];
    /// assert!(BETree::new(&definitions).is_ok());
    /// ```
    ///
    /// Duplicate attributes are not allowed:
    ///
    /// ```rust
    /// use be_tree::{AttributeDefinition, BETree};
    ///
    /// let definitions = [
    ///     AttributeDefinition::boolean("private", false),
    ///     AttributeDefinition::boolean("private", false),
    /// ];
    /// assert!(BETree::new(&definitions).is_err());
    /// ```
    pub fn new(definitions: &[AttributeDefinition]) -> Result<Self, BETreeError<'static>> {
        Self::with_params(TreeParams::default(), definitions)
    }

    /// Create a new [`BETree`] with explicit tuning parameters.
    pub fn with_params(
        params: TreeParams,
        definitions: &[AttributeDefinition],
    ) -> Result<Self, BETreeError<'static>> {
        let attributes = AttributeTable::new(definitions).map_err(BETreeError::Event)?;
        let mut cnodes = Slab::new();
        let root = cnodes.insert(CNode {
            parent: None,
            lnode: LNode {
                subs: Vec::new(),
                max: params.lnode_max_cap,
            },
            pdir: Vec::new(),
        });
        Ok(Self {
            params,
            attributes,
            pred_map: PredMap::new(),
            subs: Slab::new(),
            cnodes,
            cdirs: Slab::new(),
            pnodes: Slab::new(),
            root,
            sub_ids: Vec::new(),
            known_ids: HashSet::new(),
        })
    }

    /// Insert a subscription. The id is caller-chosen and must be distinct
    /// from every already-inserted id.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use be_tree::{AttributeDefinition, BETree};
    ///
    /// let definitions = [
    ///     AttributeDefinition::boolean("private", false),
    ///     AttributeDefinition::integer("exchange_id", false),
    /// ];
    /// let mut tree = BETree::new(&definitions).unwrap();
    /// assert!(tree.insert(1, "exchange_id = 5").is_ok());
    /// assert!(tree.insert(2, "private").is_ok());
    /// assert!(tree.insert(2, "not private").is_err());
    /// ```
    #[inline]
    pub fn insert<'a>(&mut self, id: u64, expression: &'a str) -> Result<(), BETreeError<'a>> {
        self.insert_with_constants(id, &[], expression)
    }

    /// Insert a subscription whose `within_frequency_cap` expressions take
    /// their subscription-side ids from the given constants.
    pub fn insert_with_constants<'a>(
        &mut self,
        id: u64,
        constants: &[Constant],
        expression: &'a str,
    ) -> Result<(), BETreeError<'a>> {
        if self.known_ids.contains(&id) {
            return Err(BETreeError::Insertion(InsertionError::DuplicateId(id)));
        }
        let mut node = parser::parse(expression).map_err(BETreeError::Parse)?;
        ast::assign_variable_ids(&mut node, &self.attributes).map_err(BETreeError::Validation)?;
        ast::check_validity(&node, &self.attributes).map_err(BETreeError::Validation)?;
        ast::assign_constants(&mut node, constants).map_err(BETreeError::Insertion)?;
        ast::assign_string_ids(&mut node, &mut self.attributes, true)
            .map_err(BETreeError::Validation)?;
        ast::assign_ienum_ids(&mut node, &mut self.attributes, true)
            .map_err(BETreeError::Validation)?;
        ast::sort_lists(&mut node);
        ast::coerce_float_literals(&mut node, &self.attributes);
        bounds::widen_domains(&mut self.attributes, &node);
        self.pred_map.assign(&mut node);
        let attr_vars = ast::attribute_set(&node, self.attributes.len());
        let short_circuit = ShortCircuit::build(&self.attributes, &node);
        let sub_id = self.subs.insert(Subscription {
            id,
            expr: node,
            attr_vars,
            short_circuit,
        });
        self.insert_in_tree(sub_id, self.root);
        self.known_ids.insert(id);
        self.sub_ids.push(id);
        Ok(())
    }

    /// Inspect an expression purely to grow attribute bounds, without
    /// inserting it. Useful for data-driven bound discovery before the first
    /// insertions.
    pub fn widen_domains_for_expression<'a>(
        &mut self,
        expression: &'a str,
    ) -> Result<(), BETreeError<'a>> {
        let mut node = parser::parse(expression).map_err(BETreeError::Parse)?;
        ast::assign_variable_ids(&mut node, &self.attributes).map_err(BETreeError::Validation)?;
        ast::check_validity(&node, &self.attributes).map_err(BETreeError::Validation)?;
        ast::assign_string_ids(&mut node, &mut self.attributes, true)
            .map_err(BETreeError::Validation)?;
        ast::assign_ienum_ids(&mut node, &mut self.attributes, true)
            .map_err(BETreeError::Validation)?;
        ast::sort_lists(&mut node);
        ast::coerce_float_literals(&mut node, &self.attributes);
        bounds::widen_domains(&mut self.attributes, &node);
        Ok(())
    }

    /// Create a new [`EventBuilder`] for this tree's attributes.
    #[inline]
    pub fn make_event(&self) -> EventBuilder {
        EventBuilder::new(&self.attributes)
    }

    /// Parse the serialised event form against this tree's attributes.
    #[inline]
    pub fn parse_event(&self, event: &str) -> Result<Event, EventError> {
        events::parse_event(&self.attributes, event)
    }

    /// Create an empty [`Report`] sized for this tree.
    #[inline]
    pub fn make_report(&self) -> Report {
        Report::new(self.attributes.len())
    }

    /// The dense id of a registered attribute, usable to look up its reason
    /// bucket.
    #[inline]
    pub fn attribute_id(&self, name: &str) -> Option<VariableId> {
        self.attributes.by_name(name)
    }

    /// Match the serialised event against every inserted subscription.
    ///
    /// On success the report holds the matched ids plus one blamed reason for
    /// every non-matching subscription. If the event fails validation, every
    /// subscription is blamed on [`Reason::InvalidEvent`] and the validation
    /// error is returned.
    pub fn search(&self, event: &str, report: &mut Report) -> Result<(), EventError> {
        match events::parse_event(&self.attributes, event) {
            Ok(event) => {
                self.search_filled(&event, report, None);
                Ok(())
            }
            Err(error) => {
                report.extend_reason(Reason::InvalidEvent, &self.sub_ids);
                Err(error)
            }
        }
    }

    /// [`BETree::search`] restricted to an ascending array of subscription
    /// ids.
    pub fn search_ids(
        &self,
        event: &str,
        report: &mut Report,
        ids: &[u64],
    ) -> Result<(), EventError> {
        debug_assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        match events::parse_event(&self.attributes, event) {
            Ok(event) => {
                self.search_filled(&event, report, Some(ids));
                Ok(())
            }
            Err(error) => {
                let filtered: Vec<u64> = self
                    .sub_ids
                    .iter()
                    .copied()
                    .filter(|id| ids.binary_search(id).is_ok())
                    .collect();
                report.extend_reason(Reason::InvalidEvent, &filtered);
                Err(error)
            }
        }
    }

    /// Match an already-built [`Event`] against every inserted subscription.
    pub fn search_with_event(&self, event: &Event, report: &mut Report) {
        self.search_filled(event, report, None);
    }

    /// [`BETree::search_with_event`] restricted to an ascending array of
    /// subscription ids.
    pub fn search_with_event_ids(&self, event: &Event, report: &mut Report, ids: &[u64]) {
        debug_assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        self.search_filled(event, report, Some(ids));
    }

    fn search_filled(&self, event: &Event, report: &mut Report, ids: Option<&[u64]>) {
        debug_assert_eq!(self.attributes.len(), event.0.len());
        let undefined = event.undefined_bitmap();
        let mut memoize = Memoize::new(self.pred_map.memoize_count());
        let mut candidates = Vec::new();
        self.collect_candidates(self.root, event, ids, &mut candidates, report);
        for sub_id in candidates {
            let sub = &self.subs[sub_id];
            report.bump_evaluated();
            let mut last_reason = Reason::Unknown;
            if evaluation::match_subscription(
                &sub.expr,
                &sub.short_circuit,
                event,
                &undefined,
                &mut memoize,
                report,
                &mut last_reason,
            ) {
                report.add_match(sub.id);
            } else {
                report.add_reason(last_reason, sub.id);
            }
        }
    }

    fn collect_candidates(
        &self,
        cnode_id: CNodeId,
        event: &Event,
        ids: Option<&[u64]>,
        candidates: &mut Vec<SubId>,
        report: &mut Report,
    ) {
        let cnode = &self.cnodes[cnode_id];
        for &sub_id in &cnode.lnode.subs {
            if ids.map_or(true, |ids| ids.binary_search(&self.subs[sub_id].id).is_ok()) {
                candidates.push(sub_id);
            }
        }
        for &pnode_id in &cnode.pdir {
            let pnode = &self.pnodes[pnode_id];
            let domain = self.attributes.domain(pnode.attr);
            if domain.allow_undefined || event.is_defined(pnode.attr) {
                self.search_cdir(pnode.cdir, event, ids, candidates, report, true, true);
            } else {
                // Every subscription under this partition needs the attribute
                // and the event does not carry it.
                self.blame_subtree(pnode.cdir, report, ids);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn search_cdir(
        &self,
        cdir_id: CDirId,
        event: &Event,
        ids: Option<&[u64]>,
        candidates: &mut Vec<SubId>,
        report: &mut Report,
        open_left: bool,
        open_right: bool,
    ) {
        let cdir = &self.cdirs[cdir_id];
        self.collect_candidates(cdir.cnode, event, ids, candidates, report);
        if let Some(lchild) = cdir.lchild {
            if self.is_event_enclosed(event, lchild, open_left, false) {
                self.search_cdir(lchild, event, ids, candidates, report, open_left, false);
            } else {
                self.blame_subtree(lchild, report, ids);
            }
        }
        if let Some(rchild) = cdir.rchild {
            if self.is_event_enclosed(event, rchild, false, open_right) {
                self.search_cdir(rchild, event, ids, candidates, report, false, open_right);
            } else {
                self.blame_subtree(rchild, report, ids);
            }
        }
    }

    /// Charge every subscription in the skipped cluster subtree with the
    /// partition's attribute: by the tree invariant none of them can match
    /// this event.
    fn blame_subtree(&self, cdir_id: CDirId, report: &mut Report, ids: Option<&[u64]>) {
        let attr = self.cdirs[cdir_id].attr;
        let mut blamed = Vec::new();
        self.collect_subtree_ids(cdir_id, ids, &mut blamed);
        report.extend_reason(Reason::Attribute(attr), &blamed);
    }

    fn collect_subtree_ids(&self, cdir_id: CDirId, ids: Option<&[u64]>, out: &mut Vec<u64>) {
        let cdir = &self.cdirs[cdir_id];
        self.collect_subtree_ids_cnode(cdir.cnode, ids, out);
        if let Some(lchild) = cdir.lchild {
            self.collect_subtree_ids(lchild, ids, out);
        }
        if let Some(rchild) = cdir.rchild {
            self.collect_subtree_ids(rchild, ids, out);
        }
    }

    fn collect_subtree_ids_cnode(&self, cnode_id: CNodeId, ids: Option<&[u64]>, out: &mut Vec<u64>) {
        let cnode = &self.cnodes[cnode_id];
        for &sub_id in &cnode.lnode.subs {
            let id = self.subs[sub_id].id;
            if ids.map_or(true, |ids| ids.binary_search(&id).is_ok()) {
                out.push(id);
            }
        }
        for &pnode_id in &cnode.pdir {
            self.collect_subtree_ids(self.pnodes[pnode_id].cdir, ids, out);
        }
    }

    fn is_event_enclosed(
        &self,
        event: &Event,
        cdir_id: CDirId,
        open_left: bool,
        open_right: bool,
    ) -> bool {
        let cdir = &self.cdirs[cdir_id];
        let value = &event[cdir.attr];
        match (value, &cdir.bound) {
            (AttributeValue::Undefined, _) => true,
            (AttributeValue::Boolean(value), ValueBound::Boolean { min, max }) => {
                min <= value && max >= value
            }
            (AttributeValue::Integer(value), ValueBound::Integer { min, max }) => {
                (open_left || min <= value) && (open_right || max >= value)
            }
            (AttributeValue::Float(value), ValueBound::Float { min, max }) => {
                (open_left || min <= value) && (open_right || max >= value)
            }
            // No open left side for interned ids: the minimum is always 0.
            (AttributeValue::String(value), ValueBound::Str { min, max }) => {
                *min <= value.id.0 && (open_right || *max >= value.id.0)
            }
            (AttributeValue::IntegerEnum(value), ValueBound::Str { min, max }) => {
                *min <= value.0 && (open_right || *max >= value.0)
            }
            (AttributeValue::IntegerList(values), ValueBound::Integer { min, max }) => {
                match (values.first(), values.last()) {
                    (Some(first), Some(last)) => {
                        let bound_min = if open_left { i64::MIN } else { *min };
                        let bound_max = if open_right { i64::MAX } else { *max };
                        *first <= bound_max && bound_min <= *last
                    }
                    _ => true,
                }
            }
            (AttributeValue::StringList(values), ValueBound::Str { min, max }) => {
                match (values.first(), values.last()) {
                    (Some(first), Some(last)) => {
                        let bound_max = if open_right { usize::MAX } else { *max };
                        first.0 <= bound_max && *min <= last.0
                    }
                    _ => true,
                }
            }
            (value, bound) => {
                unreachable!("event value {value:?} against cluster bound {bound:?}; this is a bug")
            }
        }
    }

    fn sub_is_enclosed(&self, sub_id: SubId, cdir_id: CDirId) -> bool {
        let cdir = &self.cdirs[cdir_id];
        let sub = &self.subs[sub_id];
        if !sub.reads(cdir.attr) {
            return false;
        }
        let domain = self.attributes.domain(cdir.attr);
        let bound = bounds::variable_bound(domain, &sub.expr);
        cdir.bound.encloses(&bound)
    }

    fn insert_in_tree(&mut self, sub_id: SubId, cnode_id: CNodeId) {
        let mut best: Option<(PNodeId, f64)> = None;
        for index in 0..self.cnodes[cnode_id].pdir.len() {
            let pnode_id = self.cnodes[cnode_id].pdir[index];
            let pnode = &self.pnodes[pnode_id];
            if !self.subs[sub_id].reads(pnode.attr) {
                continue;
            }
            if self.is_used_in_parents(pnode.attr, cnode_id) {
                continue;
            }
            if best.map_or(true, |(_, score)| score < pnode.score) {
                best = Some((pnode_id, pnode.score));
            }
        }
        match best {
            Some((pnode_id, _)) => {
                let target = self.insert_cdir(sub_id, self.pnodes[pnode_id].cdir);
                let target_cnode = self.cdirs[target].cnode;
                self.insert_in_tree(sub_id, target_cnode);
                self.update_partition_score(pnode_id);
            }
            None => {
                self.cnodes[cnode_id].lnode.subs.push(sub_id);
                match self.cnodes[cnode_id].parent {
                    None => self.space_partitioning(cnode_id),
                    Some(cdir_id) => self.space_clustering(cdir_id),
                }
            }
        }
    }

    /// Deepest cluster whose bound still encloses the subscription.
    fn insert_cdir(&mut self, sub_id: SubId, cdir_id: CDirId) -> CDirId {
        let (lchild, rchild) = (self.cdirs[cdir_id].lchild, self.cdirs[cdir_id].rchild);
        if lchild.is_none() && rchild.is_none() {
            return cdir_id;
        }
        if let Some(lchild) = lchild {
            if self.sub_is_enclosed(sub_id, lchild) {
                return self.insert_cdir(sub_id, lchild);
            }
        }
        if let Some(rchild) = rchild {
            if self.sub_is_enclosed(sub_id, rchild) {
                return self.insert_cdir(sub_id, rchild);
            }
        }
        cdir_id
    }

    /// Whether the attribute already governs a partition or cluster somewhere
    /// on the path from the root to this c-node.
    fn is_used_in_parents(&self, var: VariableId, cnode_id: CNodeId) -> bool {
        let mut current = self.cnodes[cnode_id].parent;
        while let Some(cdir_id) = current {
            let cdir = &self.cdirs[cdir_id];
            if cdir.attr == var {
                return true;
            }
            current = match cdir.parent {
                CDirParent::CDir(parent) => Some(parent),
                CDirParent::PNode(pnode_id) => {
                    let pnode = &self.pnodes[pnode_id];
                    if pnode.attr == var {
                        return true;
                    }
                    self.cnodes[pnode.parent].parent
                }
            };
        }
        false
    }

    fn is_overflowed(&self, cnode_id: CNodeId) -> bool {
        let lnode = &self.cnodes[cnode_id].lnode;
        lnode.subs.len() > lnode.max
    }

    fn space_partitioning(&mut self, cnode_id: CNodeId) {
        while self.is_overflowed(cnode_id) {
            let Some(var) = self.next_highest_score_unused_attr(cnode_id) else {
                break;
            };
            let target_count = self.cnodes[cnode_id]
                .lnode
                .subs
                .iter()
                .filter(|&&sub_id| self.subs[sub_id].reads(var))
                .count();
            if target_count < self.params.partition_min_size {
                break;
            }
            debug!(
                attribute = %self.attributes.domain(var).name,
                subscriptions = target_count,
                "partitioning an overflowing leaf"
            );
            let pnode_id = self.create_pnode(cnode_id, var);
            let root_cdir = self.pnodes[pnode_id].cdir;
            let mut index = 0;
            while index < self.cnodes[cnode_id].lnode.subs.len() {
                let sub_id = self.cnodes[cnode_id].lnode.subs[index];
                if self.subs[sub_id].reads(var) {
                    self.cnodes[cnode_id].lnode.subs.remove(index);
                    let target = self.insert_cdir(sub_id, root_cdir);
                    let target_cnode = self.cdirs[target].cnode;
                    self.cnodes[target_cnode].lnode.subs.push(sub_id);
                } else {
                    index += 1;
                }
            }
            self.space_clustering(root_cdir);
        }
        self.update_cluster_capacity(cnode_id);
    }

    fn space_clustering(&mut self, cdir_id: CDirId) {
        let cnode_id = self.cdirs[cdir_id].cnode;
        if !self.is_overflowed(cnode_id) {
            return;
        }
        let is_leaf = self.cdirs[cdir_id].lchild.is_none() && self.cdirs[cdir_id].rchild.is_none();
        if !is_leaf || self.cdirs[cdir_id].bound.is_atomic() {
            self.space_partitioning(cnode_id);
        } else {
            let (lbound, rbound) = self.cdirs[cdir_id].bound.split();
            debug!(
                attribute = %self.attributes.domain(self.cdirs[cdir_id].attr).name,
                "splitting an overflowing cluster"
            );
            let lchild = self.create_cdir_with_cdir_parent(cdir_id, lbound);
            let rchild = self.create_cdir_with_cdir_parent(cdir_id, rbound);
            self.cdirs[cdir_id].lchild = Some(lchild);
            self.cdirs[cdir_id].rchild = Some(rchild);
            let mut index = 0;
            while index < self.cnodes[cnode_id].lnode.subs.len() {
                let sub_id = self.cnodes[cnode_id].lnode.subs[index];
                let target = if self.sub_is_enclosed(sub_id, lchild) {
                    Some(lchild)
                } else if self.sub_is_enclosed(sub_id, rchild) {
                    Some(rchild)
                } else {
                    None
                };
                match target {
                    Some(child) => {
                        self.cnodes[cnode_id].lnode.subs.remove(index);
                        let child_cnode = self.cdirs[child].cnode;
                        self.cnodes[child_cnode].lnode.subs.push(sub_id);
                    }
                    None => index += 1,
                }
            }
            self.space_partitioning(cnode_id);
            self.space_clustering(lchild);
            self.space_clustering(rchild);
        }
        self.update_cluster_capacity(cnode_id);
    }

    /// Round the leaf capacity up to the next multiple of `lnode_max_cap`
    /// covering the current population.
    fn update_cluster_capacity(&mut self, cnode_id: CNodeId) {
        let cap = self.params.lnode_max_cap;
        let count = self.cnodes[cnode_id].lnode.subs.len();
        self.cnodes[cnode_id].lnode.max = cap.max(count.div_ceil(cap) * cap);
    }

    fn next_highest_score_unused_attr(&self, cnode_id: CNodeId) -> Option<VariableId> {
        let mut best: Option<(VariableId, f64)> = None;
        for index in 0..self.attributes.len() {
            let var = VariableId(index);
            let mentioned = self.cnodes[cnode_id]
                .lnode
                .subs
                .iter()
                .any(|&sub_id| self.subs[sub_id].reads(var));
            if !mentioned {
                continue;
            }
            let domain = self.attributes.domain(var);
            if !domain.splittable(self.params.max_domain_for_split) {
                continue;
            }
            if self.is_used_in_parents(var, cnode_id) {
                continue;
            }
            let score = self.lnode_score(cnode_id, var);
            if best.map_or(true, |(_, high)| high < score) {
                best = Some((var, score));
            }
        }
        best.map(|(var, _)| var)
    }

    fn attr_domain_score(&self, domain: &AttrDomain) -> f64 {
        let diff = domain.bound.width().max(1);
        let num = if domain.allow_undefined { 1. } else { 10. };
        num / diff as f64
    }

    fn lnode_score(&self, cnode_id: CNodeId, var: VariableId) -> f64 {
        let count = self.cnodes[cnode_id]
            .lnode
            .subs
            .iter()
            .filter(|&&sub_id| self.subs[sub_id].reads(var))
            .count();
        count as f64 * self.attr_domain_score(self.attributes.domain(var))
    }

    fn count_attr_in_cdir(&self, var: VariableId, cdir_id: CDirId) -> usize {
        let cdir = &self.cdirs[cdir_id];
        let mut count = self.cnodes[cdir.cnode]
            .lnode
            .subs
            .iter()
            .filter(|&&sub_id| self.subs[sub_id].reads(var))
            .count();
        if let Some(lchild) = cdir.lchild {
            count += self.count_attr_in_cdir(var, lchild);
        }
        if let Some(rchild) = cdir.rchild {
            count += self.count_attr_in_cdir(var, rchild);
        }
        count
    }

    fn update_partition_score(&mut self, pnode_id: PNodeId) {
        let pnode = &self.pnodes[pnode_id];
        let count = self.count_attr_in_cdir(pnode.attr, pnode.cdir);
        let score = count as f64 * self.attr_domain_score(self.attributes.domain(pnode.attr));
        self.pnodes[pnode_id].score = score;
    }

    fn make_cnode(&mut self, parent: Option<CDirId>) -> CNodeId {
        self.cnodes.insert(CNode {
            parent,
            lnode: LNode {
                subs: Vec::new(),
                max: self.params.lnode_max_cap,
            },
            pdir: Vec::new(),
        })
    }

    fn create_cdir(&mut self, parent: CDirParent, attr: VariableId, bound: ValueBound) -> CDirId {
        let cdir_id = self.cdirs.insert(CDir {
            parent,
            attr,
            bound,
            cnode: UNLINKED,
            lchild: None,
            rchild: None,
        });
        let cnode = self.make_cnode(Some(cdir_id));
        self.cdirs[cdir_id].cnode = cnode;
        cdir_id
    }

    fn create_cdir_with_cdir_parent(&mut self, parent: CDirId, bound: ValueBound) -> CDirId {
        let attr = self.cdirs[parent].attr;
        self.create_cdir(CDirParent::CDir(parent), attr, bound)
    }

    fn create_pnode(&mut self, cnode_id: CNodeId, var: VariableId) -> PNodeId {
        let bound = self.attributes.domain(var).bound;
        let pnode_id = self.pnodes.insert(PNode {
            parent: cnode_id,
            attr: var,
            cdir: UNLINKED,
            score: 0.,
        });
        let cdir = self.create_cdir(CDirParent::PNode(pnode_id), var, bound);
        self.pnodes[pnode_id].cdir = cdir;
        self.cnodes[cnode_id].pdir.push(pnode_id);
        pnode_id
    }
}
