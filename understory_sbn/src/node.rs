// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree nodes and the implicit node array.
//!
//! Nodes are addressed like a binary heap: the root is `1`, the children of `n`
//! are `2n` and `2n + 1`, the parent is `n / 2`. Nothing is stored as a pointer;
//! every relation is computed from the id.
//!
//! Each level splits its parent's byte box in half, alternating between x (odd
//! levels) and y (even levels). Child 1 ([`Child::Upper`]) takes the half above the
//! split ordinate, child 2 ([`Child::Lower`]) the half at or below it.

use alloc::vec::Vec;
use core::fmt;

use crate::bin::BinChain;
use crate::feature::Feature;
use crate::types::ByteBox;

/// Id of the root node.
pub const ROOT: usize = 1;

/// Smallest and largest supported tree depth.
pub const MIN_LEVELS: u32 = 2;
/// See [`MIN_LEVELS`].
pub const MAX_LEVELS: u32 = 24;

/// Features an internal node buffers before it splits.
pub(crate) const HOLD_LIMIT: usize = 8;

/// Number of tree levels for `feature_count` features.
///
/// `floor(log2((n - 1) / 8 + 1)) + 1`, clamped to `[2, 24]`.
pub fn level_count(feature_count: usize) -> u32 {
    let buckets = feature_count.saturating_add(7) / 8;
    let levels = if buckets == 0 {
        1
    } else {
        buckets.ilog2() + 1
    };
    levels.clamp(MIN_LEVELS, MAX_LEVELS)
}

/// Level of node `id`; the root is level 1.
pub fn level_of(id: usize) -> u32 {
    id.ilog2() + 1
}

/// Parent of `id`, or `None` for the root.
pub fn parent_of(id: usize) -> Option<usize> {
    (id > ROOT).then_some(id / 2)
}

/// The other child of `id`'s parent, or `None` for the root.
pub fn sibling_of(id: usize) -> Option<usize> {
    (id > ROOT).then_some(id ^ 1)
}

/// Id of the given child of `id`.
pub fn child_of(id: usize, child: Child) -> usize {
    match child {
        Child::Upper => id * 2,
        Child::Lower => id * 2 + 1,
    }
}

/// Split axis of a node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Axis {
    /// Split along x.
    X,
    /// Split along y.
    Y,
}

impl Axis {
    /// The axis a node at `level` splits along.
    pub fn for_level(level: u32) -> Self {
        if level % 2 == 1 { Self::X } else { Self::Y }
    }
}

/// One of a node's two children.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Child {
    /// Child 1 (`2n`): the half above the split ordinate.
    Upper,
    /// Child 2 (`2n + 1`): the half at or below the split ordinate.
    Lower,
}

/// A single tree node: its byte box, the full flag and its bin chain.
#[derive(Clone)]
pub struct Node {
    id: usize,
    bounds: ByteBox,
    full: bool,
    pub(crate) features: BinChain,
}

impl Node {
    pub(crate) fn new(id: usize, bounds: ByteBox, full: bool) -> Self {
        Self {
            id,
            bounds,
            full,
            features: BinChain::new(),
        }
    }

    /// Node id.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Level of this node; the root is level 1.
    pub fn level(&self) -> u32 {
        level_of(self.id)
    }

    /// Quantized box covered by this node.
    pub fn bounds(&self) -> ByteBox {
        self.bounds
    }

    /// Whether this node, or one of its descendants, has split.
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Number of features stored at this node (not counting descendants).
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// The features stored at this node.
    pub fn features(&self) -> impl Iterator<Item = &Feature> + '_ {
        self.features.iter()
    }

    /// The node's bin chain.
    pub fn bins(&self) -> &BinChain {
        &self.features
    }

    /// Axis this node splits along.
    pub fn split_axis(&self) -> Axis {
        Axis::for_level(self.level())
    }

    /// Split ordinate on `axis`: `floor((min + max) / 2) + 1`, rounded down to even.
    ///
    /// The byte arithmetic wraps, as the format does for a box pinned at 255.
    pub fn split_ordinate(&self, axis: Axis) -> u8 {
        let (min, max) = span(&self.bounds, axis);
        #[allow(
            clippy::cast_possible_truncation,
            reason = "the on-disk layout wraps 256 to 0"
        )]
        let mid = ((u16::from(min) + u16::from(max)) / 2 + 1) as u8;
        mid - mid % 2
    }

    /// The box of `child` after splitting this node.
    pub fn split_bounds(&self, child: Child) -> ByteBox {
        let axis = self.split_axis();
        let mid = self.split_ordinate(axis);
        let mut b = self.bounds;
        match (axis, child) {
            (Axis::X, Child::Upper) => b.min_x = mid.wrapping_add(1),
            (Axis::X, Child::Lower) => b.max_x = mid,
            (Axis::Y, Child::Upper) => b.min_y = mid.wrapping_add(1),
            (Axis::Y, Child::Lower) => b.max_y = mid,
        }
        b
    }

    /// Whether the node's box overlaps `query` (closed intervals).
    pub fn intersects(&self, query: &ByteBox) -> bool {
        self.bounds.intersects(query)
    }

    /// Whether `other` lies within the node's box.
    pub fn contains(&self, other: &ByteBox) -> bool {
        self.bounds.contains(other)
    }

    /// Whether the node's box lies within `query`.
    pub fn contained_by(&self, query: &ByteBox) -> bool {
        query.contains(&self.bounds)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("bounds", &self.bounds)
            .field("full", &self.full)
            .field("feature_count", &self.feature_count())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.bounds;
        write!(
            f,
            "[SbnNode {}: ({}-{},{}-{})/{}/{}]",
            self.id,
            b.min_x,
            b.max_x,
            b.min_y,
            b.max_y,
            self.split_ordinate(self.split_axis()),
            self.feature_count()
        )
    }
}

/// `(min, max)` of `b` on `axis`.
pub(crate) fn span(b: &ByteBox, axis: Axis) -> (u8, u8) {
    match axis {
        Axis::X => (b.min_x, b.max_x),
        Axis::Y => (b.min_y, b.max_y),
    }
}

/// The complete node array of a tree with a fixed number of levels.
///
/// Slot 0 is unused so that `nodes[id]` addresses node `id`.
#[derive(Clone)]
pub(crate) struct Nodes {
    levels: u32,
    first_leaf: usize,
    nodes: Vec<Node>,
}

impl Nodes {
    /// Allocate every node of a `levels`-deep tree and assign their boxes.
    pub(crate) fn new(levels: u32) -> Self {
        assert!(
            (MIN_LEVELS..=MAX_LEVELS).contains(&levels),
            "unsupported level count {levels}"
        );
        let first_leaf = 1_usize << (levels - 1);
        let len = first_leaf * 2;
        let mut nodes = Vec::with_capacity(len);
        nodes.push(Node::new(0, ByteBox::new(0, 0, 0, 0), false));
        nodes.push(Node::new(ROOT, ByteBox::new(0, 0, 255, 255), true));
        // Parents precede children in heap order, so each child's box can be
        // derived from an already placed parent.
        for id in 2..len {
            let parent = &nodes[id / 2];
            let child = if id % 2 == 0 {
                Child::Upper
            } else {
                Child::Lower
            };
            let bounds = parent.split_bounds(child);
            nodes.push(Node::new(id, bounds, id >= first_leaf));
        }
        Self {
            levels,
            first_leaf,
            nodes,
        }
    }

    pub(crate) fn levels(&self) -> u32 {
        self.levels
    }

    pub(crate) fn first_leaf(&self) -> usize {
        self.first_leaf
    }

    /// One past the last node id.
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn is_leaf(&self, id: usize) -> bool {
        id >= self.first_leaf
    }

    pub(crate) fn get(&self, id: usize) -> &Node {
        &self.nodes[id]
    }

    pub(crate) fn get_mut(&mut self, id: usize) -> &mut Node {
        &mut self.nodes[id]
    }

    /// All real nodes, in id order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.iter().skip(1)
    }

    /// Nodes of one level; panics if `level` is outside `1..=levels`.
    pub(crate) fn level(&self, level: u32) -> &[Node] {
        assert!(
            (1..=self.levels).contains(&level),
            "level {level} outside 1..={}",
            self.levels
        );
        let start = 1_usize << (level - 1);
        &self.nodes[start..start * 2]
    }

    /// Mark `id` and all of its ancestors full.
    pub(crate) fn mark_full(&mut self, id: usize) {
        let mut current = Some(id);
        while let Some(n) = current {
            self.nodes[n].full = true;
            current = parent_of(n);
        }
    }

    /// Insert below node `id`.
    ///
    /// Leaves take every feature. An internal node that has not split yet holds
    /// up to [`HOLD_LIMIT`] features; the next one splits it, and the held features
    /// plus the new one are routed again. A split node keeps features that straddle
    /// its seam and passes the rest to the child on their side.
    pub(crate) fn insert(&mut self, id: usize, feature: Feature) {
        if self.is_leaf(id) {
            self.nodes[id].features.push(feature);
            return;
        }

        if id > ROOT && !self.nodes[id].full {
            let held = self.nodes[id].feature_count();
            if held < HOLD_LIMIT {
                self.nodes[id].features.push(feature);
                return;
            }
            if held == HOLD_LIMIT {
                let mut pending = self.nodes[id].features.take();
                pending.push(feature);
                self.mark_full(id);
                for f in pending.iter() {
                    self.insert(id, *f);
                }
                return;
            }
        }

        let node = &self.nodes[id];
        let axis = node.split_axis();
        let seam = node.split_ordinate(axis);
        let (min, max) = span(&feature.bounds(), axis);
        if min <= seam && max > seam {
            self.nodes[id].features.push(feature);
        } else if min < seam {
            self.insert(child_of(id, Child::Lower), feature);
        } else {
            self.insert(child_of(id, Child::Upper), feature);
        }
    }

    /// Remove the feature with `search`'s fid from the subtree at `id`.
    ///
    /// Subtrees whose box misses `search`'s bounds are skipped. Nodes never merge
    /// back; the full flag stays set.
    pub(crate) fn remove(&mut self, id: usize, search: &Feature) -> Option<Feature> {
        if !self.nodes[id].intersects(&search.bounds()) {
            return None;
        }
        if let Some(found) = self.nodes[id].features.remove(search.fid()) {
            return Some(found);
        }
        if self.is_leaf(id) {
            return None;
        }
        self.remove(child_of(id, Child::Upper), search)
            .or_else(|| self.remove(child_of(id, Child::Lower), search))
    }

    /// Collect fids below `id` whose bounds overlap `query`.
    pub(crate) fn query(&self, id: usize, query: &ByteBox, out: &mut Vec<u32>) {
        let node = &self.nodes[id];
        if node.contained_by(query) {
            self.collect_all(id, out);
            return;
        }
        out.extend(
            node.features()
                .filter(|f| f.intersects(query))
                .map(Feature::fid),
        );
        if self.is_leaf(id) {
            return;
        }
        for child in [Child::Upper, Child::Lower] {
            let cid = child_of(id, child);
            if self.nodes[cid].intersects(query) {
                self.query(cid, query, out);
            }
        }
    }

    /// Every fid stored at `id` or below.
    pub(crate) fn collect_all(&self, id: usize, out: &mut Vec<u32>) {
        out.extend(self.nodes[id].features().map(Feature::fid));
        if !self.is_leaf(id) {
            self.collect_all(child_of(id, Child::Upper), out);
            self.collect_all(child_of(id, Child::Lower), out);
        }
    }

    /// Pull sparse childless subtrees up into their grandparent.
    ///
    /// Walks nodes `max(first_leaf / 2 - 1, 3)` down to `max(start / 8, 1)`. For
    /// each child holding between 1 and 3 features whose own children are both
    /// empty, the child's features move to the end of the node's chain. Trees of
    /// fewer than 4 levels are left alone. Returns the number of moved features.
    pub(crate) fn compact_seam_features(&mut self) -> usize {
        if self.levels < 4 {
            return 0;
        }
        let start = (self.first_leaf / 2 - 1).max(3);
        let end = (start / 8).max(1);
        let mut moved = 0;
        for id in (end..=start).rev() {
            for child in [Child::Upper, Child::Lower] {
                let cid = child_of(id, child);
                let count = self.nodes[cid].feature_count();
                if count == 0 || count >= 4 {
                    continue;
                }
                let grandchildren = self.nodes[child_of(cid, Child::Upper)].feature_count()
                    + self.nodes[child_of(cid, Child::Lower)].feature_count();
                if grandchildren != 0 {
                    continue;
                }
                let pulled = self.nodes[cid].features.take();
                moved += pulled.len();
                self.nodes[id].features.extend(pulled.iter().copied());
            }
        }
        moved
    }
}

impl fmt::Debug for Nodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Nodes")
            .field("levels", &self.levels)
            .field("first_leaf", &self.first_leaf)
            .finish_non_exhaustive()
    }
}
