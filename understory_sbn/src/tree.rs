// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The in-memory SBN tree.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashSet;
use tracing::{debug, trace, warn};

use crate::codec::{self, EncodedIndex, FIRST_BIN_ID};
use crate::error::{SbnError, SbnResult};
use crate::feature::Feature;
use crate::header::SbnHeader;
use crate::node::{Node, Nodes, ROOT, level_count, parent_of};
use crate::quantize::quantize;
use crate::types::{Envelope, Interval};

/// An insert the tree could not take because the feature lies outside its extent.
///
/// Every stored byte is relative to the header extent, so the domain cannot grow
/// in place. The caller collects the features and calls [`SbnTree::create`] again.
#[derive(Clone, Debug, PartialEq)]
pub struct RebuildRequired {
    /// Id of the refused feature.
    pub fid: u32,
    /// Its envelope.
    pub envelope: Envelope,
    /// Its z range, if given.
    pub z_range: Option<Interval>,
    /// Its m range, if given.
    pub m_range: Option<Interval>,
}

/// What [`SbnTree::insert`] did.
#[derive(Clone, Debug, PartialEq)]
pub enum InsertOutcome {
    /// The feature was routed into the existing node array.
    Inserted,
    /// The feature count crossed a level boundary; the tree was rebuilt at the new
    /// depth with the feature included.
    Restructured,
    /// The feature is outside the tree's extent and was not inserted.
    /// The rebuild handler, if any, has already been called.
    RebuildRequired(RebuildRequired),
}

/// Callback for [`RebuildRequired`] notifications.
pub type RebuildHandler = Box<dyn FnMut(&RebuildRequired) + Send + Sync>;

/// A fixed-depth, byte-quantized binary space partitioning tree over feature ids.
///
/// Build one with [`SbnTree::create`] or read one with [`SbnTree::from_bytes`]
/// (or `SbnTree::load` with the `std` feature), then query candidate fids with
/// [`SbnTree::query_fids`]. Results are a pre-filter: every feature whose envelope
/// intersects the query is returned, plus possibly some that only come close.
pub struct SbnTree {
    header: SbnHeader,
    nodes: Nodes,
    fids: HashSet<u32>,
    rebuild_handler: Option<RebuildHandler>,
}

impl SbnTree {
    /// Build a tree over `features`.
    ///
    /// The extent is the union of the envelopes; `z_range` and `m_range` widen the
    /// header's Z and M ranges. Fails on a repeated fid.
    pub fn create(
        features: &[(u32, Envelope)],
        z_range: Option<Interval>,
        m_range: Option<Interval>,
    ) -> SbnResult<Self> {
        let mut x = Interval::EMPTY;
        let mut y = Interval::EMPTY;
        for (_, envelope) in features {
            x = x.expanded_by_interval(&envelope.x_interval());
            y = y.expanded_by_interval(&envelope.y_interval());
        }
        let z = Interval::EMPTY.expanded_by_interval(&z_range.unwrap_or(Interval::EMPTY));
        let m = Interval::EMPTY.expanded_by_interval(&m_range.unwrap_or(Interval::EMPTY));
        let count = u32::try_from(features.len()).unwrap_or(u32::MAX);
        let mut tree = Self::with_header(SbnHeader::from_ranges(count, x, y, z, m));

        let extent = tree.header.extent();
        for (fid, envelope) in features {
            tree.insert_new(Feature::from_envelope(&extent, *fid, envelope))?;
        }
        let moved = tree.nodes.compact_seam_features();
        debug!(
            features = features.len(),
            levels = tree.levels(),
            compacted = moved,
            "created sbn tree"
        );
        Ok(tree)
    }

    fn with_header(header: SbnHeader) -> Self {
        let levels = level_count(header.num_records() as usize);
        Self {
            header,
            nodes: Nodes::new(levels),
            fids: HashSet::new(),
            rebuild_handler: None,
        }
    }

    /// Decode a tree from `.sbn` bytes.
    ///
    /// The depth follows from the header's record count. Bins must follow the bin
    /// index with consecutive ids starting at 2.
    pub fn from_bytes(sbn: &[u8]) -> SbnResult<Self> {
        let mut buf = sbn;
        let header = SbnHeader::read(&mut buf)?;
        let mut tree = Self::with_header(header);
        let entries = codec::read_bin_index(&mut buf)?;

        let mut expected = FIRST_BIN_ID;
        for (i, entry) in entries.iter().enumerate() {
            if !entry.has_bins() {
                continue;
            }
            let id = i + 1;
            if id >= tree.nodes.len() {
                return Err(SbnError::NodeOutOfRange {
                    node: id,
                    levels: tree.levels(),
                });
            }
            let wanted = entry.feature_count as usize;
            while tree.nodes.get(id).feature_count() < wanted {
                let (bin_id, bin) = codec::read_bin(&mut buf)?;
                if bin_id != expected {
                    return Err(SbnError::BinIdMismatch {
                        expected,
                        found: bin_id,
                    });
                }
                if bin.is_empty() {
                    return Err(SbnError::MalformedBin {
                        bin_id,
                        num_features: 0,
                    });
                }
                expected += 1;
                tree.nodes
                    .get_mut(id)
                    .features
                    .extend(bin.features().iter().copied());
                if let Some(parent) = parent_of(id) {
                    tree.nodes.mark_full(parent);
                }
            }
        }

        for node in tree.nodes.iter() {
            tree.fids.extend(node.features().map(Feature::fid));
        }
        if tree.fids.len() != tree.header.num_records() as usize {
            warn!(
                header = tree.header.num_records(),
                indexed = tree.fids.len(),
                "sbn record count disagrees with indexed features"
            );
        }
        debug!(
            features = tree.fids.len(),
            levels = tree.levels(),
            bins = expected - FIRST_BIN_ID,
            "loaded sbn tree"
        );
        Ok(tree)
    }

    /// Encode the tree as `.sbn` and `.sbx` bytes.
    pub fn to_bytes(&self) -> EncodedIndex {
        codec::encode(&self.header, &self.nodes)
    }

    /// Register the callback for inserts outside the tree's extent, replacing any
    /// previous one.
    pub fn set_rebuild_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&RebuildRequired) + Send + Sync + 'static,
    {
        self.rebuild_handler = Some(Box::new(handler));
    }

    /// Remove the rebuild callback.
    pub fn clear_rebuild_handler(&mut self) {
        self.rebuild_handler = None;
    }

    /// Insert a feature.
    ///
    /// A feature outside the tree's extent is refused: the rebuild handler is
    /// called and [`InsertOutcome::RebuildRequired`] returned, leaving the tree
    /// untouched. If the header's record count plus one needs a different level
    /// count, the node array is rebuilt in place at that depth. Otherwise the
    /// feature is routed from the root. Accepted features grow the header's record
    /// count and ranges.
    pub fn insert(
        &mut self,
        fid: u32,
        envelope: Envelope,
        z_range: Option<Interval>,
        m_range: Option<Interval>,
    ) -> SbnResult<InsertOutcome> {
        if self.fids.contains(&fid) {
            return Err(SbnError::DuplicateFid(fid));
        }
        let extent = self.header.extent();
        let feature = Feature::from_envelope(&extent, fid, &envelope);

        if !extent.contains(&envelope) {
            let request = RebuildRequired {
                fid,
                envelope,
                z_range,
                m_range,
            };
            warn!(fid, "feature outside the index extent, rebuild required");
            if let Some(handler) = self.rebuild_handler.as_mut() {
                handler(&request);
            }
            return Ok(InsertOutcome::RebuildRequired(request));
        }

        let count = self.header.num_records() as usize + 1;
        let outcome = if level_count(count) != self.levels() {
            self.rebuild(count, feature);
            InsertOutcome::Restructured
        } else {
            self.insert_new(feature)?;
            InsertOutcome::Inserted
        };
        self.header.add_feature(&envelope, z_range, m_range);
        Ok(outcome)
    }

    fn insert_new(&mut self, feature: Feature) -> SbnResult<()> {
        if !self.fids.insert(feature.fid()) {
            return Err(SbnError::DuplicateFid(feature.fid()));
        }
        self.nodes.insert(ROOT, feature);
        Ok(())
    }

    /// Remove the feature with `fid`.
    ///
    /// `envelope` narrows the search to nodes overlapping it; without one every node
    /// is a candidate. Nodes are never merged and stay full once split. The header
    /// keeps its record count and ranges, so the depth a saved file implies always
    /// matches the node array.
    pub fn remove(&mut self, fid: u32, envelope: Option<&Envelope>) -> bool {
        let extent = self.header.extent();
        let search = Feature::from_envelope(&extent, fid, envelope.unwrap_or(&extent));
        if self.nodes.remove(ROOT, &search).is_none() {
            return false;
        }
        self.fids.remove(&fid);
        true
    }

    /// Rebuild the node array for `record_count` records, re-inserting everything
    /// plus `extra` in node order, then compact.
    fn rebuild(&mut self, record_count: usize, extra: Feature) {
        let old = core::mem::replace(&mut self.nodes, Nodes::new(level_count(record_count)));
        for node in old.iter() {
            for feature in node.features() {
                self.nodes.insert(ROOT, *feature);
            }
        }
        self.fids.insert(extra.fid());
        self.nodes.insert(ROOT, extra);
        let moved = self.nodes.compact_seam_features();
        trace!(
            from = old.levels(),
            to = self.levels(),
            compacted = moved,
            "rebuilt sbn tree"
        );
    }

    /// Sorted fids of features whose quantized bounds overlap `envelope`.
    ///
    /// The query is clipped to the tree's extent first; a query outside it
    /// returns nothing.
    pub fn query_fids(&self, envelope: &Envelope) -> Vec<u32> {
        let extent = self.header.extent();
        let clipped = extent.intersect(envelope);
        if clipped.is_empty() {
            return Vec::new();
        }
        let query = quantize(&extent, &clipped);
        let mut out = Vec::new();
        self.nodes.query(ROOT, &query, &mut out);
        out.sort_unstable();
        out
    }

    /// Number of indexed features.
    pub fn feature_count(&self) -> usize {
        self.fids.len()
    }

    /// Whether `fid` is indexed.
    pub fn contains(&self, fid: u32) -> bool {
        self.fids.contains(&fid)
    }

    /// Number of levels.
    pub fn levels(&self) -> u32 {
        self.nodes.levels()
    }

    /// Id of the first leaf node, `2^(levels - 1)`.
    pub fn first_leaf(&self) -> usize {
        self.nodes.first_leaf()
    }

    /// The header.
    pub fn header(&self) -> &SbnHeader {
        &self.header
    }

    /// X/Y extent of all indexed features.
    pub fn extent(&self) -> Envelope {
        self.header.extent()
    }

    /// Z range of all indexed features.
    pub fn z_range(&self) -> Interval {
        self.header.z_range()
    }

    /// M range of all indexed features.
    pub fn m_range(&self) -> Interval {
        self.header.m_range()
    }

    /// Node `id`. Panics if `id` is not in `1..2^levels`.
    pub fn node(&self, id: usize) -> &Node {
        assert!(
            (1..self.nodes.len()).contains(&id),
            "node {id} outside 1..{}",
            self.nodes.len()
        );
        self.nodes.get(id)
    }

    /// Nodes of `level`, ids `2^(level - 1)` to `2^level - 1`.
    /// Panics if `level` is outside `1..=levels`.
    pub fn nodes_of_level(&self, level: u32) -> &[Node] {
        self.nodes.level(level)
    }

    /// Number of features stored on `level`.
    pub fn features_in_level(&self, level: u32) -> usize {
        self.nodes_of_level(level)
            .iter()
            .map(Node::feature_count)
            .sum()
    }

    /// Write one line per node: level, id, x range, y range, full flag, seam
    /// feature count and held feature count.
    pub fn describe_tree(&self, out: &mut impl fmt::Write) -> fmt::Result {
        writeln!(out, "#Description")?;
        writeln!(out, "#            f=full [0, 1]")?;
        writeln!(out, "#                sf=features on seam")?;
        writeln!(out, "#                   h=holdfeatures")?;
        writeln!(out, "#level node  f   sf h")?;
        for level in 1..=self.levels() {
            for node in self.nodes_of_level(level) {
                let b = node.bounds();
                let count = node.feature_count();
                let (seam, held) = if node.is_full() { (count, 0) } else { (0, count) };
                writeln!(
                    out,
                    "{:5} {:5} {:4}-{:4} {:4}-{:4} {} {:4} {:1}",
                    level,
                    node.id(),
                    b.min_x,
                    b.max_x,
                    b.min_y,
                    b.max_y,
                    u8::from(node.is_full()),
                    seam,
                    held
                )?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for SbnTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SbnTree")
            .field("levels", &self.levels())
            .field("feature_count", &self.feature_count())
            .field("extent", &self.extent())
            .field("rebuild_handler", &self.rebuild_handler.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ByteBox;
    use alloc::string::String;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct Rng(u64);

    impl Rng {
        fn next_u64(&mut self) -> u64 {
            let mut x = self.0;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            self.0 = x;
            x
        }
        fn next_f64(&mut self) -> f64 {
            let v = self.next_u64() >> 11;
            (v as f64) / ((1_u64 << 53) as f64)
        }
        fn range(&mut self, lo: f64, hi: f64) -> f64 {
            lo + self.next_f64() * (hi - lo)
        }
    }

    fn random_features(rng: &mut Rng, n: u32, extent: f64) -> Vec<(u32, Envelope)> {
        (0..n)
            .map(|fid| {
                let x = rng.range(-extent, extent * 0.98);
                let y = rng.range(-extent, extent * 0.98);
                let w = rng.range(0.0, extent * 0.02);
                let h = rng.range(0.0, extent * 0.02);
                (fid, Envelope::new(x, y, x + w, y + h))
            })
            .collect()
    }

    fn brute_force(features: &[(u32, Envelope)], query: &Envelope) -> Vec<u32> {
        let mut out: Vec<u32> = features
            .iter()
            .filter(|(_, e)| e.intersects(query))
            .map(|(fid, _)| *fid)
            .collect();
        out.sort_unstable();
        out
    }

    fn is_subset(small: &[u32], large: &[u32]) -> bool {
        small.iter().all(|f| large.binary_search(f).is_ok())
    }

    #[test]
    fn minimal_tree() {
        let tree = SbnTree::create(&[(1, Envelope::new(0.0, 0.0, 1.0, 1.0))], None, None).unwrap();
        assert_eq!(tree.levels(), 2);
        assert_eq!(tree.feature_count(), 1);
        assert_eq!(
            tree.query_fids(&Envelope::new(0.0, 0.0, 10.0, 10.0)),
            [1]
        );
    }

    #[test]
    fn seam_feature_stays_at_ancestor() {
        let features = [
            (1, Envelope::new(0.0, 0.0, 1.0, 1.0)),
            (2, Envelope::new(254.0, 254.0, 255.0, 255.0)),
        ];
        let mut tree = SbnTree::create(&features, None, None).unwrap();
        // Straddles the root's x seam (byte 128) on an extent of 0..255.
        tree.insert(3, Envelope::new(100.0, 10.0, 150.0, 20.0), None, None)
            .unwrap();
        let root: Vec<u32> = tree.node(1).features().map(Feature::fid).collect();
        assert_eq!(root, [3]);
        assert!(tree.node(2).features().all(|f| f.fid() != 3));
        assert!(tree.node(3).features().all(|f| f.fid() != 3));
    }

    #[test]
    fn insert_count_and_unique_results() {
        let mut rng = Rng(0x1234_5678);
        let seed = random_features(&mut rng, 10, 100.0);
        let mut tree = SbnTree::create(&seed, None, None).unwrap();
        let extent = tree.extent();
        let mut inserted = seed.clone();
        for fid in 10..400 {
            let x = rng.range(extent.min_x, extent.max_x);
            let y = rng.range(extent.min_y, extent.max_y);
            let env = Envelope::new(x, y, x, y);
            let outcome = tree.insert(fid, env, None, None).unwrap();
            assert_ne!(
                outcome,
                InsertOutcome::RebuildRequired(RebuildRequired {
                    fid,
                    envelope: env,
                    z_range: None,
                    m_range: None,
                }),
                "points inside the extent are accepted"
            );
            inserted.push((fid, env));
        }
        assert_eq!(tree.feature_count(), 400);
        assert_eq!(tree.header().num_records(), 400);
        assert_eq!(tree.levels(), level_count(400));

        let all = tree.query_fids(&extent);
        assert_eq!(all.len(), 400);
        assert!(all.windows(2).all(|w| w[0] < w[1]), "sorted without duplicates");

        for _ in 0..50 {
            let x = rng.range(extent.min_x, extent.max_x);
            let y = rng.range(extent.min_y, extent.max_y);
            let q = Envelope::new(x, y, x + 10.0, y + 10.0);
            let hits = tree.query_fids(&q);
            assert!(is_subset(&brute_force(&inserted, &q), &hits));
        }
    }

    #[test]
    fn level_change_restructures_in_place() {
        let features: Vec<(u32, Envelope)> = (0..24)
            .map(|i| {
                let v = f64::from(i);
                (i, Envelope::new(v, v, v + 1.0, v + 1.0))
            })
            .collect();
        let mut tree = SbnTree::create(&features, None, None).unwrap();
        assert_eq!(tree.levels(), 2);
        let outcome = tree
            .insert(24, Envelope::new(3.0, 3.0, 4.0, 4.0), None, None)
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Restructured);
        assert_eq!(tree.levels(), 3);
        assert_eq!(tree.feature_count(), 25);
        assert_eq!(tree.query_fids(&tree.extent()).len(), 25);
    }

    #[test]
    fn duplicate_fid_is_rejected() {
        let features = [
            (1, Envelope::new(0.0, 0.0, 1.0, 1.0)),
            (1, Envelope::new(2.0, 2.0, 3.0, 3.0)),
        ];
        assert!(matches!(
            SbnTree::create(&features, None, None),
            Err(SbnError::DuplicateFid(1))
        ));
        let mut tree = SbnTree::create(&features[..1], None, None).unwrap();
        assert!(matches!(
            tree.insert(1, Envelope::new(0.0, 0.0, 0.5, 0.5), None, None),
            Err(SbnError::DuplicateFid(1))
        ));
    }

    #[test]
    fn domain_overflow_notifies_once() {
        let mut rng = Rng(0xDEAD_BEEF);
        let mut features = random_features(&mut rng, 49_998, 100.0);
        // Pin the extent to exactly (-100, -100, 100, 100).
        features.push((49_998, Envelope::new(-100.0, -100.0, -99.0, -99.0)));
        features.push((49_999, Envelope::new(99.0, 99.0, 100.0, 100.0)));
        let mut tree = SbnTree::create(&features, None, None).unwrap();
        assert_eq!(tree.levels(), 13);
        let extent = tree.extent();
        assert_eq!(extent, Envelope::new(-100.0, -100.0, 100.0, 100.0));

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        tree.set_rebuild_handler(move |request| {
            assert_eq!(request.fid, 500_002);
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let outside = Envelope::new(-110.0, -110.0, -100.0, -100.0);
        let outcome = tree
            .insert(500_002, outside, Some(Interval::new(1.0, 2.0)), None)
            .unwrap();
        assert!(matches!(outcome, InsertOutcome::RebuildRequired(ref r) if r.envelope == outside));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(tree.extent(), extent);
        assert_eq!(tree.feature_count(), 50_000);
        assert_eq!(tree.header().num_records(), 50_000);
        assert!(!tree.contains(500_002));
        assert!(tree.z_range().is_empty());
    }

    #[test]
    fn remove_keeps_header() {
        let mut rng = Rng(77);
        let features = random_features(&mut rng, 100, 50.0);
        let mut tree = SbnTree::create(&features, None, None).unwrap();
        let extent = tree.extent();
        assert!(tree.remove(42, None));
        assert!(!tree.remove(42, None));
        assert!(!tree.contains(42));
        assert_eq!(tree.feature_count(), 99);
        assert_eq!(tree.header().num_records(), 100);
        assert_eq!(tree.extent(), extent, "ranges are a high-water mark");
        assert!(!tree.query_fids(&extent).contains(&42));

        // With the feature's own envelope the search is narrowed but still finds it.
        let (fid, env) = features[7];
        assert!(tree.remove(fid, Some(&env)));
        assert_eq!(tree.query_fids(&extent).len(), 98);
    }

    #[test]
    fn remove_never_restructures() {
        let features: Vec<(u32, Envelope)> = (0..25)
            .map(|i| {
                let v = f64::from(i);
                (i, Envelope::new(v, 0.0, v + 0.5, 0.5))
            })
            .collect();
        let mut tree = SbnTree::create(&features, None, None).unwrap();
        assert_eq!(tree.levels(), 3);
        assert_ne!(level_count(24), level_count(25));
        let full: Vec<bool> = (1..=3)
            .flat_map(|l| tree.nodes_of_level(l))
            .map(Node::is_full)
            .collect();
        assert!(full.iter().all(|f| *f), "both level 2 nodes split");

        assert!(tree.remove(0, None));
        assert_eq!(tree.levels(), 3);
        assert_eq!(tree.header().num_records(), 25);
        let after: Vec<bool> = (1..=3)
            .flat_map(|l| tree.nodes_of_level(l))
            .map(Node::is_full)
            .collect();
        assert_eq!(after, full);
        let all = tree.query_fids(&tree.extent());
        assert_eq!(all, (1..25).collect::<Vec<u32>>());

        let back = SbnTree::from_bytes(&tree.to_bytes().sbn).unwrap();
        assert_eq!(back.levels(), 3);
        assert_eq!(back.feature_count(), 24);
        assert_eq!(back.query_fids(&back.extent()), all);

        // The next insert is sized from the header count, so the depth holds.
        let outcome = tree
            .insert(25, Envelope::new(3.0, 0.0, 3.5, 0.5), None, None)
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);
        assert_eq!(tree.levels(), 3);
    }

    #[test]
    fn query_outside_extent_is_empty() {
        let tree = SbnTree::create(&[(1, Envelope::new(0.0, 0.0, 1.0, 1.0))], None, None).unwrap();
        assert!(tree.query_fids(&Envelope::new(5.0, 5.0, 6.0, 6.0)).is_empty());
    }

    #[test]
    fn queries_are_idempotent_and_complete() {
        let mut rng = Rng(0xC0FFEE);
        let features = random_features(&mut rng, 3000, 1000.0);
        let tree = SbnTree::create(&features, None, None).unwrap();
        for _ in 0..100 {
            let x = rng.range(-1000.0, 1000.0);
            let y = rng.range(-1000.0, 1000.0);
            let q = Envelope::new(x, y, x + rng.range(0.0, 200.0), y + rng.range(0.0, 200.0));
            let first = tree.query_fids(&q);
            assert_eq!(first, tree.query_fids(&q));
            assert!(is_subset(&brute_force(&features, &q), &first));
        }
    }

    #[test]
    fn z_and_m_ranges_expand() {
        let features = [(1, Envelope::new(0.0, 0.0, 1.0, 1.0))];
        let mut tree =
            SbnTree::create(&features, Some(Interval::new(5.0, 6.0)), None).unwrap();
        assert_eq!(tree.z_range(), Interval::new(5.0, 6.0));
        assert!(tree.m_range().is_empty());
        tree.insert(
            2,
            Envelope::new(0.2, 0.2, 0.4, 0.4),
            Some(Interval::new(-1.0, 0.0)),
            Some(Interval::new(100.0, 200.0)),
        )
        .unwrap();
        assert_eq!(tree.z_range(), Interval::new(-1.0, 6.0));
        assert_eq!(tree.m_range(), Interval::new(100.0, 200.0));
    }

    #[test]
    fn levels_and_counts() {
        let mut rng = Rng(5);
        let features = random_features(&mut rng, 1000, 10.0);
        let tree = SbnTree::create(&features, None, None).unwrap();
        assert_eq!(tree.levels(), 7);
        assert_eq!(tree.first_leaf(), 64);
        let per_level: usize = (1..=tree.levels()).map(|l| tree.features_in_level(l)).sum();
        assert_eq!(per_level, 1000);
        let level3 = tree.nodes_of_level(3);
        assert_eq!(level3.len(), 4);
        assert_eq!(level3[0].id(), 4);
        assert!(level3.iter().all(|n| n.level() == 3));
    }

    #[test]
    #[should_panic(expected = "level 0 outside")]
    fn nodes_of_level_zero_panics() {
        let tree = SbnTree::create(&[(1, Envelope::new(0.0, 0.0, 1.0, 1.0))], None, None).unwrap();
        let _ = tree.nodes_of_level(0);
    }

    #[test]
    fn bytes_round_trip() {
        let mut rng = Rng(99);
        let features = random_features(&mut rng, 700, 500.0);
        let tree = SbnTree::create(&features, Some(Interval::new(0.0, 1.0)), None).unwrap();
        let encoded = tree.to_bytes();
        let back = SbnTree::from_bytes(&encoded.sbn).unwrap();
        assert_eq!(back.feature_count(), tree.feature_count());
        assert_eq!(back.levels(), tree.levels());
        assert_eq!(back.extent(), tree.extent());
        assert_eq!(back.z_range(), tree.z_range());
        for level in 1..=tree.levels() {
            let a: Vec<usize> = tree.nodes_of_level(level).iter().map(Node::feature_count).collect();
            let b: Vec<usize> = back.nodes_of_level(level).iter().map(Node::feature_count).collect();
            assert_eq!(a, b, "level {level}");
        }
        for _ in 0..30 {
            let x = rng.range(-500.0, 500.0);
            let y = rng.range(-500.0, 500.0);
            let q = Envelope::new(x, y, x + 80.0, y + 80.0);
            assert_eq!(back.query_fids(&q), tree.query_fids(&q));
        }
        assert_eq!(back.query_fids(&back.extent()), tree.query_fids(&tree.extent()));
        assert_eq!(back.to_bytes(), encoded, "re-encoding is stable");
    }

    #[test]
    fn corrupt_bin_ids_are_reported() {
        let features: Vec<(u32, Envelope)> = (0..3)
            .map(|i| {
                let v = f64::from(i) * 100.0;
                (i, Envelope::new(v, v, v + 1.0, v + 1.0))
            })
            .collect();
        let tree = SbnTree::create(&features, None, None).unwrap();
        let mut sbn = tree.to_bytes().sbn;
        // First bin id follows the header, the index record header and the entries.
        let entries = tree
            .nodes
            .iter()
            .filter(|n| n.feature_count() > 0)
            .map(Node::id)
            .max()
            .unwrap_or(0);
        let at = SbnHeader::SIZE + 8 + entries * 8;
        sbn[at..at + 4].copy_from_slice(&9_i32.to_be_bytes());
        assert!(matches!(
            SbnTree::from_bytes(&sbn),
            Err(SbnError::BinIdMismatch {
                expected: 2,
                found: 9
            })
        ));
        assert!(matches!(
            SbnTree::from_bytes(&sbn[..at + 2]),
            Err(SbnError::Truncated { .. })
        ));
        assert!(matches!(
            SbnTree::from_bytes(b"definitely not an index"),
            Err(SbnError::Truncated { .. })
        ));
    }

    #[test]
    fn describe_lists_every_node() {
        let tree = SbnTree::create(&[(1, Envelope::new(0.0, 0.0, 1.0, 1.0))], None, None).unwrap();
        let mut text = String::new();
        tree.describe_tree(&mut text).unwrap();
        let rows: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], "    1     1    0- 255    0- 255 1    1 0");
        assert_eq!(rows[1], "    2     2  129- 255    0- 255 1    0 0");
    }

    #[test]
    fn root_covers_byte_space() {
        let tree = SbnTree::create(&[(1, Envelope::new(0.0, 0.0, 1.0, 1.0))], None, None).unwrap();
        assert_eq!(tree.node(1).bounds(), ByteBox::new(0, 0, 255, 255));
    }
}
