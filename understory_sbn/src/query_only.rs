// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A read-only tree that loads node features from disk on demand.
//!
//! Opening reads the two headers and the bin index. A query first collects the
//! ids of the nodes it touches, then reads just those nodes' bins through the
//! `.sbx` offset table. Nodes down to [`QueryOnlyConfig::max_cache_level`] are
//! kept after their first read; deeper nodes are read again by every query.

use alloc::sync::Arc;
use alloc::vec::Vec;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::backend::Backend;
use crate::codec::{self, BinIndexEntry, ENTRY_SIZE};
use crate::config::QueryOnlyConfig;
use crate::error::{SbnError, SbnResult};
use crate::feature::Feature;
use crate::fs::check_pair;
use crate::header::SbnHeader;
use crate::node::{Child, Node, ROOT, child_of, level_count, level_of};
use crate::quantize::quantize;
use crate::types::{ByteBox, Envelope, Interval};

struct Streams<R> {
    sbn: R,
    sbx: R,
}

impl<R: Read + Seek> Streams<R> {
    /// Raw bytes of bin `bin_id`, located through its `.sbx` entry.
    fn bin_data(&mut self, bin_id: i32) -> SbnResult<Vec<u8>> {
        let slot = u64::try_from(bin_id - 1).map_err(|_| SbnError::InvalidCount(bin_id))?;
        let at = SbnHeader::SIZE as u64 + slot * ENTRY_SIZE as u64;
        self.sbx.seek(SeekFrom::Start(at))?;
        let entry = read_up_to(&mut self.sbx, ENTRY_SIZE)?;
        let (offset, size) = codec::read_sbx_entry(&mut &entry[..])?;
        self.sbn.seek(SeekFrom::Start(offset))?;
        read_up_to(&mut self.sbn, size)
    }
}

/// Read `len` bytes, failing with [`SbnError::Truncated`] if the stream ends first.
///
/// `len` comes from the file, so the buffer grows with what is actually read.
fn read_up_to(reader: &mut impl Read, len: usize) -> SbnResult<Vec<u8>> {
    let mut out = Vec::new();
    reader.take(len as u64).read_to_end(&mut out)?;
    if out.len() < len {
        return Err(SbnError::Truncated {
            needed: len,
            available: out.len(),
        });
    }
    Ok(out)
}

/// A node picked by a query, and whether the query box covers it completely.
#[derive(Copy, Clone, Debug)]
struct Hit {
    id: usize,
    covered: bool,
}

/// Lazy, read-only view of an `.sbn`/`.sbx` pair.
///
/// Queries take `&self`; the two streams and the node cache each sit behind a
/// mutex, so a tree can be shared between threads.
pub struct SbnQueryOnlyTree<R: Read + Seek = File> {
    header: SbnHeader,
    entries: Vec<BinIndexEntry>,
    levels: u32,
    first_leaf: usize,
    config: QueryOnlyConfig,
    streams: Mutex<Streams<R>>,
    cache: Mutex<HashMap<usize, Arc<[Feature]>>>,
}

impl SbnQueryOnlyTree<File> {
    /// Open the index at `path` (and its `.sbx`) with the default configuration.
    pub fn open(path: impl AsRef<Path>) -> SbnResult<Self> {
        Self::open_with(path, QueryOnlyConfig::default())
    }

    /// Open the index at `path` (and its `.sbx`).
    pub fn open_with(path: impl AsRef<Path>, config: QueryOnlyConfig) -> SbnResult<Self> {
        let path = path.as_ref();
        let sbx = check_pair(path)?;
        let tree = Self::from_readers(File::open(path)?, File::open(sbx)?, config)?;
        debug!(
            path = %path.display(),
            features = tree.feature_count(),
            levels = tree.levels,
            "opened query-only sbn index"
        );
        Ok(tree)
    }
}

impl<R: Read + Seek> SbnQueryOnlyTree<R> {
    /// Build a tree over any pair of seekable streams.
    ///
    /// Fails if the configuration is invalid, either header is malformed, the
    /// headers disagree on the record count, or the bin index references nodes
    /// the tree cannot have.
    pub fn from_readers(mut sbn: R, mut sbx: R, config: QueryOnlyConfig) -> SbnResult<Self> {
        config.validate()?;

        sbn.seek(SeekFrom::Start(0))?;
        let header = SbnHeader::read(&mut &read_up_to(&mut sbn, SbnHeader::SIZE)?[..])?;
        let record = read_up_to(&mut sbn, ENTRY_SIZE)?;
        let words = i32::from_be_bytes([record[4], record[5], record[6], record[7]]);
        let len = usize::try_from(words)
            .ok()
            .and_then(|w| w.checked_mul(2))
            .ok_or(SbnError::InvalidCount(words))?;
        let mut index = record;
        index.extend(read_up_to(&mut sbn, len)?);
        let entries = codec::read_bin_index(&mut &index[..])?;

        sbx.seek(SeekFrom::Start(0))?;
        let sbx_header = SbnHeader::read(&mut &read_up_to(&mut sbx, SbnHeader::SIZE)?[..])?;
        if sbx_header.num_records() != header.num_records() {
            return Err(SbnError::HeaderMismatch {
                sbn: header.num_records(),
                sbx: sbx_header.num_records(),
            });
        }
        codec::read_sbx_record(&mut &read_up_to(&mut sbx, ENTRY_SIZE)?[..])?;

        let levels = level_count(header.num_records() as usize);
        let first_leaf = 1_usize << (levels - 1);
        if let Some(i) = entries
            .iter()
            .rposition(|e| e.has_bins() && e.feature_count > 0)
            && i + 1 >= first_leaf * 2
        {
            return Err(SbnError::NodeOutOfRange { node: i + 1, levels });
        }

        Ok(Self {
            header,
            entries,
            levels,
            first_leaf,
            config,
            streams: Mutex::new(Streams { sbn, sbx }),
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// The `.sbn` header.
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

    /// Number of indexed features, as recorded in the header.
    pub fn feature_count(&self) -> usize {
        self.header.num_records() as usize
    }

    /// Number of levels.
    pub fn levels(&self) -> u32 {
        self.levels
    }

    /// The configuration in use.
    pub fn config(&self) -> QueryOnlyConfig {
        self.config
    }

    /// Number of nodes currently cached.
    pub fn cached_nodes(&self) -> usize {
        self.cache.lock().len()
    }

    /// Sorted fids of features whose quantized bounds overlap `envelope`.
    ///
    /// Yields the same fids as [`SbnTree::query_fids`](crate::SbnTree::query_fids)
    /// on the loaded tree.
    pub fn query_fids(&self, envelope: &Envelope) -> SbnResult<Vec<u32>> {
        let extent = self.header.extent();
        let clipped = extent.intersect(envelope);
        if clipped.is_empty() {
            return Ok(Vec::new());
        }
        let query = quantize(&extent, &clipped);

        let mut hits = Vec::new();
        self.collect_nodes(ROOT, ByteBox::new(0, 0, 255, 255), &query, &mut hits);
        hits.sort_unstable_by_key(|h| h.id);
        trace!(nodes = hits.len(), "query-only node selection");

        let mut out = Vec::new();
        for hit in hits {
            let features = self.node_features(hit.id)?;
            if hit.covered {
                out.extend(features.iter().map(Feature::fid));
            } else {
                out.extend(
                    features
                        .iter()
                        .filter(|f| f.intersects(&query))
                        .map(Feature::fid),
                );
            }
        }
        out.sort_unstable();
        Ok(out)
    }

    fn has_features(&self, id: usize) -> bool {
        self.entries
            .get(id - 1)
            .is_some_and(|e| e.has_bins() && e.feature_count > 0)
    }

    fn collect_nodes(&self, id: usize, bounds: ByteBox, query: &ByteBox, out: &mut Vec<Hit>) {
        if id > self.entries.len() || !bounds.intersects(query) {
            return;
        }
        if query.contains(&bounds) {
            self.collect_subtree(id, out);
            return;
        }
        if self.has_features(id) {
            out.push(Hit { id, covered: false });
        }
        if id < self.first_leaf {
            let node = Node::new(id, bounds, false);
            for child in [Child::Upper, Child::Lower] {
                self.collect_nodes(child_of(id, child), node.split_bounds(child), query, out);
            }
        }
    }

    /// Every non-empty node at or below `id`, level by level.
    fn collect_subtree(&self, id: usize, out: &mut Vec<Hit>) {
        let last = self.entries.len();
        let (mut lo, mut hi) = (id, id + 1);
        while lo <= last {
            for n in lo..hi.min(last + 1) {
                if self.has_features(n) {
                    out.push(Hit {
                        id: n,
                        covered: true,
                    });
                }
            }
            if lo >= self.first_leaf {
                break;
            }
            lo *= 2;
            hi *= 2;
        }
    }

    fn node_features(&self, id: usize) -> SbnResult<Arc<[Feature]>> {
        let cacheable = level_of(id) <= self.config.max_cache_level;
        if cacheable && let Some(features) = self.cache.lock().get(&id) {
            return Ok(Arc::clone(features));
        }
        let features: Arc<[Feature]> = self.read_node(id)?.into();
        if cacheable {
            self.cache.lock().insert(id, Arc::clone(&features));
        }
        Ok(features)
    }

    fn read_node(&self, id: usize) -> SbnResult<Vec<Feature>> {
        let entry = self.entries[id - 1];
        let mut out = Vec::new();
        let mut streams = self.streams.lock();
        for i in 0..entry.bin_count() {
            let bin_id = entry.first_bin + codec::to_i32(i);
            let data = streams.bin_data(bin_id)?;
            let (found, bin) = codec::read_bin(&mut &data[..])?;
            if found != bin_id {
                return Err(SbnError::BinIdMismatch {
                    expected: bin_id,
                    found,
                });
            }
            out.extend_from_slice(bin.features());
        }
        Ok(out)
    }
}

impl<R: Read + Seek> core::fmt::Debug for SbnQueryOnlyTree<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SbnQueryOnlyTree")
            .field("levels", &self.levels)
            .field("feature_count", &self.feature_count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<R: Read + Seek> Backend for SbnQueryOnlyTree<R> {
    type Error = SbnError;

    fn extent(&self) -> Envelope {
        Self::extent(self)
    }

    fn feature_count(&self) -> usize {
        Self::feature_count(self)
    }

    fn query_fids(&self, envelope: &Envelope) -> SbnResult<Vec<u32>> {
        Self::query_fids(self, envelope)
    }
}
