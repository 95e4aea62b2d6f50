// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Binary layout of `.sbn` and `.sbx` files.
//!
//! Both files start with an [`SbnHeader`]. The `.sbn` continues with the bin
//! index, a record tagged `1` holding one `(first_bin, feature_count)` pair per
//! node up to the last node with features (`(-1, 0)` for empty nodes), followed by
//! the bins: `(bin_id, feature_count * 4)` and `feature_count` 8-byte features.
//! Bin ids start at 2 and run consecutively in node order.
//!
//! The `.sbx` continues with a record tagged `50` of the same length and one
//! `(sbn_offset / 2, feature_count * 4)` pair per bin, which allows random access
//! to the bins of a single node.
//!
//! All integers and floats are big-endian.

use alloc::vec::Vec;
use core::fmt::Write;

use bytes::{Buf, BufMut};

use crate::bin::{BIN_CAPACITY, Bin};
use crate::error::{SbnError, SbnResult};
use crate::feature::Feature;
use crate::header::SbnHeader;
use crate::node::Nodes;

/// Tag of the `.sbn` bin index record.
pub const SBN_INDEX_TAG: i32 = 1;
/// Tag of the `.sbx` offset record.
pub const SBX_INDEX_TAG: i32 = 50;
/// Id of the first bin.
pub const FIRST_BIN_ID: i32 = 2;

/// Size of one bin index, bin header or `.sbx` entry.
pub(crate) const ENTRY_SIZE: usize = 8;

/// Encoded `.sbn` and `.sbx` contents of one tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncodedIndex {
    /// The `.sbn` bytes.
    pub sbn: Vec<u8>,
    /// The `.sbx` bytes.
    pub sbx: Vec<u8>,
}

/// One bin index entry: where a node's bins start and how many features it holds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BinIndexEntry {
    /// Id of the node's first bin, or `-1` for an empty node.
    pub first_bin: i32,
    /// Number of features stored at the node.
    pub feature_count: u32,
}

impl BinIndexEntry {
    /// Entry of a node without features.
    pub const EMPTY: Self = Self {
        first_bin: -1,
        feature_count: 0,
    };

    /// Whether the node has bins. Ids below 2 mean no bins.
    pub fn has_bins(&self) -> bool {
        self.first_bin >= FIRST_BIN_ID
    }

    /// Number of bins the node occupies.
    pub fn bin_count(&self) -> usize {
        (self.feature_count as usize).div_ceil(BIN_CAPACITY)
    }
}

/// Fail with [`SbnError::Truncated`] unless `needed` bytes remain.
pub(crate) fn ensure(buf: &impl Buf, needed: usize) -> SbnResult<()> {
    let available = buf.remaining();
    if available < needed {
        return Err(SbnError::Truncated { needed, available });
    }
    Ok(())
}

/// Lengths and counts are 32-bit on disk; larger values saturate.
pub(crate) fn to_i32(v: usize) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

fn non_negative(v: i32) -> SbnResult<usize> {
    usize::try_from(v).map_err(|_| SbnError::InvalidCount(v))
}

/// Read the tag and length of a record, returning the payload length in bytes.
fn read_record_header(buf: &mut impl Buf, tag: i32) -> SbnResult<usize> {
    ensure(buf, ENTRY_SIZE)?;
    let found = buf.get_i32();
    if found != tag {
        return Err(SbnError::UnexpectedRecord {
            expected: tag,
            found,
        });
    }
    let words = buf.get_i32();
    Ok(non_negative(words)? * 2)
}

/// Read the `.sbn` bin index record. Entry `i` describes node `i + 1`.
pub fn read_bin_index(buf: &mut impl Buf) -> SbnResult<Vec<BinIndexEntry>> {
    let len = read_record_header(buf, SBN_INDEX_TAG)?;
    ensure(buf, len)?;
    let count = len / ENTRY_SIZE;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let first_bin = buf.get_i32();
        let features = buf.get_i32();
        let feature_count =
            u32::try_from(features).map_err(|_| SbnError::InvalidCount(features))?;
        entries.push(BinIndexEntry {
            first_bin,
            feature_count,
        });
    }
    buf.advance(len % ENTRY_SIZE);
    Ok(entries)
}

/// Read the `.sbx` offset record header, returning the number of nodes it covers.
pub fn read_sbx_record(buf: &mut impl Buf) -> SbnResult<usize> {
    Ok(read_record_header(buf, SBX_INDEX_TAG)? / ENTRY_SIZE)
}

/// Read one bin, returning its id.
pub fn read_bin(buf: &mut impl Buf) -> SbnResult<(i32, Bin)> {
    ensure(buf, ENTRY_SIZE)?;
    let bin_id = buf.get_i32();
    let words = buf.get_i32();
    let num_features = words / 4;
    if words < 0 || words % 4 != 0 || num_features as usize > BIN_CAPACITY {
        return Err(SbnError::MalformedBin {
            bin_id,
            num_features,
        });
    }
    let count = num_features as usize;
    ensure(buf, count * Feature::SIZE)?;
    let mut bin = Bin::new();
    for _ in 0..count {
        bin.push(Feature::read(buf));
    }
    Ok((bin_id, bin))
}

/// Read one `.sbx` entry: the bin's byte offset in the `.sbn` and its total size
/// including the 8-byte bin header.
pub fn read_sbx_entry(buf: &mut impl Buf) -> SbnResult<(u64, usize)> {
    ensure(buf, ENTRY_SIZE)?;
    let offset = u64::from(buf.get_u32()) * 2;
    let words = buf.get_i32();
    Ok((offset, ENTRY_SIZE + non_negative(words)? * 2))
}

/// Encode the header and node array into `.sbn` and `.sbx` bytes.
pub(crate) fn encode(header: &SbnHeader, nodes: &Nodes) -> EncodedIndex {
    let mut num_bins = 0;
    let mut last_node = 0;
    let mut feature_count = 0;
    for node in nodes.iter() {
        let count = node.feature_count();
        if count > 0 {
            num_bins += count.div_ceil(BIN_CAPACITY);
            last_node = node.id();
            feature_count += count;
        }
    }
    // The index record header is counted like one more bin.
    let records = num_bins + 1;
    let index_len = last_node * ENTRY_SIZE;
    let sbx_size = SbnHeader::SIZE + records * ENTRY_SIZE;
    let sbn_size =
        SbnHeader::SIZE + index_len + records * ENTRY_SIZE + feature_count * Feature::SIZE;

    let mut sbn = Vec::with_capacity(sbn_size);
    let mut sbx = Vec::with_capacity(sbx_size);
    header.write(&mut sbn, sbn_size);
    header.write(&mut sbx, sbx_size);

    sbn.put_i32(SBN_INDEX_TAG);
    sbn.put_i32(to_i32(index_len / 2));
    sbx.put_i32(SBX_INDEX_TAG);
    sbx.put_i32(to_i32(index_len / 2));

    let mut next_bin = FIRST_BIN_ID;
    for node in nodes.iter().take(last_node) {
        let count = node.feature_count();
        if count > 0 {
            sbn.put_i32(next_bin);
            sbn.put_i32(to_i32(count));
            next_bin += to_i32(count.div_ceil(BIN_CAPACITY));
        } else {
            sbn.put_i32(BinIndexEntry::EMPTY.first_bin);
            sbn.put_i32(0);
        }
    }

    let mut bin_id = FIRST_BIN_ID;
    for node in nodes.iter().take(last_node) {
        for bin in node.bins().bins() {
            sbx.put_i32(to_i32(sbn.len() / 2));
            sbx.put_i32(to_i32(bin.len() * 4));
            sbn.put_i32(bin_id);
            sbn.put_i32(to_i32(bin.len() * 4));
            for feature in bin.features() {
                feature.write(&mut sbn);
            }
            bin_id += 1;
        }
    }
    debug_assert_eq!(sbn.len(), sbn_size, "sbn size bookkeeping");
    debug_assert_eq!(sbx.len(), sbx_size, "sbx size bookkeeping");
    EncodedIndex { sbn, sbx }
}

/// Render a raw `.sbn` file as text: header, bin index entries and every bin.
pub fn dump_sbn(mut bytes: &[u8], out: &mut impl Write) -> SbnResult<()> {
    let header = SbnHeader::read(&mut bytes)?;
    writeln!(out, "{header}")?;
    writeln!(out, "[BinHeader]")?;
    let entries = read_bin_index(&mut bytes)?;
    writeln!(
        out,
        "#1, {} => MaxNodeId = {}",
        entries.len() * 4,
        entries.len()
    )?;
    for (i, entry) in entries.iter().enumerate() {
        writeln!(
            out,
            "#{}, Index {}, NumFeatures={}",
            i + 2,
            entry.first_bin,
            entry.feature_count
        )?;
    }
    writeln!(out, "[Bins]")?;
    while bytes.has_remaining() {
        let (bin_id, bin) = read_bin(&mut bytes)?;
        writeln!(out, "[SbnBin {}: {}]", bin_id, bin.len())?;
        for feature in bin.features() {
            writeln!(out, "  {feature}")?;
        }
    }
    Ok(())
}
