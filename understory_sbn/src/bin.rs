// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fixed-capacity feature bins and per-node bin chains.

use alloc::vec::Vec;
use core::mem;

use smallvec::SmallVec;

use crate::feature::Feature;

/// Maximum number of features in one bin.
pub const BIN_CAPACITY: usize = 100;

/// A block of up to [`BIN_CAPACITY`] features, kept in insertion order.
#[derive(Clone, Debug, Default)]
pub struct Bin {
    features: SmallVec<[Feature; 8]>,
}

impl Bin {
    /// Create an empty bin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of features held.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the bin holds no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Whether the bin reached [`BIN_CAPACITY`].
    pub fn is_full(&self) -> bool {
        self.features.len() >= BIN_CAPACITY
    }

    /// The features in storage order.
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Append a feature. Panics if the bin is full.
    pub fn push(&mut self, feature: Feature) {
        assert!(!self.is_full(), "bin capacity exceeded");
        self.features.push(feature);
    }
}

/// The bins owned by one node.
///
/// Every bin except the last is full and no bin is empty, so the chain is a
/// left-packed sequence of features split into blocks of [`BIN_CAPACITY`].
#[derive(Clone, Debug, Default)]
pub struct BinChain {
    bins: Vec<Bin>,
}

impl BinChain {
    /// Create an empty chain.
    pub const fn new() -> Self {
        Self { bins: Vec::new() }
    }

    /// Total number of features in the chain.
    pub fn len(&self) -> usize {
        match self.bins.last() {
            Some(last) => (self.bins.len() - 1) * BIN_CAPACITY + last.len(),
            None => 0,
        }
    }

    /// Whether the chain holds no features.
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// The bins, first to last.
    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    /// All features in chain order.
    pub fn iter(&self) -> impl Iterator<Item = &Feature> + '_ {
        self.bins.iter().flat_map(|b| b.features.iter())
    }

    /// Feature at chain position `index`.
    pub fn get(&self, index: usize) -> Option<&Feature> {
        self.bins
            .get(index / BIN_CAPACITY)
            .and_then(|b| b.features.get(index % BIN_CAPACITY))
    }

    /// Append at the tail, opening a new bin when the tail is full.
    pub fn push(&mut self, feature: Feature) {
        match self.bins.last_mut() {
            Some(tail) if !tail.is_full() => tail.push(feature),
            _ => {
                let mut bin = Bin::new();
                bin.push(feature);
                self.bins.push(bin);
            }
        }
    }

    /// Position of the feature with `fid`.
    pub fn position(&self, fid: u32) -> Option<usize> {
        self.iter().position(|f| f.fid() == fid)
    }

    /// Remove the feature at chain position `index`, keeping the chain left-packed.
    ///
    /// Later features in the same bin shift left; each following bin hands its first
    /// feature to the bin before it, and an emptied tail bin is dropped.
    /// Panics if `index` is out of range.
    pub fn remove_at(&mut self, index: usize) -> Feature {
        let first = index / BIN_CAPACITY;
        assert!(index < self.len(), "bin chain index {index} out of range");
        let removed = self.bins[first].features.remove(index % BIN_CAPACITY);
        for next in first + 1..self.bins.len() {
            let pulled = self.bins[next].features.remove(0);
            self.bins[next - 1].features.push(pulled);
        }
        if self.bins.last().is_some_and(Bin::is_empty) {
            self.bins.pop();
        }
        removed
    }

    /// Remove the feature with `fid`, if present.
    pub fn remove(&mut self, fid: u32) -> Option<Feature> {
        let index = self.position(fid)?;
        Some(self.remove_at(index))
    }

    /// Move all features out, leaving this chain empty.
    pub fn take(&mut self) -> Self {
        mem::take(self)
    }
}

impl Extend<Feature> for BinChain {
    fn extend<I: IntoIterator<Item = Feature>>(&mut self, iter: I) {
        for feature in iter {
            self.push(feature);
        }
    }
}
