// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Read path abstraction shared by the in-memory and lazy trees.

use alloc::vec::Vec;
use core::convert::Infallible;

use crate::tree::SbnTree;
use crate::types::Envelope;

/// Something that answers fid queries over an SBN index.
///
/// Implemented by [`SbnTree`], and with the `std` feature by `SharedSbnTree` and
/// `SbnQueryOnlyTree`, so callers can pick the in-memory or the on-disk read path
/// without changing their query code.
pub trait Backend {
    /// Error surfaced by a query.
    type Error;

    /// X/Y extent of all indexed features.
    fn extent(&self) -> Envelope;

    /// Number of indexed features.
    fn feature_count(&self) -> usize;

    /// Sorted fids of features whose quantized bounds overlap `envelope`.
    fn query_fids(&self, envelope: &Envelope) -> Result<Vec<u32>, Self::Error>;
}

impl Backend for SbnTree {
    type Error = Infallible;

    fn extent(&self) -> Envelope {
        Self::extent(self)
    }

    fn feature_count(&self) -> usize {
        Self::feature_count(self)
    }

    fn query_fids(&self, envelope: &Envelope) -> Result<Vec<u32>, Infallible> {
        Ok(Self::query_fids(self, envelope))
    }
}
