// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory SBN: reader, writer and builder for the ESRI SBN/SBX spatial index.
//!
//! An SBN index is a fixed-depth binary space partitioning tree stored next to a
//! shapefile. Every feature bounding box is quantized to one byte per bound,
//! relative to the index extent, and the tree splits that 256×256 byte space in
//! half at each level, alternating between x and y. The `.sbn` file holds the
//! nodes' features; the `.sbx` file holds offsets into it.
//!
//! - Build a tree from `(fid, envelope)` pairs with [`SbnTree::create`].
//! - Insert and remove features incrementally; a feature outside the extent asks
//!   the caller to rebuild through [`InsertOutcome::RebuildRequired`].
//! - Query candidate fids with [`SbnTree::query_fids`]. Quantization only widens
//!   boxes, so results never miss an intersecting feature but may include
//!   near misses.
//! - Encode to and decode from bytes ([`SbnTree::to_bytes`], [`SbnTree::from_bytes`]).
//!
//! With the default `std` feature the crate also reads and writes file pairs
//! (`SbnTree::load`, `SbnTree::save`), shares a tree between threads
//! (`SharedSbnTree`) and opens very large indexes lazily (`SbnQueryOnlyTree`),
//! reading node features from disk only when a query reaches them.
//!
//! # Example
//!
//! ```rust
//! use understory_sbn::{Envelope, InsertOutcome, SbnTree};
//!
//! let features = [
//!     (1, Envelope::new(0.0, 0.0, 10.0, 10.0)),
//!     (2, Envelope::new(50.0, 50.0, 60.0, 55.0)),
//!     (3, Envelope::new(90.0, 0.0, 100.0, 100.0)),
//! ];
//! let mut tree = SbnTree::create(&features, None, None).unwrap();
//! assert_eq!(tree.levels(), 2);
//!
//! // Everything near the origin.
//! assert_eq!(tree.query_fids(&Envelope::new(0.0, 0.0, 20.0, 20.0)), [1]);
//!
//! // Inside the extent: accepted.
//! let outcome = tree
//!     .insert(4, Envelope::new(40.0, 40.0, 45.0, 45.0), None, None)
//!     .unwrap();
//! assert_eq!(outcome, InsertOutcome::Inserted);
//!
//! // Outside the extent: the caller has to rebuild.
//! let outcome = tree
//!     .insert(5, Envelope::new(200.0, 200.0, 210.0, 210.0), None, None)
//!     .unwrap();
//! assert!(matches!(outcome, InsertOutcome::RebuildRequired(_)));
//!
//! // Round-trip through the on-disk layout.
//! let encoded = tree.to_bytes();
//! let back = SbnTree::from_bytes(&encoded.sbn).unwrap();
//! assert_eq!(back.feature_count(), 4);
//! ```
//!
//! ## Features
//!
//! - `std` (default): file I/O, [`SharedSbnTree`] and [`SbnQueryOnlyTree`].
//! - `kurbo`: conversions between [`Envelope`] and `kurbo::Rect`.

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod backend;
pub mod bin;
pub mod codec;
pub mod config;
pub mod error;
pub mod feature;
pub mod header;
pub mod node;
pub mod quantize;
pub mod tree;
pub mod types;

#[cfg(feature = "std")]
pub mod fs;
#[cfg(feature = "std")]
pub mod query_only;
#[cfg(feature = "std")]
pub mod sync;

pub use backend::Backend;
pub use bin::{BIN_CAPACITY, Bin, BinChain};
pub use codec::{EncodedIndex, dump_sbn};
pub use config::{QueryOnlyConfig, SaveOptions};
pub use error::{SbnError, SbnResult};
pub use feature::Feature;
pub use header::SbnHeader;
pub use node::{Axis, Child, Node, level_count};
pub use tree::{InsertOutcome, RebuildHandler, RebuildRequired, SbnTree};
pub use types::{Aabb2D, ByteBox, Envelope, Interval};

#[cfg(feature = "std")]
pub use fs::{dump_file, sbx_path};
#[cfg(feature = "std")]
pub use query_only::SbnQueryOnlyTree;
#[cfg(feature = "std")]
pub use sync::SharedSbnTree;

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn create_query_encode() {
        let features: Vec<(u32, Envelope)> = (0..64)
            .map(|i| {
                let x = f64::from(i % 8) * 10.0;
                let y = f64::from(i / 8) * 10.0;
                (i, Envelope::new(x, y, x + 5.0, y + 5.0))
            })
            .collect();
        let tree = SbnTree::create(&features, None, None).unwrap();
        assert_eq!(tree.levels(), level_count(64));

        let hits = tree.query_fids(&Envelope::new(0.0, 0.0, 4.0, 4.0));
        assert!(hits.contains(&0));
        assert!(!hits.contains(&63));

        let encoded = tree.to_bytes();
        assert_eq!(&encoded.sbn[..4], &9994_i32.to_be_bytes());
        assert_eq!(&encoded.sbx[..4], &9994_i32.to_be_bytes());
        assert!(encoded.sbn.len() > encoded.sbx.len());
    }

    #[test]
    fn handler_sees_refused_insert() {
        let mut tree = SbnTree::create(&[(1, Envelope::new(0.0, 0.0, 1.0, 1.0))], None, None).unwrap();
        let refused = alloc::sync::Arc::new(core::sync::atomic::AtomicU32::new(0));
        let sink = refused.clone();
        tree.set_rebuild_handler(move |r: &RebuildRequired| {
            sink.store(r.fid, core::sync::atomic::Ordering::Relaxed);
        });
        let outcome = tree
            .insert(9, Envelope::new(2.0, 2.0, 3.0, 3.0), None, None)
            .unwrap();
        assert!(matches!(outcome, InsertOutcome::RebuildRequired(_)));
        assert_eq!(refused.load(core::sync::atomic::Ordering::Relaxed), 9);
    }
}
