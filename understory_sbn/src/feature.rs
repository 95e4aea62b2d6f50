// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Quantized feature records.

use core::fmt;
use core::hash::{Hash, Hasher};

use bytes::{Buf, BufMut};

use crate::quantize::quantize;
use crate::types::{ByteBox, Envelope};

/// One indexed feature: a fid and its quantized bounds.
///
/// Equality and hashing use the fid only; the bounds are derived from the
/// feature's envelope and the index extent.
///
/// On disk a feature is 8 bytes: `min_x`, `min_y`, `max_x`, `max_y`, then the fid
/// as a big-endian `u32`.
#[derive(Copy, Clone)]
pub struct Feature {
    fid: u32,
    bounds: ByteBox,
}

impl Feature {
    /// Encoded size in bytes.
    pub const SIZE: usize = 8;

    /// Create a feature from already quantized bounds.
    pub const fn new(fid: u32, bounds: ByteBox) -> Self {
        Self { fid, bounds }
    }

    /// Quantize `envelope` against the index `extent`.
    pub fn from_envelope(extent: &Envelope, fid: u32, envelope: &Envelope) -> Self {
        Self {
            fid,
            bounds: quantize(extent, envelope),
        }
    }

    /// Feature id.
    pub const fn fid(&self) -> u32 {
        self.fid
    }

    /// Quantized bounds.
    pub const fn bounds(&self) -> ByteBox {
        self.bounds
    }

    /// Closed-interval overlap with a quantized query box.
    pub fn intersects(&self, query: &ByteBox) -> bool {
        self.bounds.intersects(query)
    }

    /// Decode from the 8-byte record layout.
    pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self::read(&mut &bytes[..])
    }

    /// Encode into the 8-byte record layout.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0_u8; Self::SIZE];
        self.write(&mut &mut out[..]);
        out
    }

    /// Read one record. The caller guarantees `Self::SIZE` bytes remain.
    pub(crate) fn read(buf: &mut impl Buf) -> Self {
        let min_x = buf.get_u8();
        let min_y = buf.get_u8();
        let max_x = buf.get_u8();
        let max_y = buf.get_u8();
        let fid = buf.get_u32();
        Self {
            fid,
            bounds: ByteBox::new(min_x, min_y, max_x, max_y),
        }
    }

    pub(crate) fn write(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.bounds.min_x);
        buf.put_u8(self.bounds.min_y);
        buf.put_u8(self.bounds.max_x);
        buf.put_u8(self.bounds.max_y);
        buf.put_u32(self.fid);
    }
}

impl PartialEq for Feature {
    fn eq(&self, other: &Self) -> bool {
        self.fid == other.fid
    }
}

impl Eq for Feature {}

impl Hash for Feature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fid.hash(state);
    }
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Feature {}: ({}-{},{}-{})",
            self.fid, self.bounds.min_x, self.bounds.max_x, self.bounds.min_y, self.bounds.max_y
        )
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[SbnFeature {}: ({}-{},{}-{})]",
            self.fid, self.bounds.min_x, self.bounds.max_x, self.bounds.min_y, self.bounds.max_y
        )
    }
}
