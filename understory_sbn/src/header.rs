// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The 100-byte header shared by `.sbn` and `.sbx` files.

use core::fmt;

use bytes::{Buf, BufMut};

use crate::codec::{ensure, to_i32};
use crate::error::{SbnError, SbnResult};
use crate::types::{Envelope, Interval};

/// First header word of every shapefile index.
pub const FILE_CODE: i32 = 9994;
/// Second header word of every shapefile index.
pub const FILE_CODE_INDEX: i32 = -400;

/// Index header: record count and the X/Y/Z/M ranges of all indexed features.
///
/// The ranges are a high-water mark: they grow as features are added and never
/// shrink when features are removed.
///
/// Layout (all big-endian): file codes at 0 and 4, 16 reserved bytes, the file
/// length in 16-bit words at 24, the record count at 28, then `xmin, ymin, xmax,
/// ymax, zmin, zmax, mmin, mmax` as `f64` from 32, and a zero word at 96.
#[derive(Clone, Debug, PartialEq)]
pub struct SbnHeader {
    num_records: u32,
    file_length: usize,
    x_range: Interval,
    y_range: Interval,
    z_range: Interval,
    m_range: Interval,
}

impl SbnHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 100;

    /// An empty header: no records, empty ranges.
    pub fn new() -> Self {
        Self {
            num_records: 0,
            file_length: Self::SIZE,
            x_range: Interval::EMPTY,
            y_range: Interval::EMPTY,
            z_range: Interval::EMPTY,
            m_range: Interval::EMPTY,
        }
    }

    /// A header for `num_records` features covering `extent`.
    pub fn with_extent(num_records: u32, extent: &Envelope) -> Self {
        Self::from_ranges(
            num_records,
            extent.x_interval(),
            extent.y_interval(),
            Interval::EMPTY,
            Interval::EMPTY,
        )
    }

    /// A header from explicit ranges.
    pub fn from_ranges(
        num_records: u32,
        x_range: Interval,
        y_range: Interval,
        z_range: Interval,
        m_range: Interval,
    ) -> Self {
        Self {
            num_records,
            file_length: Self::SIZE,
            x_range,
            y_range,
            z_range,
            m_range,
        }
    }

    /// Number of indexed features.
    pub fn num_records(&self) -> u32 {
        self.num_records
    }

    /// File length in bytes, as last read. Written headers carry the computed length.
    pub fn file_length(&self) -> usize {
        self.file_length
    }

    /// X range.
    pub fn x_range(&self) -> Interval {
        self.x_range
    }

    /// Y range.
    pub fn y_range(&self) -> Interval {
        self.y_range
    }

    /// Z range.
    pub fn z_range(&self) -> Interval {
        self.z_range
    }

    /// M range.
    pub fn m_range(&self) -> Interval {
        self.m_range
    }

    /// The X/Y extent as an envelope.
    pub fn extent(&self) -> Envelope {
        Envelope::from_intervals(self.x_range, self.y_range)
    }

    /// Count one more feature and grow the ranges to cover it.
    pub fn add_feature(
        &mut self,
        envelope: &Envelope,
        z_range: Option<Interval>,
        m_range: Option<Interval>,
    ) {
        self.num_records = self.num_records.saturating_add(1);
        self.x_range = self.x_range.expanded_by_interval(&envelope.x_interval());
        self.y_range = self.y_range.expanded_by_interval(&envelope.y_interval());
        self.z_range = self
            .z_range
            .expanded_by_interval(&z_range.unwrap_or(Interval::EMPTY));
        self.m_range = self
            .m_range
            .expanded_by_interval(&m_range.unwrap_or(Interval::EMPTY));
    }

    /// Parse a header, checking the file codes.
    pub fn read(buf: &mut impl Buf) -> SbnResult<Self> {
        ensure(buf, Self::SIZE)?;
        let file_code = buf.get_i32();
        let file_code_index = buf.get_i32();
        if file_code != FILE_CODE || file_code_index != FILE_CODE_INDEX {
            return Err(SbnError::NotAShapefileIndex {
                file_code,
                file_code_index,
            });
        }
        buf.advance(16);
        let words = buf.get_i32();
        let file_length = usize::try_from(words)
            .map_err(|_| SbnError::InvalidCount(words))?
            .saturating_mul(2);
        let records = buf.get_i32();
        let num_records = u32::try_from(records).map_err(|_| SbnError::InvalidCount(records))?;
        let min_x = buf.get_f64();
        let min_y = buf.get_f64();
        let max_x = buf.get_f64();
        let max_y = buf.get_f64();
        let z_range = read_interval(buf);
        let m_range = read_interval(buf);
        buf.advance(4);
        Ok(Self {
            num_records,
            file_length,
            x_range: Interval::new(min_x, max_x),
            y_range: Interval::new(min_y, max_y),
            z_range,
            m_range,
        })
    }

    /// Write the header for a file of `file_length` bytes.
    pub fn write(&self, buf: &mut impl BufMut, file_length: usize) {
        buf.put_i32(FILE_CODE);
        buf.put_i32(FILE_CODE_INDEX);
        buf.put_bytes(0, 16);
        buf.put_i32(to_i32(file_length / 2));
        buf.put_i32(to_i32(self.num_records as usize));
        buf.put_f64(finite_or_zero(self.x_range.min()));
        buf.put_f64(finite_or_zero(self.y_range.min()));
        buf.put_f64(finite_or_zero(self.x_range.max()));
        buf.put_f64(finite_or_zero(self.y_range.max()));
        write_interval(buf, &self.z_range);
        write_interval(buf, &self.m_range);
        buf.put_i32(0);
    }
}

impl Default for SbnHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SbnHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[SbnHeader")?;
        writeln!(f, "  FileCode: {FILE_CODE}")?;
        writeln!(f, "  FileCode2: {FILE_CODE_INDEX}")?;
        writeln!(f, "  NumRecords: {}", self.num_records)?;
        writeln!(f, "  FileLength: {}", self.file_length)?;
        writeln!(f, "  XRange: {}", self.x_range)?;
        writeln!(f, "  YRange: {}", self.y_range)?;
        writeln!(f, "  ZRange: {}", self.z_range)?;
        write!(f, "  MRange: {}]", self.m_range)
    }
}

fn read_interval(buf: &mut impl Buf) -> Interval {
    let min = buf.get_f64();
    let max = buf.get_f64();
    Interval::new(min, max)
}

/// Empty intervals are written as `0.0, 0.0`.
fn write_interval(buf: &mut impl BufMut, interval: &Interval) {
    if interval.is_empty() {
        buf.put_f64(0.0);
        buf.put_f64(0.0);
    } else {
        buf.put_f64(interval.min());
        buf.put_f64(interval.max());
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}
