// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Byte quantization of real-world coordinates.
//!
//! Every bound is mapped to `[0, 255]` relative to the index extent on its axis.
//! Lower bounds round down and upper bounds round up, with a small nudge, so a
//! quantized box never reports less than the true extent. Queries may see false
//! positives but never false negatives.
//!
//! The nudge arithmetic reproduces what ESRI writes; the exact float steps matter
//! for byte-compatible output.

use crate::types::{ByteBox, Envelope, Interval};

const NUDGE: f64 = 0.005;

/// Quantize a lower bound against `range`.
///
/// A range without positive width maps every value to `0`.
pub fn scale_lower(value: f64, range: Interval) -> u8 {
    let Some(t) = position(value, range) else {
        return 0;
    };
    let m = (t % 1.0 - NUDGE) % 1.0 + trunc(t);
    to_byte(floor_to_i64(m))
}

/// Quantize an upper bound against `range`.
///
/// A range without positive width maps every value to `255`.
pub fn scale_upper(value: f64, range: Interval) -> u8 {
    let Some(t) = position(value, range) else {
        return u8::MAX;
    };
    let m = (t % 1.0 + NUDGE) % 1.0 + trunc(t);
    to_byte(ceil_to_i64(m))
}

/// Quantize `envelope` against the index `extent`.
pub fn quantize(extent: &Envelope, envelope: &Envelope) -> ByteBox {
    let x = extent.x_interval();
    let y = extent.y_interval();
    ByteBox::new(
        scale_lower(envelope.min_x, x),
        scale_lower(envelope.min_y, y),
        scale_upper(envelope.max_x, x),
        scale_upper(envelope.max_y, y),
    )
}

/// Position of `value` in `range`, scaled to `[0, 255]` and clamped a step beyond.
fn position(value: f64, range: Interval) -> Option<f64> {
    let width = range.width();
    // Also rejects NaN and the empty interval's negative width.
    if !(width > 0.0) {
        return None;
    }
    let t = (value - range.min()) / width * 255.0;
    Some(t.clamp(-1.0, 256.0))
}

#[inline]
fn trunc(v: f64) -> f64 {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "inputs are clamped to a few steps around [0, 255]"
    )]
    let i = v as i64;
    i as f64
}

#[inline]
fn floor_to_i64(v: f64) -> i64 {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "inputs are clamped to a few steps around [0, 255]"
    )]
    let i = v as i64;
    if (i as f64) > v { i - 1 } else { i }
}

#[inline]
fn ceil_to_i64(v: f64) -> i64 {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "inputs are clamped to a few steps around [0, 255]"
    )]
    let i = v as i64;
    if (i as f64) < v { i + 1 } else { i }
}

#[inline]
fn to_byte(v: i64) -> u8 {
    u8::try_from(v.clamp(0, 255)).unwrap_or(u8::MAX)
}
