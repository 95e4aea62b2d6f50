// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Primitive geometry types and helpers.
//!
//! [`Aabb2D`] is the shared box shape. Real-world extents use [`Envelope`] (`f64`),
//! the quantized tree works in [`ByteBox`] (`u8`, one byte per axis bound).

use core::cmp::Ordering;
use core::fmt;

/// Axis-aligned bounding box in 2D.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Aabb2D<T> {
    /// Minimum x (left)
    pub min_x: T,
    /// Minimum y (bottom)
    pub min_y: T,
    /// Maximum x (right)
    pub max_x: T,
    /// Maximum y (top)
    pub max_y: T,
}

/// Real-world 2D extent of a feature or query.
pub type Envelope = Aabb2D<f64>;

/// Quantized box; every bound is a byte in `[0, 255]` relative to the index extent.
pub type ByteBox = Aabb2D<u8>;

impl<T> Aabb2D<T> {
    /// Create a new AABB from min/max corners.
    pub const fn new(min_x: T, min_y: T, max_x: T, max_y: T) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }
}

impl<T: Copy + PartialOrd> Aabb2D<T> {
    /// Whether `other` lies entirely inside this AABB (boundaries included).
    pub fn contains(&self, other: &Self) -> bool {
        le(self.min_x, other.min_x)
            && le(self.min_y, other.min_y)
            && le(other.max_x, self.max_x)
            && le(other.max_y, self.max_y)
    }

    /// Closed-interval overlap test: touching edges count as intersecting.
    pub fn intersects(&self, other: &Self) -> bool {
        !(lt(self.max_x, other.min_x)
            || lt(other.max_x, self.min_x)
            || lt(self.max_y, other.min_y)
            || lt(other.max_y, self.min_y))
    }

    /// The intersection of two AABBs. May be empty; check with [`Aabb2D::is_empty`].
    pub fn intersect(&self, other: &Self) -> Self {
        let min_x = max_t(self.min_x, other.min_x);
        let min_y = max_t(self.min_y, other.min_y);
        let max_x = min_t(self.max_x, other.max_x);
        let max_y = min_t(self.max_y, other.max_y);
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Return true if the AABB is empty or inverted (no area). Assumes no NaN.
    pub fn is_empty(&self) -> bool {
        lt(self.max_x, self.min_x) || lt(self.max_y, self.min_y)
    }
}

impl Aabb2D<f64> {
    /// Create an AABB from origin and size in f64.
    pub const fn from_xywh(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x + w,
            max_y: y + h,
        }
    }

    /// Build an envelope from its x and y ranges.
    pub fn from_intervals(x: Interval, y: Interval) -> Self {
        Self::new(x.min(), y.min(), x.max(), y.max())
    }

    /// The x range of this envelope.
    pub fn x_interval(&self) -> Interval {
        Interval::new(self.min_x, self.max_x)
    }

    /// The y range of this envelope.
    pub fn y_interval(&self) -> Interval {
        Interval::new(self.min_y, self.max_y)
    }
}

#[cfg(feature = "kurbo")]
impl From<kurbo::Rect> for Aabb2D<f64> {
    fn from(rect: kurbo::Rect) -> Self {
        let r = rect.abs();
        Self::new(r.x0, r.y0, r.x1, r.y1)
    }
}

#[cfg(feature = "kurbo")]
impl Aabb2D<f64> {
    /// Convert to a kurbo rectangle.
    pub fn to_rect(&self) -> kurbo::Rect {
        kurbo::Rect::new(self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

/// Closed range `[min, max]` on one axis.
///
/// The empty interval has `min = +∞` and `max = −∞`, so expanding it by any value
/// yields that value. Intervals are values: every operation returns a new one.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Interval {
    min: f64,
    max: f64,
}

impl Interval {
    /// The empty interval.
    pub const EMPTY: Self = Self {
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
    };

    /// Create an interval spanning `a` and `b`, in either order.
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            min: min_t(a, b),
            max: max_t(a, b),
        }
    }

    /// Lower bound.
    pub const fn min(&self) -> f64 {
        self.min
    }

    /// Upper bound.
    pub const fn max(&self) -> f64 {
        self.max
    }

    /// `max - min`. Negative (−∞) for the empty interval.
    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    /// Whether this is the empty interval (or otherwise inverted).
    pub fn is_empty(&self) -> bool {
        lt(self.max, self.min)
    }

    /// Whether `other` lies within this interval. The empty interval is contained everywhere.
    pub fn contains(&self, other: &Self) -> bool {
        other.is_empty() || (le(self.min, other.min) && le(other.max, self.max))
    }

    /// This interval grown to include `value`.
    pub fn expanded_by_value(&self, value: f64) -> Self {
        if self.is_empty() {
            return Self {
                min: value,
                max: value,
            };
        }
        Self {
            min: min_t(self.min, value),
            max: max_t(self.max, value),
        }
    }

    /// The union of both intervals.
    pub fn expanded_by_interval(&self, other: &Self) -> Self {
        if other.is_empty() {
            return *self;
        }
        if self.is_empty() {
            return *other;
        }
        Self {
            min: min_t(self.min, other.min),
            max: max_t(self.max, other.max),
        }
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("[empty]")
        } else {
            write!(f, "[{}, {}]", self.min, self.max)
        }
    }
}

pub(crate) fn min_t<T: PartialOrd + Copy>(a: T, b: T) -> T {
    match a.partial_cmp(&b) {
        Some(Ordering::Greater) => b,
        _ => a,
    }
}

pub(crate) fn max_t<T: PartialOrd + Copy>(a: T, b: T) -> T {
    match a.partial_cmp(&b) {
        Some(Ordering::Less) => b,
        _ => a,
    }
}

pub(crate) fn le<T: PartialOrd>(a: T, b: T) -> bool {
    a.partial_cmp(&b)
        .map(|o| o != Ordering::Greater)
        .unwrap_or(false)
}
pub(crate) fn lt<T: PartialOrd>(a: T, b: T) -> bool {
    a.partial_cmp(&b)
        .map(|o| o == Ordering::Less)
        .unwrap_or(false)
}
