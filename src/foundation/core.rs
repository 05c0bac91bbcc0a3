use std::fmt;

use crate::foundation::error::{FramescrollError, FramescrollResult};

pub use kurbo::{Affine, Point, Rect, Size, Vec2};

/// One-based index of a still image in the sequence.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u32);

impl fmt::Display for FrameIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The valid index range `[1, count]` of a non-empty sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameSpan {
    count: u32,
}

impl FrameSpan {
    /// Validate a raw frame count. Zero, negative and oversized counts are configuration errors.
    pub fn new(frame_count: i64) -> FramescrollResult<Self> {
        if frame_count <= 0 {
            return Err(FramescrollError::configuration(format!(
                "frame_count must be > 0 (got {frame_count})"
            )));
        }
        let count = u32::try_from(frame_count).map_err(|_| {
            FramescrollError::configuration(format!("frame_count {frame_count} is too large"))
        })?;
        Ok(Self { count })
    }

    pub fn count(self) -> u32 {
        self.count
    }

    pub fn first(self) -> FrameIndex {
        FrameIndex(1)
    }

    pub fn last(self) -> FrameIndex {
        FrameIndex(self.count)
    }

    pub fn contains(self, index: FrameIndex) -> bool {
        (1..=self.count).contains(&index.0)
    }

    /// Clamp any signed index to the nearest bound of the span.
    pub fn clamp(self, raw: i64) -> FrameIndex {
        FrameIndex(raw.clamp(1, i64::from(self.count)) as u32)
    }

    /// Map a scroll progress in `[0, 1]` to a frame: `round(p * (count - 1)) + 1`.
    ///
    /// `f64::round` rounds halves away from zero, so with 10 frames progress `0.5` lands on
    /// frame 6. Out-of-range and NaN progress clamp to the span.
    pub fn frame_for_progress(self, progress: f64) -> FrameIndex {
        if progress.is_nan() {
            return self.first();
        }
        let offset = (progress * f64::from(self.count - 1)).round();
        // Float-to-int casts saturate, so infinities stay in range until the clamp.
        self.clamp((offset as i64).saturating_add(1))
    }

    /// Indices within `radius` of `center`, nearest first, alternating forward then backward.
    ///
    /// The radius is capped at `count - 1`; nothing beyond that can land inside the span.
    pub fn neighborhood(self, center: FrameIndex, radius: u32) -> Vec<FrameIndex> {
        let radius = radius.min(self.count.saturating_sub(1));
        let center = i64::from(center.0);
        let mut out = Vec::with_capacity(radius as usize * 2);
        for d in 1..=i64::from(radius) {
            for candidate in [center + d, center - d] {
                if (1..=i64::from(self.count)).contains(&candidate) {
                    out.push(FrameIndex(candidate as u32));
                }
            }
        }
        out
    }

    /// `n` indices spread evenly over the span, always including both ends when `n >= 2`.
    pub fn evenly_spaced(self, n: u32) -> Vec<FrameIndex> {
        if n == 0 {
            return Vec::new();
        }
        if n >= self.count {
            return (1..=self.count).map(FrameIndex).collect();
        }
        if n == 1 {
            return vec![self.first()];
        }
        let step = f64::from(self.count - 1) / f64::from(n - 1);
        let mut out: Vec<FrameIndex> = (0..n)
            .map(|i| FrameIndex(1 + (f64::from(i) * step).round() as u32))
            .collect();
        out.dedup();
        out
    }
}

/// Pixel dimensions of the viewport / canvas backing store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn to_size(self) -> Size {
        Size::new(f64::from(self.width), f64::from(self.height))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
