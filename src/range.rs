use crate::frame::Frame;
use crate::MIN_SPAN;

/// Normalisation window for one frame. `high > low` holds for any finite `low`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Range {
    low: f32,
    high: f32,
}

impl Range {
    /// Window used before any finite sample has been seen.
    pub const FALLBACK: Range = Range {
        low: 20.0,
        high: 40.0,
    };

    /// Builds a window, widening `high` so the span is at least [`MIN_SPAN`].
    ///
    /// Past 2^24 adding [`MIN_SPAN`] no longer moves `low`; there `high` is
    /// the next float up instead.
    pub fn new(low: f32, high: f32) -> Self {
        let mut high = if high - low < MIN_SPAN { low + MIN_SPAN } else { high };
        if high <= low {
            high = libm::nextafterf(low, f32::INFINITY);
        }
        Self { low, high }
    }

    pub fn low(&self) -> f32 {
        self.low
    }

    pub fn high(&self) -> f32 {
        self.high
    }

    pub fn span(&self) -> f32 {
        self.high - self.low
    }

    pub fn clamp(&self, value: f32) -> f32 {
        if value < self.low {
            self.low
        } else if value > self.high {
            self.high
        } else {
            value
        }
    }
}

/// Single pass min/max over `frame`.
///
/// Non-finite samples (a dead pixel reading NaN) are skipped; a frame with no
/// finite sample at all gets [`Range::FALLBACK`].
pub fn estimate(frame: &Frame) -> Range {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;

    for t in frame.iter().filter(|t| t.is_finite()) {
        if t < min {
            min = t;
        }
        if t > max {
            max = t;
        }
    }

    if min > max {
        return Range::FALLBACK;
    }
    Range::new(min, max)
}
