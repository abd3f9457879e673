//! Pixel to domain coordinate mapping
//!
//! The x axis is linear over `[domain_min, domain_max]` onto `[0, width]`
//! pixels. Recency domains are epoch milliseconds, experience domains are
//! continuous log2 units.

use serde::{Deserialize, Serialize};

use crate::types::Mode;

/// Linear horizontal scale state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisScale {
    pub domain_min: f64,
    pub domain_max: f64,
    /// Plot width in pixels
    pub width: f64,
}

impl AxisScale {
    pub fn new(domain_min: f64, domain_max: f64, width: f64) -> Self {
        Self {
            domain_min,
            domain_max,
            width,
        }
    }

    fn is_degenerate(&self) -> bool {
        !(self.width > 0.0)
            || !self.domain_min.is_finite()
            || !self.domain_max.is_finite()
            || self.domain_min == self.domain_max
    }

    /// Map a domain value to a pixel offset
    pub fn apply(&self, value: f64) -> f64 {
        if self.is_degenerate() {
            return 0.0;
        }
        (value - self.domain_min) / (self.domain_max - self.domain_min) * self.width
    }

    /// Map a pixel offset back to the domain, clamping it to the plot first
    pub fn invert(&self, pixel_x: f64) -> f64 {
        if self.is_degenerate() {
            return self.domain_min;
        }
        let px = if pixel_x.is_nan() {
            0.0
        } else {
            pixel_x.clamp(0.0, self.width)
        };
        self.domain_min + px / self.width * (self.domain_max - self.domain_min)
    }
}

/// Convert a pointer position to a domain value under the current scale.
///
/// Recency values are truncated to whole milliseconds; experience values stay
/// continuous and are discretized by consumers.
pub fn to_domain(pixel_x: f64, scale: &AxisScale, mode: Mode) -> f64 {
    let value = scale.invert(pixel_x);
    match mode {
        Mode::Recency => value.trunc(),
        Mode::Experience => value,
    }
}
