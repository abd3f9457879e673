//! Core types for the activity histogram
//!
//! This module defines the data that flows through the engine: input records,
//! the histogram mode, derived buckets, the external filter updates and the
//! per-tick frame handed to a rendering layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::HistogramError;
use crate::mapper::AxisScale;

/// Milliseconds in one calendar day
pub const MS_PER_DAY: f64 = 86_400_000.0;

/// Which axis field and binning policy the histogram uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Calendar-day buckets over record timestamps
    Recency,
    /// Power-of-two buckets over user experience
    Experience,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Recency => "recency",
            Mode::Experience => "experience",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = HistogramError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recency" => Ok(Mode::Recency),
            "experience" => Ok(Mode::Experience),
            other => Err(HistogramError::UnknownMode(other.to_string())),
        }
    }
}

fn missing() -> f64 {
    f64::NAN
}

/// One observed edit event
///
/// Fields stay raw `f64` so malformed upstream data can be detected and skipped
/// at ingestion rather than rejected while parsing the whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Event time (epoch milliseconds)
    #[serde(default = "missing")]
    pub timestamp: f64,
    /// Number of prior edits by the author
    #[serde(default = "missing")]
    pub experience: f64,
}

impl Record {
    pub fn new(timestamp: f64, experience: f64) -> Self {
        Self {
            timestamp,
            experience,
        }
    }

    /// Build a record from map feature properties.
    ///
    /// Feature properties carry `_timestamp` in epoch seconds and
    /// `_userExperience` as a plain count. Missing or non-numeric fields become
    /// NaN and are dropped later by the aggregator.
    pub fn from_feature_properties(properties: &serde_json::Value) -> Self {
        let timestamp = properties
            .get("_timestamp")
            .and_then(|v| v.as_f64())
            .map(|secs| secs * 1000.0)
            .unwrap_or(f64::NAN);
        let experience = properties
            .get("_userExperience")
            .and_then(|v| v.as_f64())
            .unwrap_or(f64::NAN);
        Self {
            timestamp,
            experience,
        }
    }
}

/// Aggregated count of records sharing a derived key
///
/// For [`Mode::Recency`] the key is the local-midnight timestamp in epoch
/// milliseconds; for [`Mode::Experience`] it is `floor(log2(experience))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bucket {
    pub key: i64,
    pub count: u32,
}

/// Inclusive `[lower, upper]` filter boundary in external units
pub type FilterRange = [f64; 2];

/// Update pushed to the external filter state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "filter", content = "range", rename_all = "snake_case")]
pub enum FilterUpdate {
    /// Time filter in epoch seconds, `None` clears it
    Time(Option<FilterRange>),
    /// Experience filter in edit counts, `None` clears it
    Experience(Option<FilterRange>),
}

impl FilterUpdate {
    pub fn range(&self) -> Option<FilterRange> {
        match self {
            FilterUpdate::Time(range) | FilterUpdate::Experience(range) => *range,
        }
    }
}

/// Everything a rendering layer needs to draw one tick
#[derive(Debug, Clone, Serialize)]
pub struct Frame<'a> {
    pub mode: Mode,
    /// Domain position where the current brush began, `None` before any gesture
    pub brush_start: Option<f64>,
    /// Domain position where the current brush ends, `None` before any gesture
    pub brush_end: Option<f64>,
    /// True once the pointer has moved during the current brush gesture
    pub selection_active: bool,
    pub x_min: f64,
    pub x_max: f64,
    pub bin_width: f64,
    /// Plot width in pixels
    pub width: f64,
    /// Plot height in pixels
    pub height: f64,
    pub buckets: &'a [Bucket],
}

impl Frame<'_> {
    /// Current x scale
    pub fn scale(&self) -> AxisScale {
        AxisScale::new(self.x_min, self.x_max, self.width)
    }

    /// Ordered selection range, or `None` when nothing is selected.
    ///
    /// A reversed brush is still a selection; it is reported low-to-high.
    pub fn selection(&self) -> Option<(f64, f64)> {
        match (self.brush_start, self.brush_end) {
            (Some(start), Some(end)) if self.selection_active && start != end => {
                Some((start.min(end), start.max(end)))
            }
            _ => None,
        }
    }

    /// Pixel extent of the brush rectangle, `None` when nothing is selected
    pub fn brush_pixels(&self) -> Option<(f64, f64)> {
        let (lo, hi) = self.selection()?;
        let scale = self.scale();
        Some((scale.apply(lo), scale.apply(hi)))
    }
}
