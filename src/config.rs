//! Histogram configuration
//!
//! Defaults reproduce the stock activity widget. A
//! configuration can be loaded from (and saved to) JSON; any field left out of
//! the JSON keeps its default.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::HistogramError;

/// 2004-08-09T00:00:00Z, the earliest day the recency axis can show
pub const DEFAULT_RECENCY_FLOOR_MS: f64 = 1_092_009_600_000.0;

/// Horizontal space reserved around the plot (axis labels, padding)
pub const DEFAULT_HORIZONTAL_PADDING: f64 = 90.0;

/// Debounce for brush start updates (milliseconds)
pub const DEFAULT_START_DEBOUNCE_MS: u64 = 10;

/// Debounce for brush end updates (milliseconds)
pub const DEFAULT_END_DEBOUNCE_MS: u64 = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramConfig {
    /// IANA timezone used for calendar-day boundaries
    pub timezone: String,
    /// Lower clamp and initial `xMin` for the recency axis (epoch ms)
    pub recency_floor_ms: f64,
    /// Viewport width minus this is the plot width
    pub horizontal_padding: f64,
    /// Plot height, passed through to renderers
    pub height: f64,
    /// Plot width before the first resize notification
    pub initial_width: f64,
    pub start_debounce_ms: u64,
    pub end_debounce_ms: u64,
    /// Lower bound for recency bar width (pixels)
    pub min_recency_bin_width: f64,
    /// Fixed bar width in experience mode (pixels)
    pub experience_bin_width: f64,
    /// Lower clamp for the experience axis (log2 units)
    pub experience_floor: f64,
    /// Upper clamp for the experience axis when there is no data (log2 units)
    pub experience_default_ceiling: f64,
    /// Smallest domain span a zoom may produce in recency mode (ms)
    pub min_recency_span_ms: f64,
    /// Smallest domain span a zoom may produce in experience mode (log2 units)
    pub min_experience_span: f64,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            recency_floor_ms: DEFAULT_RECENCY_FLOOR_MS,
            horizontal_padding: DEFAULT_HORIZONTAL_PADDING,
            height: 100.0,
            // very wide at mount so nothing gets clipped before the first resize
            initial_width: 1e6,
            start_debounce_ms: DEFAULT_START_DEBOUNCE_MS,
            end_debounce_ms: DEFAULT_END_DEBOUNCE_MS,
            min_recency_bin_width: 2.0,
            experience_bin_width: 40.0,
            experience_floor: 0.0,
            experience_default_ceiling: 16.0,
            min_recency_span_ms: 3_600_000.0,
            min_experience_span: 0.05,
        }
    }
}

impl HistogramConfig {
    /// Load a configuration from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self, HistogramError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to JSON
    pub fn to_json(&self) -> Result<String, HistogramError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parsed timezone
    pub fn tz(&self) -> Result<Tz, HistogramError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| HistogramError::InvalidTimezone(self.timezone.clone()))
    }

    /// Plot width for a given viewport width
    pub fn plot_width(&self, viewport_width: f64) -> f64 {
        if viewport_width.is_finite() {
            (viewport_width - self.horizontal_padding).max(0.0)
        } else {
            0.0
        }
    }

    pub fn validate(&self) -> Result<(), HistogramError> {
        self.tz()?;

        let positive = [
            ("initial_width", self.initial_width),
            ("height", self.height),
            ("min_recency_bin_width", self.min_recency_bin_width),
            ("experience_bin_width", self.experience_bin_width),
            ("min_recency_span_ms", self.min_recency_span_ms),
            ("min_experience_span", self.min_experience_span),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(HistogramError::InvalidConfig(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }

        for (name, value) in [
            ("recency_floor_ms", self.recency_floor_ms),
            ("horizontal_padding", self.horizontal_padding),
            ("experience_floor", self.experience_floor),
            ("experience_default_ceiling", self.experience_default_ceiling),
        ] {
            if !value.is_finite() {
                return Err(HistogramError::InvalidConfig(format!(
                    "{name} must be finite"
                )));
            }
        }

        if self.start_debounce_ms == 0 || self.end_debounce_ms == 0 {
            return Err(HistogramError::InvalidConfig(
                "debounce windows must be at least 1ms".to_string(),
            ));
        }

        if self.experience_floor >= self.experience_default_ceiling {
            return Err(HistogramError::InvalidConfig(format!(
                "experience_floor ({}) must be below experience_default_ceiling ({})",
                self.experience_floor, self.experience_default_ceiling
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        let config = HistogramConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tz().unwrap(), chrono_tz::UTC);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            HistogramConfig::from_json(r#"{"timezone": "Europe/Berlin", "end_debounce_ms": 300}"#)
                .unwrap();
        assert_eq!(config.timezone, "Europe/Berlin");
        assert_eq!(config.end_debounce_ms, 300);
        assert_eq!(config.start_debounce_ms, DEFAULT_START_DEBOUNCE_MS);
        assert_eq!(config.recency_floor_ms, DEFAULT_RECENCY_FLOOR_MS);
    }

    #[test]
    fn test_round_trip() {
        let config = HistogramConfig {
            experience_bin_width: 32.0,
            ..Default::default()
        };
        let loaded = HistogramConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            HistogramConfig::from_json(r#"{"timezone": "Mars/Olympus"}"#),
            Err(HistogramError::InvalidTimezone(_))
        ));
        assert!(matches!(
            HistogramConfig::from_json(r#"{"experience_bin_width": 0}"#),
            Err(HistogramError::InvalidConfig(_))
        ));
        assert!(matches!(
            HistogramConfig::from_json(r#"{"start_debounce_ms": 0}"#),
            Err(HistogramError::InvalidConfig(_))
        ));
        assert!(matches!(
            HistogramConfig::from_json(r#"{"experience_floor": 20}"#),
            Err(HistogramError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_plot_width() {
        let config = HistogramConfig::default();
        assert_eq!(config.plot_width(1090.0), 1000.0);
        assert_eq!(config.plot_width(50.0), 0.0);
        assert_eq!(config.plot_width(f64::NAN), 0.0);
    }
}
