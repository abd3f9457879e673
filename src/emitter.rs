//! Filter emission
//!
//! Watches the brush endpoints and pushes the selected range to the external
//! filter state. Brush start changes once per gesture and is debounced
//! briefly; brush end changes on every drag movement and is debounced longer
//! so a drag does not flood the filter state. The two debouncers never cancel
//! each other.

use std::time::Instant;
use tracing::debug;

use crate::config::HistogramConfig;
use crate::debounce::Debouncer;
use crate::signals::{SignalGraph, SignalName, Tick};
use crate::types::{FilterRange, FilterUpdate, Mode};

/// Receiver of filter updates (the external filter state)
pub trait FilterSink {
    /// Time range in epoch seconds, `None` clears the filter
    fn set_time_filter(&mut self, range: Option<FilterRange>);

    /// Experience range in edit counts, `None` clears the filter
    fn set_experience_filter(&mut self, range: Option<FilterRange>);
}

/// Records every update, in order
impl FilterSink for Vec<FilterUpdate> {
    fn set_time_filter(&mut self, range: Option<FilterRange>) {
        self.push(FilterUpdate::Time(range));
    }

    fn set_experience_filter(&mut self, range: Option<FilterRange>) {
        self.push(FilterUpdate::Experience(range));
    }
}

/// Brush end as observed when it was scheduled
#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingEnd {
    value: f64,
    selection_active: bool,
}

/// Compute the filter update for a brush in the given mode.
///
/// A brush without drag movement, or with identical endpoints, clears the
/// filter. Otherwise recency ranges are converted to seconds and experience
/// ranges are widened to whole power-of-two buckets.
pub fn filter_update(mode: Mode, start: f64, end: f64, selection_active: bool) -> FilterUpdate {
    let lo = start.min(end);
    let hi = start.max(end);
    let empty = !selection_active || start == end || !lo.is_finite() || !hi.is_finite();

    match mode {
        Mode::Recency => FilterUpdate::Time((!empty).then(|| [lo / 1000.0, hi / 1000.0])),
        Mode::Experience => FilterUpdate::Experience(
            (!empty).then(|| [2f64.powf(lo.floor()), 2f64.powf(hi.ceil())]),
        ),
    }
}

#[derive(Debug, Clone)]
pub struct FilterEmitter {
    mode: Mode,
    start: Debouncer<f64>,
    end: Debouncer<PendingEnd>,
    committed_start: Option<f64>,
}

impl FilterEmitter {
    pub fn new(mode: Mode, config: &HistogramConfig) -> Self {
        Self {
            mode,
            start: Debouncer::from_millis(config.start_debounce_ms),
            end: Debouncer::from_millis(config.end_debounce_ms),
            committed_start: None,
        }
    }

    /// Schedule emissions for brush cells that fired during a tick
    pub fn observe(&mut self, tick: &Tick, graph: &SignalGraph, now: Instant) {
        let values = graph.values();
        if tick.fired(SignalName::BrushStart) {
            if let Some(start) = values.brush_start {
                self.start.schedule(now, start);
            }
        }
        if tick.fired(SignalName::BrushEnd) {
            if let Some(end) = values.brush_end {
                self.end.schedule(
                    now,
                    PendingEnd {
                        value: end,
                        selection_active: graph.selection_active(),
                    },
                );
            }
        }
    }

    /// Fire any debounce whose quiet window has elapsed.
    ///
    /// Returns the update pushed to `sink`, if one was.
    pub fn poll<S>(&mut self, now: Instant, sink: &mut S) -> Option<FilterUpdate>
    where
        S: FilterSink + ?Sized,
    {
        if let Some(start) = self.start.poll(now) {
            self.committed_start = Some(start);
        }

        let pending = self.end.poll(now)?;
        // the end of a gesture always pairs with the start of that gesture
        if let Some(start) = self.start.flush() {
            self.committed_start = Some(start);
        }
        let start = self.committed_start?;

        let update = filter_update(self.mode, start, pending.value, pending.selection_active);
        match update {
            FilterUpdate::Time(range) => sink.set_time_filter(range),
            FilterUpdate::Experience(range) => sink.set_experience_filter(range),
        }
        debug!(mode = %self.mode, ?update, "filter updated");
        Some(update)
    }

    /// Earliest moment a pending debounce can fire
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.start.deadline(), self.end.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.start.is_pending() || self.end.is_pending()
    }
}
