//! Histogram widget engine
//!
//! This module provides the public API for the activity histogram. It ties the
//! stages together:
//!
//! 1. Binning - records + mode → buckets (re-run on every dataset change)
//! 2. SignalGraph - pointer/wheel/resize events → brush, axis window, bar width
//! 3. FilterEmitter - debounced brush changes → external filter updates
//!
//! The host renders from [`Histogram::frame`] after each event.

use chrono::Utc;
use chrono_tz::Tz;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;
use tracing::{debug, debug_span, warn};
use uuid::Uuid;

use crate::binning::{aggregate_with_report, bucket_extent};
use crate::config::HistogramConfig;
use crate::emitter::{FilterEmitter, FilterSink};
use crate::error::HistogramError;
use crate::resize::{ResizeHub, ResizeSubscription};
use crate::signals::{DomainBounds, InputEvent, SignalGraph, Tick};
use crate::types::{Bucket, FilterUpdate, Frame, Mode, Record};

/// Stateful histogram engine for one widget instance
#[derive(Debug)]
pub struct Histogram {
    instance_id: Uuid,
    mode: Mode,
    config: HistogramConfig,
    tz: Tz,
    /// Mount time; the recency axis never extends past it
    now_ms: f64,
    records: Vec<Record>,
    buckets: Vec<Bucket>,
    dropped: usize,
    graph: SignalGraph,
    emitter: FilterEmitter,
}

impl Histogram {
    /// Create a histogram mounted at `now_ms` (epoch milliseconds)
    pub fn new(mode: Mode, config: HistogramConfig, now_ms: f64) -> Result<Self, HistogramError> {
        config.validate()?;
        let tz = config.tz()?;
        let graph = Self::build_graph(mode, &config, now_ms, None);
        let emitter = FilterEmitter::new(mode, &config);
        let instance_id = Uuid::new_v4();
        debug!(%instance_id, %mode, "histogram mounted");

        Ok(Self {
            instance_id,
            mode,
            config,
            tz,
            now_ms,
            records: Vec::new(),
            buckets: Vec::new(),
            dropped: 0,
            graph,
            emitter,
        })
    }

    /// Create a histogram mounted at the current wall-clock time
    pub fn with_current_time(mode: Mode, config: HistogramConfig) -> Result<Self, HistogramError> {
        Self::new(mode, config, Utc::now().timestamp_millis() as f64)
    }

    fn build_graph(
        mode: Mode,
        config: &HistogramConfig,
        now_ms: f64,
        extent: Option<(i64, i64)>,
    ) -> SignalGraph {
        let bounds = match mode {
            Mode::Recency => DomainBounds::recency(config, now_ms),
            Mode::Experience => DomainBounds::experience(config, extent),
        };
        SignalGraph::new(mode, config, bounds)
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn config(&self) -> &HistogramConfig {
        &self.config
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// Records skipped by the last re-binning
    pub fn dropped_records(&self) -> usize {
        self.dropped
    }

    pub fn graph(&self) -> &SignalGraph {
        &self.graph
    }

    /// Replace the dataset and re-bin it
    pub fn set_records(&mut self, records: Vec<Record>) {
        let _span = debug_span!("histogram", id = %self.instance_id).entered();
        self.records = records;
        self.rebin();
    }

    /// Switch mode. This reinitializes the axis, brush and pending emissions.
    pub fn set_mode(&mut self, mode: Mode) {
        if mode == self.mode {
            return;
        }
        let _span = debug_span!("histogram", id = %self.instance_id).entered();
        let width = self.graph.width();
        self.mode = mode;
        self.graph = Self::build_graph(mode, &self.config, self.now_ms, None);
        self.graph.dispatch(&InputEvent::Resize { width });
        self.emitter = FilterEmitter::new(mode, &self.config);
        self.rebin();
        debug!(%mode, "histogram reinitialized");
    }

    fn rebin(&mut self) {
        let report = aggregate_with_report(&self.records, self.mode, &self.tz);
        self.buckets = report.buckets;
        self.dropped = report.dropped;

        if self.mode == Mode::Experience {
            let bounds = DomainBounds::experience(&self.config, bucket_extent(&self.buckets));
            self.graph.set_bounds(bounds);
        }

        debug!(
            mode = %self.mode,
            records = self.records.len(),
            buckets = self.buckets.len(),
            dropped = self.dropped,
            "re-binned records"
        );
    }

    /// Feed one host event through the signal graph.
    ///
    /// `Resize` carries the host viewport width; the plot width is derived
    /// from it.
    pub fn handle(&mut self, event: &InputEvent, now: Instant) -> Tick {
        let _span = debug_span!("histogram", id = %self.instance_id).entered();
        let event = match *event {
            InputEvent::Resize { width } => InputEvent::Resize {
                width: self.config.plot_width(width),
            },
            other => other,
        };
        let tick = self.graph.dispatch(&event);
        self.emitter.observe(&tick, &self.graph, now);
        tick
    }

    /// Apply a new host viewport width
    pub fn resize(&mut self, viewport_width: f64) -> Tick {
        let _span = debug_span!("histogram", id = %self.instance_id).entered();
        self.graph.dispatch(&InputEvent::Resize {
            width: self.config.plot_width(viewport_width),
        })
    }

    /// Fire due debounced filter updates into `sink`
    pub fn poll<S>(&mut self, now: Instant, sink: &mut S) -> Option<FilterUpdate>
    where
        S: FilterSink + ?Sized,
    {
        let _span = debug_span!("histogram", id = %self.instance_id).entered();
        self.emitter.poll(now, sink)
    }

    /// Earliest moment [`Histogram::poll`] can produce an update
    pub fn next_deadline(&self) -> Option<Instant> {
        self.emitter.next_deadline()
    }

    /// Current render state
    pub fn frame(&self) -> Frame<'_> {
        let values = self.graph.values();
        Frame {
            mode: self.mode,
            brush_start: values.brush_start,
            brush_end: values.brush_end,
            selection_active: self.graph.selection_active(),
            x_min: values.x_min,
            x_max: values.x_max,
            bin_width: values.bin_width,
            width: self.graph.width(),
            height: self.config.height,
            buckets: &self.buckets,
        }
    }

    /// Subscribe a shared histogram to viewport resizes.
    ///
    /// The width the hub last delivered is applied right away. The hub only
    /// holds a weak reference, so dropping the widget does not disturb the
    /// other subscribers.
    pub fn attach(histogram: &Rc<RefCell<Histogram>>, hub: &mut ResizeHub) -> ResizeSubscription {
        if let Some(width) = hub.last_width() {
            match histogram.try_borrow_mut() {
                Ok(mut histogram) => {
                    histogram.resize(width);
                }
                Err(_) => warn!(width, "histogram busy, initial width skipped"),
            };
        }
        let weak = Rc::downgrade(histogram);
        hub.subscribe(move |width| {
            let Some(histogram) = weak.upgrade() else {
                return;
            };
            match histogram.try_borrow_mut() {
                Ok(mut histogram) => {
                    histogram.resize(width);
                }
                Err(_) => warn!(width, "histogram busy, resize skipped"),
            };
        })
    }
}
