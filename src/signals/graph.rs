//! Reactive signal graph
//!
//! Each named cell declares the events or upstream cells that trigger it. On
//! every input event the cells are visited once, in declaration order; a cell
//! runs when one of its triggers matches the event or names a cell that already
//! fired during this tick. Declaration order is therefore a topological order
//! of the dependency graph and there is no fixed-point iteration.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::config::HistogramConfig;
use crate::mapper::{to_domain, AxisScale};
use crate::signals::event::{EventKind, InputEvent};
use crate::types::{Mode, MS_PER_DAY};

/// Wheel zoom base: each wheel pixel scales the domain span by 1%
const ZOOM_BASE: f64 = 1.01;

/// Named reactive cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalName {
    BrushStart,
    BrushEnd,
    XAnchor,
    Zoom,
    XMin,
    XMax,
    BinWidth,
}

impl SignalName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalName::BrushStart => "brush_start",
            SignalName::BrushEnd => "brush_end",
            SignalName::XAnchor => "xAnchor",
            SignalName::Zoom => "zoom",
            SignalName::XMin => "xMin",
            SignalName::XMax => "xMax",
            SignalName::BinWidth => "binWidth",
        }
    }
}

/// What makes a cell recompute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Any event of this kind
    Event(EventKind),
    /// Pointer movement between a pointer-down and the next pointer-up
    Drag,
    /// An upstream cell fired earlier in the same tick
    Signal(SignalName),
}

/// Declaration of one cell and its triggers
#[derive(Debug, Clone, Copy)]
pub struct CellDecl {
    pub name: SignalName,
    pub triggers: &'static [Trigger],
}

/// Cell table in evaluation order
pub const CELLS: &[CellDecl] = &[
    CellDecl {
        name: SignalName::BrushStart,
        triggers: &[Trigger::Event(EventKind::PointerDown)],
    },
    CellDecl {
        name: SignalName::BrushEnd,
        triggers: &[Trigger::Event(EventKind::PointerDown), Trigger::Drag],
    },
    CellDecl {
        name: SignalName::XAnchor,
        triggers: &[Trigger::Event(EventKind::PointerMove)],
    },
    CellDecl {
        name: SignalName::Zoom,
        triggers: &[Trigger::Event(EventKind::Wheel)],
    },
    CellDecl {
        name: SignalName::XMin,
        triggers: &[Trigger::Signal(SignalName::Zoom)],
    },
    CellDecl {
        name: SignalName::XMax,
        triggers: &[Trigger::Signal(SignalName::Zoom)],
    },
    CellDecl {
        name: SignalName::BinWidth,
        triggers: &[
            Trigger::Signal(SignalName::XMin),
            Trigger::Event(EventKind::Resize),
        ],
    },
];

/// Current value of every cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalValues {
    /// Domain position where the brush began, `None` before the first gesture
    pub brush_start: Option<f64>,
    /// Domain position where the brush ends, `None` before the first gesture
    pub brush_end: Option<f64>,
    /// Domain position under the pointer, fixed point of the next zoom
    pub x_anchor: f64,
    /// Accumulated magnification, above 1 when zoomed in
    pub zoom: f64,
    pub x_min: f64,
    pub x_max: f64,
    /// Bar width in pixels
    pub bin_width: f64,
}

/// Hard limits the axis window can never leave
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomainBounds {
    pub floor: f64,
    pub ceiling: f64,
}

impl DomainBounds {
    pub fn new(floor: f64, ceiling: f64) -> Self {
        Self {
            floor,
            ceiling: ceiling.max(floor),
        }
    }

    /// Earliest representable day up to the moment the widget was mounted
    pub fn recency(config: &HistogramConfig, now_ms: f64) -> Self {
        let floor = config.recency_floor_ms;
        let ceiling = if now_ms.is_finite() {
            now_ms.max(floor + config.min_recency_span_ms)
        } else {
            floor + config.min_recency_span_ms
        };
        Self::new(floor, ceiling)
    }

    /// Configured floor up to one past the largest populated bucket
    pub fn experience(config: &HistogramConfig, extent: Option<(i64, i64)>) -> Self {
        let floor = config.experience_floor;
        let ceiling = match extent {
            Some((_, max_key)) => ((max_key + 1) as f64).max(floor + 1.0),
            None => config.experience_default_ceiling,
        };
        Self::new(floor, ceiling)
    }

    pub fn span(&self) -> f64 {
        self.ceiling - self.floor
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.floor, self.ceiling)
    }
}

/// Cells that fired during one event tick, in evaluation order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tick {
    fired: Vec<SignalName>,
}

impl Tick {
    pub fn fired(&self, name: SignalName) -> bool {
        self.fired.contains(&name)
    }

    pub fn signals(&self) -> &[SignalName] {
        &self.fired
    }

    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
    }
}

/// Brush, pan/zoom and bar width state for one histogram
#[derive(Debug, Clone)]
pub struct SignalGraph {
    mode: Mode,
    values: SignalValues,
    bounds: DomainBounds,
    /// Plot width in pixels
    width: f64,
    dragging: bool,
    /// Set once the pointer moves during a brush gesture
    selection_active: bool,
    /// Domain window captured when the current wheel tick started
    xs: (f64, f64),
    /// Span factor of the current wheel tick
    zoom_step: f64,
    zoomed: bool,
    min_span: f64,
    min_recency_bin_width: f64,
    experience_bin_width: f64,
}

impl SignalGraph {
    pub fn new(mode: Mode, config: &HistogramConfig, bounds: DomainBounds) -> Self {
        let min_span = match mode {
            Mode::Recency => config.min_recency_span_ms,
            Mode::Experience => config.min_experience_span,
        };
        let mut graph = Self {
            mode,
            values: SignalValues {
                brush_start: None,
                brush_end: None,
                x_anchor: bounds.floor + bounds.span() / 2.0,
                zoom: 1.0,
                x_min: bounds.floor,
                x_max: bounds.ceiling,
                bin_width: config.min_recency_bin_width,
            },
            bounds,
            width: config.initial_width,
            dragging: false,
            selection_active: false,
            xs: (bounds.floor, bounds.ceiling),
            zoom_step: 1.0,
            zoomed: false,
            min_span,
            min_recency_bin_width: config.min_recency_bin_width,
            experience_bin_width: config.experience_bin_width,
        };
        graph.values.bin_width = graph.compute_bin_width();
        graph
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn values(&self) -> &SignalValues {
        &self.values
    }

    pub fn bounds(&self) -> DomainBounds {
        self.bounds
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// True once the pointer has moved during the current brush gesture
    pub fn selection_active(&self) -> bool {
        self.selection_active
    }

    /// Current x scale
    pub fn scale(&self) -> AxisScale {
        AxisScale::new(self.values.x_min, self.values.x_max, self.width)
    }

    /// Run one event tick through the graph
    pub fn dispatch(&mut self, event: &InputEvent) -> Tick {
        if let InputEvent::Resize { width } = *event {
            self.width = if width.is_finite() { width.max(0.0) } else { 0.0 };
        }

        let kind = event.kind();
        let dragging = self.dragging;
        let mut tick = Tick::default();

        for cell in CELLS {
            let triggered = cell.triggers.iter().any(|trigger| match trigger {
                Trigger::Event(expected) => *expected == kind,
                Trigger::Drag => dragging && kind == EventKind::PointerMove,
                Trigger::Signal(upstream) => tick.fired(*upstream),
            });
            if triggered && self.evaluate(cell.name, event) {
                tick.fired.push(cell.name);
            }
        }

        match kind {
            EventKind::PointerDown => self.dragging = true,
            EventKind::PointerUp => self.dragging = false,
            _ => {}
        }

        if !tick.is_empty() {
            trace!(?event, fired = ?tick.signals(), "signal tick");
        }
        tick
    }

    /// Replace the hard domain limits, e.g. after the dataset changed.
    ///
    /// An untouched axis snaps to the new limits; a zoomed one is clamped into
    /// them.
    pub fn set_bounds(&mut self, bounds: DomainBounds) {
        self.bounds = bounds;
        if self.zoomed {
            self.values.x_min = self.snap(bounds.clamp(self.values.x_min));
            self.values.x_max = self.snap(bounds.clamp(self.values.x_max));
            let mid = self.values.x_min + (self.values.x_max - self.values.x_min) / 2.0;
            self.enforce_min_span(mid);
        } else {
            self.values.x_min = bounds.floor;
            self.values.x_max = bounds.ceiling;
        }
        self.values.bin_width = self.compute_bin_width();
    }

    fn evaluate(&mut self, name: SignalName, event: &InputEvent) -> bool {
        match name {
            SignalName::BrushStart => {
                let Some(x) = event.pointer_x() else {
                    return false;
                };
                self.values.brush_start = Some(self.map(x));
                self.selection_active = false;
                true
            }
            SignalName::BrushEnd => {
                let Some(x) = event.pointer_x() else {
                    return false;
                };
                self.values.brush_end = Some(self.map(x));
                if event.kind() == EventKind::PointerMove {
                    self.selection_active = true;
                }
                true
            }
            SignalName::XAnchor => {
                let Some(x) = event.pointer_x() else {
                    return false;
                };
                self.values.x_anchor = self.map(x);
                true
            }
            SignalName::Zoom => {
                let InputEvent::Wheel {
                    delta_y,
                    delta_mode,
                } = *event
                else {
                    return false;
                };
                let exponent = delta_y * 16f64.powi(delta_mode.min(8) as i32);
                let step = ZOOM_BASE.powf(exponent);
                if !step.is_finite() || step <= 0.0 {
                    warn!(delta_y, delta_mode, "ignoring wheel event with unusable delta");
                    return false;
                }
                self.xs = (self.values.x_min, self.values.x_max);
                self.zoom_step = step;
                self.values.zoom /= step;
                self.zoomed = true;
                true
            }
            SignalName::XMin => {
                let anchor = self.anchor();
                let candidate = (self.xs.0 - anchor) * self.zoom_step + anchor;
                self.values.x_min = self.snap(self.bounds.clamp(candidate));
                true
            }
            SignalName::XMax => {
                let anchor = self.anchor();
                let candidate = (self.xs.1 - anchor) * self.zoom_step + anchor;
                self.values.x_max = self.snap(self.bounds.clamp(candidate));
                self.enforce_min_span(anchor);
                true
            }
            SignalName::BinWidth => {
                self.values.bin_width = self.compute_bin_width();
                true
            }
        }
    }

    fn map(&self, pixel_x: f64) -> f64 {
        to_domain(pixel_x, &self.scale(), self.mode)
    }

    /// Zoom fixed point, kept inside the window the wheel tick started from
    fn anchor(&self) -> f64 {
        self.values.x_anchor.clamp(self.xs.0, self.xs.1)
    }

    fn snap(&self, value: f64) -> f64 {
        match self.mode {
            Mode::Recency => value.trunc(),
            Mode::Experience => value,
        }
    }

    /// Keep the window at least `min_span` wide, centred on `anchor` when possible
    fn enforce_min_span(&mut self, anchor: f64) {
        let (lo, hi) = (self.values.x_min, self.values.x_max);
        if hi - lo >= self.min_span {
            return;
        }

        let bounds = self.bounds;
        let (lo, hi) = if bounds.span() <= self.min_span {
            (bounds.floor, bounds.ceiling)
        } else {
            let lo = anchor - self.min_span / 2.0;
            let hi = lo + self.min_span;
            if lo < bounds.floor {
                (bounds.floor, bounds.floor + self.min_span)
            } else if hi > bounds.ceiling {
                (bounds.ceiling - self.min_span, bounds.ceiling)
            } else {
                (lo, hi)
            }
        };

        debug!(
            mode = %self.mode,
            requested_span = self.values.x_max - self.values.x_min,
            min_span = self.min_span,
            "clamping degenerate zoom"
        );
        self.values.x_min = self.snap(lo);
        self.values.x_max = self.snap(hi);
    }

    fn compute_bin_width(&self) -> f64 {
        match self.mode {
            Mode::Recency => {
                let span = self.values.x_max - self.values.x_min;
                if span > 0.0 {
                    (self.width * MS_PER_DAY / span).max(self.min_recency_bin_width)
                } else {
                    self.min_recency_bin_width
                }
            }
            Mode::Experience => self.experience_bin_width,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: f64 = MS_PER_DAY;

    /// 100 days over 1000px: every pixel is a tenth of a day
    fn recency_graph() -> SignalGraph {
        let mut graph = SignalGraph::new(
            Mode::Recency,
            &HistogramConfig::default(),
            DomainBounds::new(0.0, 100.0 * DAY),
        );
        graph.dispatch(&InputEvent::Resize { width: 1000.0 });
        graph
    }

    fn experience_graph() -> SignalGraph {
        let config = HistogramConfig::default();
        let mut graph = SignalGraph::new(
            Mode::Experience,
            &config,
            DomainBounds::experience(&config, None),
        );
        graph.dispatch(&InputEvent::Resize { width: 800.0 });
        graph
    }

    fn wheel(delta_y: f64) -> InputEvent {
        InputEvent::Wheel {
            delta_y,
            delta_mode: 0,
        }
    }

    #[test]
    fn test_cells_are_declared_in_topological_order() {
        for (index, cell) in CELLS.iter().enumerate() {
            for trigger in cell.triggers {
                if let Trigger::Signal(upstream) = trigger {
                    let position = CELLS
                        .iter()
                        .position(|c| c.name == *upstream)
                        .expect("upstream cell is declared");
                    assert!(
                        position < index,
                        "{} depends on later cell {}",
                        cell.name.as_str(),
                        upstream.as_str()
                    );
                }
            }
        }
    }

    #[test]
    fn test_brush_undefined_before_gesture() {
        let graph = recency_graph();
        assert_eq!(graph.values().brush_start, None);
        assert_eq!(graph.values().brush_end, None);
        assert!(!graph.selection_active());
    }

    #[test]
    fn test_click_without_drag() {
        let mut graph = recency_graph();
        let tick = graph.dispatch(&InputEvent::PointerDown { x: 100.0 });
        assert_eq!(tick.signals(), &[SignalName::BrushStart, SignalName::BrushEnd]);
        graph.dispatch(&InputEvent::PointerUp { x: 100.0 });

        assert_eq!(graph.values().brush_start, Some(10.0 * DAY));
        assert_eq!(graph.values().brush_start, graph.values().brush_end);
        assert!(!graph.selection_active());
    }

    #[test]
    fn test_drag_updates_brush_end_only_while_down() {
        let mut graph = recency_graph();
        graph.dispatch(&InputEvent::PointerDown { x: 100.0 });
        let tick = graph.dispatch(&InputEvent::PointerMove { x: 300.0 });
        assert!(tick.fired(SignalName::BrushEnd));
        assert!(tick.fired(SignalName::XAnchor));
        assert!(!tick.fired(SignalName::BrushStart));
        graph.dispatch(&InputEvent::PointerUp { x: 300.0 });

        let tick = graph.dispatch(&InputEvent::PointerMove { x: 900.0 });
        assert_eq!(tick.signals(), &[SignalName::XAnchor]);

        assert_eq!(graph.values().brush_start, Some(10.0 * DAY));
        assert_eq!(graph.values().brush_end, Some(30.0 * DAY));
        assert_eq!(graph.values().x_anchor, 90.0 * DAY);
        assert!(graph.selection_active());
    }

    #[test]
    fn test_reversed_brush_is_kept() {
        let mut graph = recency_graph();
        graph.dispatch(&InputEvent::PointerDown { x: 500.0 });
        graph.dispatch(&InputEvent::PointerMove { x: 200.0 });
        let values = graph.values();
        assert!(values.brush_start.unwrap() > values.brush_end.unwrap());
        assert!(graph.selection_active());
    }

    #[test]
    fn test_new_gesture_resets_selection() {
        let mut graph = recency_graph();
        graph.dispatch(&InputEvent::PointerDown { x: 100.0 });
        graph.dispatch(&InputEvent::PointerMove { x: 200.0 });
        graph.dispatch(&InputEvent::PointerUp { x: 200.0 });
        assert!(graph.selection_active());

        graph.dispatch(&InputEvent::PointerDown { x: 600.0 });
        assert!(!graph.selection_active());
        assert_eq!(graph.values().brush_end, Some(60.0 * DAY));
    }

    #[test]
    fn test_pointer_is_clamped_to_plot() {
        let mut graph = recency_graph();
        graph.dispatch(&InputEvent::PointerDown { x: -50.0 });
        graph.dispatch(&InputEvent::PointerMove { x: 5000.0 });
        assert_eq!(graph.values().brush_start, Some(0.0));
        assert_eq!(graph.values().brush_end, Some(100.0 * DAY));
    }

    #[test]
    fn test_zoom_in_narrows_domain_around_anchor() {
        let mut graph = recency_graph();
        graph.dispatch(&InputEvent::PointerMove { x: 250.0 });
        let anchor = graph.values().x_anchor;
        let before = graph.scale();
        let anchor_px = before.apply(anchor);

        let tick = graph.dispatch(&wheel(-100.0));
        assert_eq!(
            tick.signals(),
            &[
                SignalName::Zoom,
                SignalName::XMin,
                SignalName::XMax,
                SignalName::BinWidth
            ]
        );

        let values = *graph.values();
        assert!(values.zoom > 1.0);
        assert!(values.x_max - values.x_min < before.domain_max - before.domain_min);
        assert_eq!(values.x_anchor, anchor);
        assert!(values.x_min < anchor && anchor < values.x_max);
        assert!((graph.scale().apply(anchor) - anchor_px).abs() < 1e-3);
    }

    #[test]
    fn test_zoom_accumulates_across_ticks() {
        let mut graph = recency_graph();
        graph.dispatch(&InputEvent::PointerMove { x: 500.0 });
        graph.dispatch(&wheel(-10.0));
        graph.dispatch(&wheel(-10.0));
        let expected = 1.01f64.powf(20.0);
        assert!((graph.values().zoom - expected).abs() < 1e-9);
    }

    #[test]
    fn test_delta_mode_scales_wheel_units() {
        let mut pixels = recency_graph();
        let mut lines = recency_graph();
        pixels.dispatch(&wheel(-16.0));
        lines.dispatch(&InputEvent::Wheel {
            delta_y: -1.0,
            delta_mode: 1,
        });
        assert!((pixels.values().zoom - lines.values().zoom).abs() < 1e-12);
    }

    #[test]
    fn test_zoom_out_is_clamped_to_bounds() {
        let mut graph = recency_graph();
        graph.dispatch(&InputEvent::PointerMove { x: 500.0 });
        graph.dispatch(&wheel(-100.0));
        graph.dispatch(&wheel(500.0));
        let values = graph.values();
        assert_eq!(values.x_min, 0.0);
        assert_eq!(values.x_max, 100.0 * DAY);
    }

    #[test]
    fn test_degenerate_zoom_keeps_minimum_span() {
        let mut graph = experience_graph();
        graph.dispatch(&InputEvent::PointerMove { x: 400.0 });
        for _ in 0..20 {
            graph.dispatch(&wheel(-1000.0));
        }
        let values = graph.values();
        assert!(values.x_max - values.x_min >= 0.05 - 1e-12);
        assert!(values.x_min <= values.x_max);
        assert!(values.x_min >= 0.0 && values.x_max <= 16.0);
    }

    #[test]
    fn test_unusable_wheel_delta_is_ignored() {
        let mut graph = recency_graph();
        let before = *graph.values();
        let tick = graph.dispatch(&wheel(f64::NAN));
        assert!(tick.is_empty());
        assert_eq!(*graph.values(), before);
    }

    #[test]
    fn test_recency_bin_width_follows_resize() {
        let mut graph = recency_graph();
        // 1000px * one day / 100 days
        assert!((graph.values().bin_width - 10.0).abs() < 1e-9);

        let tick = graph.dispatch(&InputEvent::Resize { width: 3000.0 });
        assert_eq!(tick.signals(), &[SignalName::BinWidth]);
        assert!((graph.values().bin_width - 30.0).abs() < 1e-9);

        graph.dispatch(&InputEvent::Resize { width: 50.0 });
        assert_eq!(graph.values().bin_width, 2.0);
    }

    #[test]
    fn test_recency_bin_width_follows_zoom() {
        let mut graph = recency_graph();
        graph.dispatch(&InputEvent::PointerMove { x: 500.0 });
        graph.dispatch(&wheel(-100.0));
        let values = graph.values();
        let expected = (1000.0 * DAY / (values.x_max - values.x_min)).max(2.0);
        assert!((values.bin_width - expected).abs() < 1e-9);
        assert!(values.bin_width > 10.0);
    }

    #[test]
    fn test_experience_bin_width_is_fixed() {
        let mut graph = experience_graph();
        assert_eq!(graph.values().bin_width, 40.0);
        graph.dispatch(&wheel(-100.0));
        graph.dispatch(&InputEvent::Resize { width: 123.0 });
        assert_eq!(graph.values().bin_width, 40.0);
    }

    #[test]
    fn test_experience_values_stay_continuous() {
        let mut graph = experience_graph();
        // 16 log2 units over 800px
        graph.dispatch(&InputEvent::PointerDown { x: 130.0 });
        assert_eq!(graph.values().brush_start, Some(2.6));
    }

    #[test]
    fn test_set_bounds_snaps_untouched_axis() {
        let config = HistogramConfig::default();
        let mut graph = experience_graph();
        graph.set_bounds(DomainBounds::experience(&config, Some((0, 9))));
        assert_eq!(graph.values().x_min, 0.0);
        assert_eq!(graph.values().x_max, 10.0);
    }

    #[test]
    fn test_set_bounds_clamps_zoomed_axis() {
        let config = HistogramConfig::default();
        let mut graph = experience_graph();
        graph.dispatch(&InputEvent::PointerMove { x: 600.0 });
        graph.dispatch(&wheel(-50.0));
        let zoomed = *graph.values();
        assert!(zoomed.x_max > 4.0);

        graph.set_bounds(DomainBounds::experience(&config, Some((0, 3))));
        let values = graph.values();
        assert!(values.x_max <= 4.0);
        assert!(values.x_max - values.x_min >= 0.05 - 1e-12);
    }

    #[test]
    fn test_recency_bounds() {
        let config = HistogramConfig::default();
        let bounds = DomainBounds::recency(&config, 1_700_000_000_000.0);
        assert_eq!(bounds.floor, config.recency_floor_ms);
        assert_eq!(bounds.ceiling, 1_700_000_000_000.0);

        // a clock behind the floor still yields a usable window
        let skewed = DomainBounds::recency(&config, 0.0);
        assert!(skewed.span() >= config.min_recency_span_ms);
    }
}
