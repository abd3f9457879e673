//! Interaction signals
//!
//! Pointer, wheel and resize events flow through a small dependency graph of
//! named cells that hold the brush endpoints, the zoom anchor and factor, the
//! axis window and the bar width.
//!
//! Pipeline: InputEvent → SignalGraph tick → (brush bounds, axis window, bar width)

pub mod event;
pub mod graph;

pub use event::{EventKind, InputEvent};
pub use graph::{CellDecl, DomainBounds, SignalGraph, SignalName, SignalValues, Tick, Trigger, CELLS};
