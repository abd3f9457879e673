//! Activity histogram - Signal engine for a brushable, zoomable edit histogram
//!
//! The histogram bins edit records by recency (calendar day) or by author
//! experience (power of two), and turns pointer, wheel and resize input into
//! an axis window, bar width and brush selection:
//! records → buckets; events → signal graph → frame; brush → debounced filter.
//!
//! ## Modules
//!
//! - **Binning**: records → sorted buckets for the active mode
//! - **Signals**: reactive graph of brush, zoom and axis cells
//! - **Emitter**: debounced brush → external filter updates
//! - **Histogram**: one widget instance tying the stages together

pub mod binning;
pub mod config;
pub mod debounce;
pub mod emitter;
pub mod error;
pub mod histogram;
pub mod mapper;
pub mod resize;
pub mod signals;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use binning::{aggregate, aggregate_with_report, BinReport};
pub use config::HistogramConfig;
pub use emitter::FilterSink;
pub use error::HistogramError;
pub use histogram::Histogram;
pub use mapper::AxisScale;
pub use resize::{ResizeHub, ResizeSubscription};
pub use signals::{InputEvent, SignalGraph, SignalName};
pub use types::{Bucket, FilterRange, FilterUpdate, Frame, Mode, Record};

/// Library version
pub const HISTOGRAM_VERSION: &str = env!("CARGO_PKG_VERSION");
