//! Input events driving the signal graph

use serde::{Deserialize, Serialize};

/// Pointer, wheel and resize events delivered by the host.
///
/// Pointer `x` is measured in pixels from the left edge of the plot area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    PointerDown {
        x: f64,
    },
    PointerMove {
        x: f64,
    },
    PointerUp {
        x: f64,
    },
    Wheel {
        delta_y: f64,
        /// 0 = pixels, 1 = lines, 2 = pages
        #[serde(default)]
        delta_mode: u32,
    },
    /// The host viewport changed width
    Resize {
        width: f64,
    },
}

/// Event type without payload, used to declare cell triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PointerDown,
    PointerMove,
    PointerUp,
    Wheel,
    Resize,
}

impl InputEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            InputEvent::PointerDown { .. } => EventKind::PointerDown,
            InputEvent::PointerMove { .. } => EventKind::PointerMove,
            InputEvent::PointerUp { .. } => EventKind::PointerUp,
            InputEvent::Wheel { .. } => EventKind::Wheel,
            InputEvent::Resize { .. } => EventKind::Resize,
        }
    }

    /// Pointer position for pointer events
    pub fn pointer_x(&self) -> Option<f64> {
        match self {
            InputEvent::PointerDown { x }
            | InputEvent::PointerMove { x }
            | InputEvent::PointerUp { x } => Some(*x),
            _ => None,
        }
    }
}
