//! Viewport resize subscriptions
//!
//! Several widgets on one page share a single host resize source. Each one
//! subscribes a callback and gets a handle it can later use to unsubscribe;
//! subscribing never replaces a callback that is already installed.

use tracing::trace;

/// Handle returned by [`ResizeHub::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResizeSubscription(u64);

type ResizeCallback = Box<dyn FnMut(f64)>;

/// Fans a host viewport width out to every subscriber
#[derive(Default)]
pub struct ResizeHub {
    next_id: u64,
    subscribers: Vec<(ResizeSubscription, ResizeCallback)>,
    last_width: Option<f64>,
}

impl ResizeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback; it runs after every callback registered before it
    pub fn subscribe<F>(&mut self, callback: F) -> ResizeSubscription
    where
        F: FnMut(f64) + 'static,
    {
        let id = ResizeSubscription(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(callback)));
        trace!(subscription = id.0, total = self.subscribers.len(), "resize subscribed");
        id
    }

    /// Remove a callback, returning whether it was still registered
    pub fn unsubscribe(&mut self, subscription: ResizeSubscription) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(id, _)| *id != subscription);
        let removed = self.subscribers.len() != before;
        trace!(subscription = subscription.0, removed, "resize unsubscribed");
        removed
    }

    /// Deliver a new viewport width to every subscriber
    pub fn notify(&mut self, width: f64) {
        self.last_width = Some(width);
        for (_, callback) in self.subscribers.iter_mut() {
            callback(width);
        }
    }

    /// Most recently delivered width
    pub fn last_width(&self) -> Option<f64> {
        self.last_width
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
