//! Live-reload broadcast hub.
//!
//! Watch workers publish a [`ReloadEvent`] after a category finishes
//! compiling; every connected dev-server client holds a subscription.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

/// Signal sent to browsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadEvent {
    /// Watch category whose step completed
    pub category: String,
}

/// Fan-out of reload events to any number of subscribers.
///
/// Cloning shares the same subscriber list.
#[derive(Debug, Clone, Default)]
pub struct ReloadHub {
    subscribers: Arc<Mutex<Vec<Sender<ReloadEvent>>>>,
}

impl ReloadHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> Receiver<ReloadEvent> {
        let (tx, rx) = channel();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        rx
    }

    /// Send an event to every live subscriber, dropping disconnected ones.
    ///
    /// Returns the number of subscribers reached.
    pub fn broadcast(&self, event: ReloadEvent) -> usize {
        let Ok(mut subs) = self.subscribers.lock() else {
            return 0;
        };
        subs.retain(|tx| tx.send(event.clone()).is_ok());
        subs.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}
