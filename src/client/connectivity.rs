use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Whether the server is believed reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connectivity {
    /// No probe has completed yet.
    Checking,
    Online,
    Offline,
}

type Listener = Box<dyn Fn(Connectivity, Connectivity) + Send + Sync>;

/// Holds the current [`Connectivity`] and tells interested parties when it changes.
///
/// Async code can `subscribe()` to a `watch` channel; synchronous code (a UI
/// badge, a toast) registers an `on_change` callback that receives
/// `(previous, current)`.
pub struct ConnectivityMonitor {
    state: watch::Sender<Connectivity>,
    listeners: Mutex<Vec<Listener>>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityMonitor {
    pub fn new() -> Self {
        let (state, _) = watch::channel(Connectivity::Checking);
        Self {
            state,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn current(&self) -> Connectivity {
        *self.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current() == Connectivity::Online
    }

    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.state.subscribe()
    }

    /// Listeners run on the thread that changes the state and must not
    /// register further listeners.
    pub fn on_change<F>(&self, listener: F)
    where
        F: Fn(Connectivity, Connectivity) + Send + Sync + 'static,
    {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(Box::new(listener));
        }
    }

    /// Records `next` and returns the previous state. Listeners and
    /// subscribers are only notified on an actual change.
    pub fn set(&self, next: Connectivity) -> Connectivity {
        let mut previous = next;
        self.state.send_if_modified(|current| {
            previous = *current;
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });

        if previous != next {
            tracing::info!(?previous, ?next, "connectivity changed");
            if let Ok(listeners) = self.listeners.lock() {
                for listener in listeners.iter() {
                    listener(previous, next);
                }
            }
        }
        previous
    }
}
