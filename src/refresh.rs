//! Refresh notifications for status views.
//!
//! An explicit publish/subscribe channel instead of an ambient listener
//! registry: the bus is constructed at startup and handed to whoever needs
//! it. Subscribing returns a guard; dropping the guard unsubscribes.

use std::sync::{Arc, Mutex};

type Listener = Box<dyn Fn() + Send>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Process-wide status refresh channel, scoped to the application lifetime.
#[derive(Clone, Default)]
pub struct StatusBus {
    inner: Arc<Mutex<Registry>>,
}

impl StatusBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. The returned guard unsubscribes on drop.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + 'static,
    {
        let mut registry = self.inner.lock().expect("status bus lock");
        registry.next_id += 1;
        let id = registry.next_id;
        registry.listeners.push((id, Box::new(listener)));
        Subscription {
            id,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Notify every live subscriber.
    pub fn publish(&self) {
        let registry = self.inner.lock().expect("status bus lock");
        for (_, listener) in &registry.listeners {
            listener();
        }
    }
}

pub struct Subscription {
    id: u64,
    inner: Arc<Mutex<Registry>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.inner.lock() {
            registry.listeners.retain(|(id, _)| *id != self.id);
        }
    }
}
