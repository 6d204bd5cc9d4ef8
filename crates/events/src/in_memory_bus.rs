//! Process-local bus backed by `std::sync::mpsc` channels.

use std::convert::Infallible;
use std::sync::mpsc;

use parking_lot::Mutex;

use crate::bus::{EventBus, Subscription};

/// Broadcasts each message to every live subscription.
///
/// Subscriptions whose receiver was dropped are forgotten on the next publish.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    listeners: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Clone + Send + 'static> EventBus<M> for InMemoryEventBus<M> {
    type Error = Infallible;

    fn publish(&self, message: M) -> Result<(), Infallible> {
        self.listeners
            .lock()
            .retain(|listener| listener.send(message.clone()).is_ok());
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        self.listeners.lock().push(tx);
        Subscription::new(rx)
    }
}
