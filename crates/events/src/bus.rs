//! Fan-out of committed messages to in-process listeners.
//!
//! Nothing here persists: a listener that subscribes late misses what was sent
//! before, and a message may reach a listener twice if a publisher retries.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// Receiving end handed out by [`EventBus::subscribe`].
///
/// Each subscription gets its own copy of every message published after it was
/// created. Read it from one thread.
#[derive(Debug)]
pub struct Subscription<M>(Receiver<M>);

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self(receiver)
    }

    pub fn recv(&self) -> Result<M, RecvError> {
        self.0.recv()
    }

    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.0.try_recv()
    }

    pub fn recv_timeout(&self, wait: Duration) -> Result<M, RecvTimeoutError> {
        self.0.recv_timeout(wait)
    }

    /// Whatever is already queued; never blocks.
    pub fn drain(&self) -> Vec<M> {
        self.0.try_iter().collect()
    }
}

/// Publish/subscribe seam between the depot services and their listeners.
///
/// A failed `publish` never undoes the state change that produced the message;
/// callers log it and move on.
pub trait EventBus<M>: Send + Sync {
    type Error: std::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B: EventBus<M> + ?Sized> EventBus<M> for Arc<B> {
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), B::Error> {
        B::publish(self, message)
    }

    fn subscribe(&self) -> Subscription<M> {
        B::subscribe(self)
    }
}
