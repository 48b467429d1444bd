//! "Repository changed" fan-out.
//!
//! An ordered observer list: every emit walks the subscribers in the order
//! they registered and pushes the signal onto each one's unbounded queue, so
//! a slow subscriber never loses a signal and never delays the others.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// The only signal the monitor emits. Subscribers re-fetch full state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepositoryChanged;

/// Receiving end of a bus registration.
///
/// Yields `None` once the session that produced it has been torn down.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<RepositoryChanged>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<RepositoryChanged> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<RepositoryChanged, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }
}

#[derive(Debug, Default)]
struct BusState {
    subscribers: Vec<mpsc::UnboundedSender<RepositoryChanged>>,
    closed: bool,
}

/// Single-producer, multi-consumer signal channel for one watch session.
#[derive(Debug, Clone, Default)]
pub struct NotificationBus {
    state: Arc<Mutex<BusState>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a subscriber at the end of the list.
    ///
    /// On a detached bus the subscription is already finished.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state();
        if !state.closed {
            state.subscribers.push(tx);
        }
        Subscription { rx }
    }

    /// Deliver one signal to every live subscriber, in registration order.
    ///
    /// Subscribers whose receiver was dropped are pruned. Returns how many
    /// subscribers got the signal.
    pub fn emit(&self) -> usize {
        let mut state = self.state();
        state
            .subscribers
            .retain(|subscriber| subscriber.send(RepositoryChanged).is_ok());
        state.subscribers.len()
    }

    /// Drop every subscriber and refuse new ones.
    pub fn detach_all(&self) {
        let mut state = self.state();
        state.closed = true;
        state.subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.state().subscribers.len()
    }

    pub fn is_detached(&self) -> bool {
        self.state().closed
    }
}
