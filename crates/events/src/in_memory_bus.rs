//! In-memory signal bus for tests/dev.

use std::sync::{Mutex, mpsc};

use crate::bus::{EventBus, Subscription};

#[derive(Debug)]
pub enum InMemoryBusError {
    /// Publish failed due to internal lock poisoning.
    Poisoned,
}

type Filter<M> = Box<dyn Fn(&M) -> bool + Send>;

struct Listener<M> {
    tx: mpsc::Sender<M>,
    filter: Option<Filter<M>>,
}

impl<M: Clone> Listener<M> {
    /// Deliver if the filter accepts; `false` once the receiving side is gone.
    fn offer(&self, message: &M) -> bool {
        match &self.filter {
            Some(accepts) if !accepts(message) => true,
            _ => self.tx.send(message.clone()).is_ok(),
        }
    }
}

struct Listeners<M> {
    live: Vec<Listener<M>>,
    published: u64,
}

/// In-memory fan-out of committed-change signals.
///
/// - No IO / no async
/// - Listeners may filter (e.g. one tenant's changes); filtered-out messages
///   are never queued for them
/// - Dropped subscriptions are pruned on the next publish
pub struct InMemoryEventBus<M> {
    listeners: Mutex<Listeners<M>>,
}

impl<M> core::fmt::Debug for InMemoryEventBus<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("listeners", &self.listener_count())
            .field("published", &self.published())
            .finish()
    }
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live listeners as of the last publish.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|l| l.live.len()).unwrap_or(0)
    }

    /// Messages published since creation.
    pub fn published(&self) -> u64 {
        self.listeners.lock().map(|l| l.published).unwrap_or(0)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(Listeners {
                live: Vec::new(),
                published: 0,
            }),
        }
    }
}

impl<M> InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    /// Subscribe to the messages `filter` accepts.
    pub fn subscribe_where<F>(&self, filter: F) -> Subscription<M>
    where
        F: Fn(&M) -> bool + Send + 'static,
    {
        self.attach(Some(Box::new(filter)))
    }

    fn attach(&self, filter: Option<Filter<M>>) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();

        // A poisoned lock still yields a subscription; it just never receives.
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.live.push(Listener { tx, filter });
        }

        Subscription::new(rx)
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut listeners = self.listeners.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        listeners.published += 1;
        listeners.live.retain(|l| l.offer(&message));
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        self.attach(None)
    }
}
