//! Explicit event bus for server-side components.
//!
//! Components receive an [`EventPublisher`] at construction and publish
//! [`GameEvent`]s through it. Publishing only enqueues; subscribers run when
//! the owner of the bus calls [`EventBus::dispatch`], once per operation, in
//! publish order and then subscription order. Nothing is global: dropping the
//! bus (or calling [`EventBus::shutdown`]) tears every subscription down.

use shared::{EventKind, GameEvent};
use tokio::sync::mpsc;

/// Cheap, cloneable handle for publishing events onto a bus.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: mpsc::UnboundedSender<GameEvent>,
}

impl EventPublisher {
    /// Enqueues an event. Events published after the bus is gone are dropped.
    pub fn publish(&self, event: GameEvent) {
        let _ = self.tx.send(event);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&GameEvent) + Send>;

struct Subscription {
    id: SubscriptionId,
    filter: Option<EventKind>,
    handler: Handler,
}

pub struct EventBus {
    tx: mpsc::UnboundedSender<GameEvent>,
    rx: mpsc::UnboundedReceiver<GameEvent>,
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx,
            subscriptions: Vec::new(),
            next_id: 1,
        }
    }

    pub fn publisher(&self) -> EventPublisher {
        EventPublisher {
            tx: self.tx.clone(),
        }
    }

    /// Subscribes to every event kind.
    pub fn subscribe_all<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&GameEvent) + Send + 'static,
    {
        self.insert(None, Box::new(handler))
    }

    /// Subscribes to a single event kind.
    pub fn subscribe<F>(&mut self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: FnMut(&GameEvent) + Send + 'static,
    {
        self.insert(Some(kind), Box::new(handler))
    }

    fn insert(&mut self, filter: Option<EventKind>, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription {
            id,
            filter,
            handler,
        });
        id
    }

    /// Returns true if the subscription existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Delivers every queued event to the matching subscribers and returns
    /// the delivered events in publish order.
    pub fn dispatch(&mut self) -> Vec<GameEvent> {
        let mut delivered = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            let kind = event.kind();
            for subscription in &mut self.subscriptions {
                if subscription.filter.map_or(true, |f| f == kind) {
                    (subscription.handler)(&event);
                }
            }
            delivered.push(event);
        }
        delivered
    }

    /// Drops all subscribers and discards undelivered events.
    pub fn shutdown(&mut self) {
        self.subscriptions.clear();
        while self.rx.try_recv().is_ok() {}
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
