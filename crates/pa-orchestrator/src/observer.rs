//! Change notifications for the UI surface
//!
//! Observers are plain callbacks registered explicitly and invoked
//! synchronously, in registration order, right after the state they
//! describe has changed. The orchestrator never holds its state lock while
//! dispatching, so callbacks may read orchestrator state.

use parking_lot::Mutex;
use std::sync::Arc;

/// Observable change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorEvent {
    /// The status line changed; carries the new display text
    StatusChanged(String),
    /// The conversation log was mutated
    ConversationChanged,
    /// The connected flag flipped
    ConnectedChanged(bool),
    /// The available-servers list was rebuilt
    ServersChanged,
    /// The readiness flag flipped
    ReadyChanged(bool),
    /// A query or stop request finished
    ResponseFinished,
}

/// Handle returned by [`Observers::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&OrchestratorEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    callbacks: Vec<(SubscriptionId, Callback)>,
}

/// Registered observers
#[derive(Default)]
pub struct Observers {
    registry: Mutex<Registry>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&OrchestratorEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry.callbacks.push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback; returns false if it was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.lock();
        let before = registry.callbacks.len();
        registry.callbacks.retain(|(existing, _)| *existing != id);
        registry.callbacks.len() != before
    }

    /// Remove every callback and return how many were registered
    pub fn clear(&self) -> usize {
        let mut registry = self.registry.lock();
        let count = registry.callbacks.len();
        registry.callbacks.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.registry.lock().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatch `events` to every callback registered at call time
    pub fn emit_all(&self, events: &[OrchestratorEvent]) {
        if events.is_empty() {
            return;
        }

        // Callbacks may subscribe/unsubscribe, so dispatch from a copy
        let callbacks: Vec<Callback> = self
            .registry
            .lock()
            .callbacks
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for event in events {
            tracing::trace!("Dispatching {:?} to {} observers", event, callbacks.len());
            for callback in &callbacks {
                callback(event);
            }
        }
    }
}
