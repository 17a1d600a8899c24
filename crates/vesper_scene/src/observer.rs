//! # Destruction Observers
//!
//! Constraints, animators and renderers depend on nodes they do not own.
//! Each dependency registers here and holds a [`Subscription`]; destroying a
//! node drains its subscribers so the scene can prune or disconnect them.
//! Dropping a subscription deregisters it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::ids::{AnimationId, ConstraintId, NodeId, RendererId};

/// Who to notify when a node is destroyed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObserverKey {
    /// A constraint reading or writing the node.
    Constraint(ConstraintId),
    /// An animation with animators targeting the node.
    Animation(AnimationId),
    /// A renderer attached to the node.
    Renderer(RendererId),
}

#[derive(Debug, Default)]
struct Registry {
    next_token: u64,
    observers: HashMap<NodeId, Vec<(u64, ObserverKey)>>,
}

/// Node-destruction observer lists, keyed by observed node.
#[derive(Clone, Debug, Default)]
pub struct ObserverRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl ObserverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `key` to be told when `node` is destroyed.
    #[must_use = "dropping the subscription deregisters it immediately"]
    pub fn subscribe(&self, node: NodeId, key: ObserverKey) -> Subscription {
        let mut registry = self.inner.lock();
        let token = registry.next_token;
        registry.next_token += 1;
        registry.observers.entry(node).or_default().push((token, key));
        Subscription {
            registry: Arc::clone(&self.inner),
            node,
            token,
        }
    }

    /// Removes and returns every observer of `node`, deduplicated, in
    /// registration order.
    pub fn notify_destroyed(&self, node: NodeId) -> Vec<ObserverKey> {
        let entries = self.inner.lock().observers.remove(&node).unwrap_or_default();
        let mut keys: Vec<ObserverKey> = Vec::with_capacity(entries.len());
        for (_, key) in entries {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    /// Number of live subscriptions on `node`.
    #[must_use]
    pub fn observer_count(&self, node: NodeId) -> usize {
        self.inner.lock().observers.get(&node).map_or(0, Vec::len)
    }
}

/// RAII registration handle. Dropping it deregisters the observer.
#[derive(Debug)]
pub struct Subscription {
    registry: Arc<Mutex<Registry>>,
    node: NodeId,
    token: u64,
}

impl Subscription {
    /// The observed node.
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut registry = self.registry.lock();
        if let Some(list) = registry.observers.get_mut(&self.node) {
            list.retain(|(token, _)| *token != self.token);
            if list.is_empty() {
                registry.observers.remove(&self.node);
            }
        }
    }
}
