//! Topic management
//!
//! A `Topic` holds the subscriptions registered under one topic name, keyed
//! by subscription reference.
//!
//! Concurrency note: callers must synchronize access to `Topic` (the broker
//! keeps every topic behind its registry lock).

use std::collections::HashMap;

use crate::subscription::Subscription;

pub type SubscriberId = String;

#[derive(Debug)]
pub struct Topic<T> {
    pub name: String,
    subscriptions: HashMap<SubscriberId, Subscription<T>>,
}

impl<T> Topic<T> {
    /// Create a new topic with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscriptions: HashMap::new(),
        }
    }

    /// Add a subscription, replacing any entry with the same reference.
    pub fn subscribe(&mut self, subscription: Subscription<T>) {
        self.subscriptions
            .insert(subscription.reference().to_string(), subscription);
    }

    /// Remove and return the subscription registered under `id`.
    pub fn unsubscribe(&mut self, id: &str) -> Option<Subscription<T>> {
        self.subscriptions.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.subscriptions.contains_key(id)
    }

    /// Drop subscriptions whose pipe has already stopped. Returns how many were removed.
    pub fn prune(&mut self) -> usize {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|_, sub| sub.is_active());
        before - self.subscriptions.len()
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = &Subscription<T>> {
        self.subscriptions.values()
    }

    /// Remove every subscription, handing them back to the caller.
    pub fn drain(&mut self) -> Vec<Subscription<T>> {
        self.subscriptions.drain().map(|(_, sub)| sub).collect()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}
