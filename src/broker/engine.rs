//! Broker engine
//!
//! This module contains the in-process broker responsible for:
//! - managing the topic registry (topic name -> subscriptions)
//! - fanning published payloads out to every active subscription
//! - stopping and removing subscriptions on unsubscribe or topic close
//!
//! Concurrency and usage notes:
//! - `Broker` is a cheap, cloneable handle; all clones share one registry.
//! - The registry lock is held only while the map is read or mutated, never
//!   while subscriber callbacks run and never while a payload is delivered.
//! - `publish` only enqueues onto each subscription's pipe and returns.
//! - Subscriptions that stopped on their own (unresponsive consumer) are
//!   pruned the next time their topic is touched by publish, subscribe or
//!   unsubscribe; `subscriber_count` never counts them.
//! - Dropping the last broker handle stops every remaining subscription.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::broker::command::Command;
use crate::broker::topic::Topic;
use crate::config::BrokerSettings;
use crate::subscription::Subscription;
use crate::utils::BrokerError;

struct Registry<T> {
    topics: Mutex<HashMap<String, Topic<T>>>,
}

impl<T> Registry<T> {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Topic<T>>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unsubscribe(&self, reference: &str, topic: &str) -> Result<(), BrokerError> {
        let not_found = || BrokerError::NotFound {
            topic: topic.to_string(),
            reference: reference.to_string(),
        };

        let removed = {
            let mut topics = self.lock();
            let entry = topics.get_mut(topic).ok_or_else(not_found)?;
            // a self-stopped entry counts as already removed, pruned or not
            entry.prune();
            let removed = entry.unsubscribe(reference);
            if entry.is_empty() {
                topics.remove(topic);
            }
            removed.ok_or_else(not_found)?
        };

        removed.stop();
        debug!(topic, reference, "unsubscribed");
        Ok(())
    }
}

impl<T> Drop for Registry<T> {
    fn drop(&mut self) {
        let topics = self.topics.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, mut topic) in topics.drain() {
            for sub in topic.drain() {
                sub.stop();
            }
        }
    }
}

/// In-process publish/subscribe broker.
pub struct Broker<T> {
    registry: Arc<Registry<T>>,
    settings: BrokerSettings,
}

impl<T> Clone for Broker<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            settings: self.settings.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Broker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Broker<T> {
    pub fn new() -> Self {
        Self::with_settings(BrokerSettings::default())
    }

    pub fn with_settings(settings: BrokerSettings) -> Self {
        Self {
            registry: Arc::new(Registry {
                topics: Mutex::new(HashMap::new()),
            }),
            settings,
        }
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    /// Subscribes `command` to its topic, creating the topic if needed.
    ///
    /// Must be called from within a Tokio runtime. Fails with `InvalidTopic`
    /// on an empty topic name and with `AlreadyActive` when `command.reference`
    /// names a subscription that is still active on the same topic.
    pub fn subscribe(&self, command: Command<T>) -> Result<SubscriptionHandle<T>, BrokerError> {
        if command.topic.is_empty() {
            return Err(BrokerError::InvalidTopic);
        }

        let topic = command.topic.clone();
        let reference = command
            .reference
            .clone()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        {
            let mut topics = self.registry.lock();
            if let Some(existing) = topics.get_mut(&topic) {
                existing.prune();
                if existing.contains(&reference) {
                    return Err(BrokerError::AlreadyActive { reference });
                }
            }

            let subscription = Subscription::start(
                reference.clone(),
                command,
                self.settings.delivery_timeout(),
            )?;
            topics
                .entry(topic.clone())
                .or_insert_with(|| Topic::new(&topic))
                .subscribe(subscription);
        }

        debug!(topic = %topic, reference = %reference, "subscribed");
        Ok(SubscriptionHandle {
            registry: Arc::downgrade(&self.registry),
            topic,
            reference,
        })
    }

    /// Fans `payload` out to every active subscription on `topic`.
    ///
    /// Fire-and-forget: returns once the payload is enqueued on each pipe.
    /// Publishing to a topic without subscribers is a no-op; nothing is
    /// buffered for later subscribers.
    pub fn publish(&self, payload: T, topic: &str) {
        let targets: Vec<Subscription<T>> = {
            let mut topics = self.registry.lock();
            let Some(entry) = topics.get_mut(topic) else {
                trace!(topic, "publish to topic without subscribers");
                return;
            };

            let pruned = entry.prune();
            if pruned > 0 {
                debug!(topic, pruned, "removed stopped subscriptions");
            }
            if entry.is_empty() {
                topics.remove(topic);
                return;
            }
            entry.subscriptions().cloned().collect()
        };

        for sub in targets {
            sub.send(payload.clone());
        }
    }

    /// Stops and removes the subscription `reference` on `topic`.
    ///
    /// Fails with `NotFound` when no active subscription matches; one that
    /// stopped on its own is dropped from the registry as part of the lookup.
    pub fn unsubscribe(&self, reference: &str, topic: &str) -> Result<(), BrokerError> {
        self.registry.unsubscribe(reference, topic)
    }

    /// Stops and removes every subscription on `topic`.
    ///
    /// Closing a topic with no subscriptions succeeds.
    pub fn close_topic(&self, topic: &str) -> Result<(), BrokerError> {
        let removed = self.registry.lock().remove(topic);

        if let Some(mut entry) = removed {
            let subs = entry.drain();
            info!(topic, subscriptions = subs.len(), "closing topic");
            for sub in subs {
                sub.stop();
            }
        }
        Ok(())
    }

    /// Closes every topic.
    pub fn close_all(&self) {
        let topics: Vec<Topic<T>> = self.registry.lock().drain().map(|(_, t)| t).collect();

        for mut topic in topics {
            for sub in topic.drain() {
                sub.stop();
            }
        }
    }

    /// Names of the topics that currently have subscriptions, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of active subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.registry
            .lock()
            .get(topic)
            .map(|t| t.subscriptions().filter(|s| s.is_active()).count())
            .unwrap_or(0)
    }
}

/// Returned by [`Broker::subscribe`]; identifies the subscription and can cancel it.
///
/// Dropping the handle does not cancel the subscription.
pub struct SubscriptionHandle<T> {
    registry: Weak<Registry<T>>,
    topic: String,
    reference: String,
}

impl<T> Clone for SubscriptionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Weak::clone(&self.registry),
            topic: self.topic.clone(),
            reference: self.reference.clone(),
        }
    }
}

impl<T> std::fmt::Debug for SubscriptionHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("topic", &self.topic)
            .field("reference", &self.reference)
            .finish()
    }
}

impl<T> SubscriptionHandle<T> {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The subscription reference; generated by the broker unless the command supplied one.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Equivalent to `broker.unsubscribe(self.reference(), self.topic())`.
    ///
    /// Fails with `NotFound` if the subscription was already removed, stopped
    /// on its own (unresponsive consumer), or the broker has been dropped.
    pub fn cancel(&self) -> Result<(), BrokerError> {
        match self.registry.upgrade() {
            Some(registry) => registry.unsubscribe(&self.reference, &self.topic),
            None => Err(BrokerError::NotFound {
                topic: self.topic.clone(),
                reference: self.reference.clone(),
            }),
        }
    }
}
