//! Subscription command
//!
//! A `Command` is the contract a subscriber hands to the broker:
//!
//! - `topic`: topic name used for routing; must not be empty
//! - `run`: invoked once per delivered payload, from the subscription's own
//!   dispatch task. Errors and panics are caught there and never reach the
//!   publisher.
//! - `post_run`: optional; invoked exactly once when the subscription ends
//! - `reference`: optional lookup key; the broker generates a UUID when it is
//!   `None` or empty

use std::future::Future;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::utils::{DispatchError, RunError};

pub type RunFn<T> = Box<dyn FnMut(T) -> BoxFuture<'static, Result<(), RunError>> + Send>;
pub type PostRunFn = Box<dyn FnOnce(Option<DispatchError>) + Send>;

pub struct Command<T> {
    pub topic: String,
    pub run: RunFn<T>,
    pub post_run: Option<PostRunFn>,
    pub reference: Option<String>,
}

impl<T: Send + 'static> Command<T> {
    /// Builds a command from a synchronous callback.
    pub fn new<F>(topic: impl Into<String>, mut run: F) -> Self
    where
        F: FnMut(T) -> Result<(), RunError> + Send + 'static,
    {
        Self::from_run_fn(
            topic,
            Box::new(move |payload| futures::future::ready(run(payload)).boxed()),
        )
    }

    /// Builds a command from an async callback.
    pub fn new_async<F, Fut>(topic: impl Into<String>, mut run: F) -> Self
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), RunError>> + Send + 'static,
    {
        Self::from_run_fn(topic, Box::new(move |payload| run(payload).boxed()))
    }

    fn from_run_fn(topic: impl Into<String>, run: RunFn<T>) -> Self {
        Self {
            topic: topic.into(),
            run,
            post_run: None,
            reference: None,
        }
    }

    pub fn with_post_run<F>(mut self, post_run: F) -> Self
    where
        F: FnOnce(Option<DispatchError>) + Send + 'static,
    {
        self.post_run = Some(Box::new(post_run));
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

impl<T> std::fmt::Debug for Command<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("topic", &self.topic)
            .field("reference", &self.reference)
            .field("post_run", &self.post_run.is_some())
            .finish_non_exhaustive()
    }
}
