//! The `error` module defines the error types used within `pipesub`.
//!
//! - [`BrokerError`] is returned by the public broker and pipe operations.
//! - [`DispatchError`] is the terminal cause handed to a subscription's
//!   `post_run` callback. It never surfaces through the broker API.

use std::time::Duration;
use thiserror::Error;

/// Error type returned by subscriber `run` callbacks.
pub type RunError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced by broker and delivery pipe operations.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The pipe (or a subscription with the same reference) is already active.
    #[error("already active: {reference}")]
    AlreadyActive { reference: String },

    /// The pipe has been stopped and cannot be activated again.
    #[error("pipe stopped; pipes are not reusable")]
    PipeStopped,

    /// Subscribe was called with an empty topic name.
    #[error("invalid topic: topic must not be empty")]
    InvalidTopic,

    /// No subscription with this reference is registered under the topic.
    #[error("subscription {reference} not found on topic {topic}")]
    NotFound { topic: String, reference: String },
}

impl BrokerError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            BrokerError::AlreadyActive { .. } => "broker_already_active",
            BrokerError::PipeStopped => "broker_pipe_stopped",
            BrokerError::InvalidTopic => "broker_invalid_topic",
            BrokerError::NotFound { .. } => "broker_not_found",
        }
    }
}

/// Why a subscription's dispatch loop terminated abnormally.
///
/// A subscription stopped through `unsubscribe`, `close_topic` or its cancel
/// handle reports `None` to `post_run` unless one of these applies.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The consumer did not accept a payload within the delivery budget.
    #[error("subscriber unresponsive for {timeout:?}")]
    Unresponsive { timeout: Duration },

    /// The last `run` invocation that failed returned this error.
    #[error("run failed: {error}")]
    Run { error: String },

    /// The last `run` invocation that failed panicked with this message.
    #[error("run panicked: {info}")]
    Panicked { info: String },
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::Unresponsive { .. } => "dispatch_unresponsive",
            DispatchError::Run { .. } => "dispatch_run_failed",
            DispatchError::Panicked { .. } => "dispatch_panicked",
        }
    }
}
