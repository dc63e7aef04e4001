//! Dispatch loop
//!
//! Each subscription owns one dispatch task:
//!
//! ```text
//! WAITING (output.recv) ──► RUNNING (run) ──► WAITING ...
//!    └── output closed by DeliveryPipe::stop ──► TERMINATED (post_run, once)
//! ```
//!
//! The loop holds only the pipe's `PipeOutput`, so a subscription dropped
//! without being stopped still terminates and fires `post_run`.
//!
//! Panics inside `run` or `post_run` are caught with `catch_unwind` and logged.
//! `AssertUnwindSafe` is used, so state shared by a callback through a lock
//! may be left inconsistent if that callback panics while holding it.
//!
//! The value handed to `post_run` is:
//! - `Some(DispatchError::Unresponsive)` when the pipe stopped on a timeout,
//! - otherwise the last `run` failure (`Run` or `Panicked`), if any,
//! - otherwise `None`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, warn};

use crate::broker::command::{Command, PostRunFn, RunFn};
use crate::pipe::{DeliveryPipe, PipeOutput, StopCause};
use crate::utils::{BrokerError, DispatchError};

/// Live binding of one command to one delivery pipe.
///
/// Cloning yields another handle to the same subscription.
pub struct Subscription<T> {
    reference: String,
    pipe: DeliveryPipe<T>,
}

impl<T> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Self {
            reference: self.reference.clone(),
            pipe: self.pipe.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("reference", &self.reference)
            .field("pipe", &self.pipe)
            .finish()
    }
}

impl<T: Send + 'static> Subscription<T> {
    /// Activates a fresh pipe for `command` and spawns its dispatch loop.
    ///
    /// `command.topic` and `command.reference` are ignored here; the broker
    /// resolves them before calling this.
    pub fn start(
        reference: String,
        command: Command<T>,
        timeout: Duration,
    ) -> Result<Self, BrokerError> {
        let pipe = DeliveryPipe::new(reference.clone(), timeout);
        let output = pipe.activate()?;

        tokio::spawn(dispatch(
            reference.clone(),
            timeout,
            output,
            command.run,
            command.post_run,
        ));

        Ok(Self { reference, pipe })
    }
}

impl<T> Subscription<T> {
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// A subscription is active exactly as long as its pipe is.
    pub fn is_active(&self) -> bool {
        self.pipe.is_active()
    }

    pub fn send(&self, payload: T) {
        self.pipe.send(payload);
    }

    /// Stops the pipe, which ends the dispatch loop and fires `post_run`.
    pub fn stop(&self) -> bool {
        self.pipe.stop()
    }
}

async fn dispatch<T: Send + 'static>(
    reference: String,
    timeout: Duration,
    mut output: PipeOutput<T>,
    mut run: RunFn<T>,
    post_run: Option<PostRunFn>,
) {
    let mut failure = None;

    // recv yields nothing once the pipe has stopped, buffered payloads included
    while let Some(payload) = output.recv().await {
        let outcome = AssertUnwindSafe(async { run(payload).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(reference = %reference, error = %err, "subscriber run failed");
                failure = Some(DispatchError::Run {
                    error: err.to_string(),
                });
            }
            Err(panic) => {
                let info = panic_info(&*panic);
                warn!(reference = %reference, %info, "subscriber run panicked");
                failure = Some(DispatchError::Panicked { info });
            }
        }
    }

    let terminal = match output.stop_cause() {
        Some(StopCause::Unresponsive) => Some(DispatchError::Unresponsive { timeout }),
        _ => failure,
    };
    drop(output);
    debug!(
        reference = %reference,
        cause = terminal.as_ref().map(DispatchError::as_label),
        "dispatch loop terminated"
    );

    if let Some(post_run) = post_run {
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(move || post_run(terminal)));
        if let Err(panic) = outcome {
            warn!(
                reference = %reference,
                info = %panic_info(&*panic),
                "subscriber post_run panicked"
            );
        }
    }
}

fn panic_info(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
