//! Delivery pipe
//!
//! A `DeliveryPipe` moves payloads from a non-blocking producer to a single
//! consumer loop. Each payload handed to [`DeliveryPipe::send`] is enqueued on
//! an unbounded inbound queue; a forwarding task picks it up and spawns an
//! independent delivery task which races the handoff to the consumer against
//! the delivery timeout.
//!
//! A handoff completes only when the consumer takes the payload out of its
//! [`PipeOutput`]: every payload travels with a `oneshot` acknowledgement that
//! `PipeOutput::recv` fires on receipt. Room in the output channel is not
//! enough, so a consumer stuck in its callback is timed out like one that
//! never reads.
//!
//! If the timeout wins, or the output stream turns out to be closed, the pipe
//! stops itself: one slow consumer forfeits its whole subscription, not just
//! one payload.
//!
//! Ordering: payloads enter the forwarding task in send order, but each is
//! written by its own task, so two back-to-back payloads may reach the
//! consumer out of order when the first one has to wait. This is accepted.
//!
//! ```text
//! send() ──► [inbound] ──► forward task ──► spawn deliver ──┬─► [output] ──► consumer
//!                                                           │      ◄── ack ──┘
//!                                                           └─► timeout  ──► stop()
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::utils::BrokerError;

/// Default time budget for a single delivery attempt.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(1);

/// What caused a pipe to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// `stop()` was called explicitly (unsubscribe, topic close, cancel handle).
    Cancelled,
    /// A delivery attempt did not complete within the timeout.
    Unresponsive,
    /// A delivery attempt found the output stream closed.
    OutputClosed,
}

/// A payload in transit and the acknowledgement its consumer sends on receipt.
struct Handoff<T> {
    payload: T,
    ack: oneshot::Sender<()>,
}

/// The output stream only exists while the pipe is `Active`.
enum PipeState<T> {
    Idle,
    Active {
        inbound: mpsc::UnboundedSender<T>,
        output: mpsc::Sender<Handoff<T>>,
    },
    Stopped(StopCause),
}

struct Inner<T> {
    reference: String,
    timeout: Duration,
    state: Mutex<PipeState<T>>,
    stop_tx: watch::Sender<Option<StopCause>>,
}

impl<T> Inner<T> {
    // critical sections never panic, so a poisoned lock still holds valid state
    fn lock(&self) -> MutexGuard<'_, PipeState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_active(&self) -> bool {
        matches!(*self.lock(), PipeState::Active { .. })
    }

    fn stop_cause(&self) -> Option<StopCause> {
        match *self.lock() {
            PipeState::Stopped(cause) => Some(cause),
            _ => None,
        }
    }

    fn output(&self) -> Option<mpsc::Sender<Handoff<T>>> {
        match &*self.lock() {
            PipeState::Active { output, .. } => Some(output.clone()),
            _ => None,
        }
    }

    /// Performs the active -> stopped transition. Only the first caller wins.
    fn stop(&self, cause: StopCause) -> bool {
        {
            let mut state = self.lock();
            if !matches!(*state, PipeState::Active { .. }) {
                return false;
            }
            // drops both senders; the output stream closes once in-flight
            // deliveries observe the stop signal and release their clones
            *state = PipeState::Stopped(cause);
        }
        self.stop_tx.send_replace(Some(cause));
        debug!(reference = %self.reference, ?cause, "delivery pipe stopped");
        true
    }
}

/// Per-subscription delivery primitive. Cloning yields another handle to the
/// same pipe.
pub struct DeliveryPipe<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for DeliveryPipe<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for DeliveryPipe<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryPipe")
            .field("reference", &self.inner.reference)
            .field("timeout", &self.inner.timeout)
            .field("active", &self.inner.is_active())
            .finish()
    }
}

impl<T: Send + 'static> DeliveryPipe<T> {
    /// Creates an idle pipe. `reference` only identifies the pipe in logs and errors.
    pub fn new(reference: impl Into<String>, timeout: Duration) -> Self {
        let (stop_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                reference: reference.into(),
                timeout,
                state: Mutex::new(PipeState::Idle),
                stop_tx,
            }),
        }
    }

    /// Activates the pipe, starts its forwarding task and returns the consumer
    /// end of the output stream.
    ///
    /// Must be called from within a Tokio runtime. A pipe can be activated
    /// once; afterwards this fails with `AlreadyActive` while the pipe runs
    /// and with `PipeStopped` once it has stopped.
    pub fn activate(&self) -> Result<PipeOutput<T>, BrokerError> {
        let (output_tx, output_rx) = mpsc::channel(1);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        {
            let mut state = self.inner.lock();
            match &*state {
                PipeState::Active { .. } => {
                    return Err(BrokerError::AlreadyActive {
                        reference: self.inner.reference.clone(),
                    });
                }
                PipeState::Stopped(_) => return Err(BrokerError::PipeStopped),
                PipeState::Idle => {}
            }
            *state = PipeState::Active {
                inbound: inbound_tx,
                output: output_tx,
            };
        }

        let stopped = self.inner.stop_tx.subscribe();
        tokio::spawn(forward(Arc::downgrade(&self.inner), inbound_rx, stopped));

        Ok(PipeOutput {
            rx: output_rx,
            pipe: Arc::downgrade(&self.inner),
            stopped: self.inner.stop_tx.subscribe(),
        })
    }
}

impl<T> DeliveryPipe<T> {
    /// Hands `payload` to the forwarding task. Never waits on the consumer.
    ///
    /// The payload is silently dropped if the pipe is not active.
    pub fn send(&self, payload: T) {
        if let PipeState::Active { inbound, .. } = &*self.inner.lock() {
            let _ = inbound.send(payload);
        }
    }

    /// Stops the pipe and closes its output stream.
    ///
    /// Idempotent and safe to race with the timeout path: returns `true` only
    /// for the call that performed the teardown.
    pub fn stop(&self) -> bool {
        self.inner.stop(StopCause::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    /// Why the pipe stopped, or `None` while it is idle or active.
    pub fn stop_cause(&self) -> Option<StopCause> {
        self.inner.stop_cause()
    }

    pub fn reference(&self) -> &str {
        &self.inner.reference
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }
}

/// Consumer end of a [`DeliveryPipe`], returned by [`DeliveryPipe::activate`].
///
/// Holds the pipe weakly: once every `DeliveryPipe` handle is gone the stream
/// ends, even if nobody called `stop`.
pub struct PipeOutput<T> {
    rx: mpsc::Receiver<Handoff<T>>,
    pipe: Weak<Inner<T>>,
    // outlives the pipe, so the stop cause stays readable after it is dropped
    stopped: watch::Receiver<Option<StopCause>>,
}

impl<T> std::fmt::Debug for PipeOutput<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeOutput")
            .field("pipe_alive", &(self.pipe.strong_count() > 0))
            .finish()
    }
}

impl<T> PipeOutput<T> {
    /// Waits for the next payload and acknowledges it to its delivery task.
    ///
    /// Returns `None` once the pipe has stopped or been dropped. The pipe
    /// state is checked after the payload is taken, so a payload still queued
    /// when `stop` returned is discarded unacknowledged.
    pub async fn recv(&mut self) -> Option<T> {
        let Handoff { payload, ack } = self.rx.recv().await?;
        let pipe = self.pipe.upgrade()?;
        if !pipe.is_active() {
            return None;
        }
        // the delivery task may already have given up; the payload is ours either way
        let _ = ack.send(());
        Some(payload)
    }

    /// Why the pipe stopped. `None` while it is active, or if it was dropped
    /// without being stopped.
    pub fn stop_cause(&self) -> Option<StopCause> {
        *self.stopped.borrow()
    }
}

/// Spawns one delivery task per inbound payload until the pipe stops.
///
/// Holds only a weak reference so an abandoned pipe is freed.
async fn forward<T: Send + 'static>(
    pipe: Weak<Inner<T>>,
    mut inbound: mpsc::UnboundedReceiver<T>,
    mut stopped: watch::Receiver<Option<StopCause>>,
) {
    loop {
        tokio::select! {
            biased;
            _ = stopped.wait_for(Option::is_some) => break,
            payload = inbound.recv() => {
                let Some(payload) = payload else { break };
                let Some(inner) = pipe.upgrade() else { break };
                tokio::spawn(deliver(inner, payload));
            }
        }
    }
}

async fn deliver<T: Send + 'static>(inner: Arc<Inner<T>>, payload: T) {
    let Some(output) = inner.output() else {
        return;
    };
    let mut stopped = inner.stop_tx.subscribe();
    let (ack, acked) = oneshot::channel();

    // completes once the consumer has taken the payload, not when it is queued
    let handoff = async move {
        output.send(Handoff { payload, ack }).await.ok()?;
        acked.await.ok()
    };

    tokio::select! {
        // a stop that already happened wins over a handoff that became ready
        biased;
        _ = stopped.wait_for(Option::is_some) => {}
        handed = handoff => {
            if handed.is_none() && inner.stop(StopCause::OutputClosed) {
                warn!(reference = %inner.reference, "output stream closed; pipe stopped");
            }
        }
        _ = tokio::time::sleep(inner.timeout) => {
            if inner.stop(StopCause::Unresponsive) {
                warn!(
                    reference = %inner.reference,
                    timeout = ?inner.timeout,
                    "subscriber unresponsive; pipe stopped"
                );
            }
        }
    }
}
