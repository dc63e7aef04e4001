//! The `pipe` module provides the per-subscription delivery primitive.

pub mod delivery;

pub use delivery::{DEFAULT_DELIVERY_TIMEOUT, DeliveryPipe, PipeOutput, StopCause};
