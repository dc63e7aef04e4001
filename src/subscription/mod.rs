//! The `subscription` module binds a subscriber's [`Command`](crate::broker::Command)
//! to a [`DeliveryPipe`](crate::pipe::DeliveryPipe) and runs the dispatch loop
//! that invokes its callbacks.

pub mod dispatch;
pub use dispatch::Subscription;

#[cfg(test)]
mod tests;
