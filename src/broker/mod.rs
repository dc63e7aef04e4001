//! The `broker` module owns the topic registry and the public
//! subscribe / publish / unsubscribe / close surface.

pub mod command;
pub mod engine;
pub mod topic;

pub use command::Command;
pub use engine::{Broker, SubscriptionHandle};
