//! # PipeSub
//!
//! `pipesub` is an in-process publish/subscribe broker built on Tokio.
//! Independent consumers subscribe to named topics, receive payloads published
//! asynchronously, and are removed explicitly or automatically without ever
//! blocking the publisher.
//!
//! Delivery is best-effort: a subscriber that does not accept a payload within
//! the delivery timeout (1 second by default) loses its whole subscription.
//! Nothing is persisted or replayed, and there is no ordering guarantee across
//! topics.
//!
//! ## Core Modules
//!
//! - `broker`: topic registry and the subscribe / publish / unsubscribe / close API.
//! - `subscription`: binds a `Command` to a delivery pipe and runs its callbacks.
//! - `pipe`: the per-subscription delivery primitive with timeout and self-stop.
//! - `config`: loads broker and logging settings from files and environment.
//! - `utils`: error types and logging initialisation.
//!
//! ## Example
//!
//! ```rust
//! use pipesub::{Broker, Command};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let broker = Broker::new();
//! let handle = broker
//!     .subscribe(Command::new("greetings", |msg: String| {
//!         println!("got {msg}");
//!         Ok(())
//!     }))
//!     .unwrap();
//!
//! broker.publish("hello".to_string(), "greetings");
//! handle.cancel().unwrap();
//! # }
//! ```

pub mod broker;
pub mod config;
pub mod pipe;
pub mod subscription;
pub mod utils;

pub use broker::{Broker, Command, SubscriptionHandle};
pub use self::config::{BrokerSettings, Settings, load_config};
pub use pipe::{DeliveryPipe, PipeOutput, StopCause};
pub use utils::{BrokerError, DispatchError, RunError};
