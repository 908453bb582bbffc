//! Rollcall event bus.
//!
//! The scanner, manual lookup and roster poller publish [`KioskEvent`]s
//! here; the presentation layer subscribes and renders them.
//!
//! - [`EventBus`] -- in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`KioskEvent`] -- the event envelope, with a [`KioskEventKind`] payload.

pub mod bus;

pub use bus::{Channel, EventBus, KioskEvent, KioskEventKind};
