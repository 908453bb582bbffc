//! Domain types and rules for the attendance scanning station.
//!
//! Everything in this crate is pure: no I/O, no clocks read behind the
//! caller's back. The client, scanner and kiosk crates build on it.

pub mod attendance;
pub mod error;
pub mod event;
pub mod history;
pub mod notification;
pub mod roster;
pub mod scan;
pub mod student;
pub mod types;
