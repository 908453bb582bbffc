//! REST client for the attendance backend.
//!
//! Provides the [`api::AttendanceApi`] seam and its `reqwest`
//! implementation, client configuration, the submission gateway that
//! classifies every "mark attendance" response, and the public roster
//! poller.

pub mod api;
pub mod config;
pub mod gateway;
pub mod payload;
pub mod roster;
