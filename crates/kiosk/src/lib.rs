//! Attendance kiosk: a scanning station driven by a keyboard-wedge QR
//! reader, with operator commands typed on the same terminal.

pub mod config;
pub mod console;
pub mod operator;
