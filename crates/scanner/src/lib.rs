//! Scan intent controller and manual lookup resolver.
//!
//! Both are split into a sans-IO state machine that takes the current
//! instant as an argument ([`session::ScanSession`], [`lookup::LookupState`])
//! and an async actor that owns it and drives timers, the decode source and
//! the backend ([`controller::ScanController`], [`resolver::LookupResolver`]).

pub mod controller;
pub mod decode;
pub mod line_source;
pub mod lookup;
pub mod resolver;
pub mod session;
pub mod timer;
