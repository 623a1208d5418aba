//! # teleport-sender: synthetic capture host
//!
//! Drives a teleport output with a generated test pattern and sine tone,
//! standing in for a real capture host. Useful for exercising receivers
//! and both delivery models without a capture device.
//!
//! ## Modes
//!
//! - **Session**: one receiver connects to the output's listener and
//!   sends its options handshake (`mode = "session"`).
//! - **Fanout**: every receiver connecting to `fanout_port` gets its own
//!   queue (`mode = "fanout"`).

pub mod config;
pub mod service;
pub mod source;
