//! Wiring for the campion server binary.
//!
//! The pieces live in their own crates; this one assembles them into
//! a [`handler::CampionHandler`] and provides logging setup. Kept as a
//! library so the integration tests can drive the real handler over
//! real sockets.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod handler;
pub mod logging;
