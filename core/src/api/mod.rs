//! HTTP surface consumed by the web frontend.
//!
//! Versioned modules (currently `v1`) keep the route set stable while the
//! implementation underneath moves.

pub mod v1;

pub use v1::{router, ApiState};
