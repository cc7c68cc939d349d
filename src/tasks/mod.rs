//! Concrete operations built over external, callback-style services.
//!
//! These are thin consumers of the engine in `crate::core`: each wraps one
//! asynchronous service behind a trait, does its work in `execute`, and calls
//! `finish` from the service's completion path.

pub mod geocode;
pub mod location;
pub mod service;
