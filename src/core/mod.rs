//! The operation lifecycle engine.
//!
//! An [`Operation`](operation::Operation) wraps a unit of work with a uniform
//! lifecycle: gating conditions evaluated before the work runs, observers
//! fired at transitions, mutual exclusion across operations sharing a
//! resource category, and a cooperative, exactly-once cancel/finish protocol.
//! The [`OperationQueue`](queue::OperationQueue) drives operations through
//! that lifecycle.

pub mod condition;
pub mod exclusivity;
pub mod observer;
pub mod operation;
pub mod queue;
