//! opkit: an asynchronous operation lifecycle engine.
//!
//! An [`Operation`] wraps a unit of work with a uniform lifecycle: gating
//! [`Condition`]s evaluated before it may run, [`OperationObserver`]s fired
//! at transitions, mutual exclusion across operations sharing a resource
//! category, and a cooperative, exactly-once cancel/finish protocol that is
//! safe from any thread at any time. An [`OperationQueue`] drives operations
//! through that lifecycle; `tasks` holds two concrete operations built over
//! external positioning and geocoding services.

pub mod config;
pub mod core;
pub mod error;
pub mod observers;
pub mod tasks;

pub use config::QueueConfig;
pub use core::condition::{Condition, ConditionVerdict, MutuallyExclusive};
pub use core::exclusivity::{ExclusivityLedger, Lease};
pub use core::observer::{BlockObserver, OperationObserver};
pub use core::operation::{
    BlockTask, Executable, Operation, OperationId, OperationState, Outcome,
};
pub use core::queue::{OperationQueue, QueueEvent};
pub use error::{Error, OperationError, Result};
