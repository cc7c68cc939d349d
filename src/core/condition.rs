//! Pre-execution gating conditions.
//!
//! A condition is a predicate-with-effects evaluated before an operation is
//! allowed to run. Evaluation may resolve immediately or stay pending on an
//! asynchronous event (a permission prompt, an exclusivity grant); pendingness
//! is expressed by the future not resolving, never by blocking a thread. A
//! condition may also spawn a dependency operation that the engine runs to
//! completion first.

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::exclusivity::ExclusivityLedger;
use crate::core::operation::Operation;
use crate::error::OperationError;

/// Outcome of evaluating a single condition.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionVerdict {
    Satisfied,
    Failed(OperationError),
}

impl ConditionVerdict {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, ConditionVerdict::Satisfied)
    }
}

/// A precondition gating an operation's execution.
///
/// Conditions are evaluated sequentially in attach order; the first failure
/// aborts evaluation and becomes the operation's sole condition error.
#[async_trait]
pub trait Condition: Send + Sync {
    /// Human-readable name, used in error reporting.
    fn name(&self) -> &str;

    /// An operation this condition needs run to completion before it can be
    /// evaluated (e.g. an authorization request). The engine enqueues it and
    /// records it as a dependency of `operation`.
    fn dependency(&self, _operation: &Arc<Operation>) -> Option<Arc<Operation>> {
        None
    }

    /// Evaluate the condition for `operation`.
    async fn evaluate(&self, operation: &Arc<Operation>) -> ConditionVerdict;
}

/// Serializes operations contending for a shared resource category.
///
/// Mutual exclusion is a plain condition, not a separate code path: the
/// verdict stays pending until the ledger grants the slot, and the granted
/// lease is attached to the operation so finishing releases it exactly once.
pub struct MutuallyExclusive {
    name: String,
    category: String,
    ledger: Arc<ExclusivityLedger>,
}

impl MutuallyExclusive {
    /// The category identifies the shared resource family, not a task
    /// instance: every operation built over the same hardware or service
    /// should pass the same tag.
    pub fn new(category: impl Into<String>, ledger: Arc<ExclusivityLedger>) -> Self {
        let category = category.into();
        Self {
            name: format!("mutually-exclusive({})", category),
            category,
            ledger,
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }
}

#[async_trait]
impl Condition for MutuallyExclusive {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, operation: &Arc<Operation>) -> ConditionVerdict {
        let lease = self.ledger.acquire(&self.category, operation.id()).await;
        operation.attach_lease(lease);
        ConditionVerdict::Satisfied
    }
}
