//! Lifecycle observers.
//!
//! Observers are attached to an operation before it starts and receive
//! callbacks at lifecycle transitions. They run synchronously on whatever
//! thread drives the transition and must return promptly. Observers never own
//! the operation; they are pure reaction. Calling back into the operation's
//! own transitions from a hook is safe because every transition is
//! idempotent, but it is a no-op by design of the state machine.

use crate::core::operation::Operation;
use crate::error::OperationError;

/// Callback hooks fired at operation lifecycle transitions.
///
/// All hooks have empty default bodies so implementors override only what
/// they need.
pub trait OperationObserver: Send + Sync {
    /// The operation's work body is about to be invoked.
    fn did_start(&self, _operation: &Operation) {}

    /// The operation dynamically produced another operation while running.
    fn did_produce_operation(&self, _operation: &Operation, _produced: &Operation) {}

    /// The operation reached its terminal state. Fired exactly once, with the
    /// full accumulated error list (empty on success).
    fn did_finish(&self, _operation: &Operation, _errors: &[OperationError]) {}
}

type StartHook = Box<dyn Fn(&Operation) + Send + Sync>;
type ProduceHook = Box<dyn Fn(&Operation, &Operation) + Send + Sync>;
type FinishHook = Box<dyn Fn(&Operation, &[OperationError]) + Send + Sync>;

/// An observer assembled from closures, for callers that do not want a
/// dedicated type per hook.
#[derive(Default)]
pub struct BlockObserver {
    start: Option<StartHook>,
    produce: Option<ProduceHook>,
    finish: Option<FinishHook>,
}

impl BlockObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(mut self, hook: impl Fn(&Operation) + Send + Sync + 'static) -> Self {
        self.start = Some(Box::new(hook));
        self
    }

    pub fn on_produce(
        mut self,
        hook: impl Fn(&Operation, &Operation) + Send + Sync + 'static,
    ) -> Self {
        self.produce = Some(Box::new(hook));
        self
    }

    pub fn on_finish(
        mut self,
        hook: impl Fn(&Operation, &[OperationError]) + Send + Sync + 'static,
    ) -> Self {
        self.finish = Some(Box::new(hook));
        self
    }
}

impl OperationObserver for BlockObserver {
    fn did_start(&self, operation: &Operation) {
        if let Some(hook) = &self.start {
            hook(operation);
        }
    }

    fn did_produce_operation(&self, operation: &Operation, produced: &Operation) {
        if let Some(hook) = &self.produce {
            hook(operation, produced);
        }
    }

    fn did_finish(&self, operation: &Operation, errors: &[OperationError]) {
        if let Some(hook) = &self.finish {
            hook(operation, errors);
        }
    }
}
