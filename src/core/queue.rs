//! Queue driving operations through their lifecycle.
//!
//! The queue owns no operation past its finish: it enqueues, drives
//! dependencies then conditions then execution, and emits events so external
//! components can react without polling. Concurrency is bounded by
//! [`QueueConfig::max_concurrent`]; waiting for a dependency or an
//! exclusivity slot never holds a slot.

use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

use crate::config::QueueConfig;
use crate::core::condition::ConditionVerdict;
use crate::core::operation::{Operation, OperationId, OperationState, Outcome};
use crate::error::OperationError;
use crate::Result;

/// Events emitted for operation lifecycle changes on a queue.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    /// An operation passed its conditions and began executing.
    Started { id: OperationId, name: String },
    /// An executing operation dynamically produced another operation.
    Produced {
        parent: OperationId,
        child: OperationId,
    },
    /// An operation reached its terminal state.
    Finished {
        id: OperationId,
        name: String,
        outcome: Outcome,
    },
}

struct Shared {
    semaphore: Arc<Semaphore>,
    event_tx: mpsc::Sender<QueueEvent>,
    produce_tx: mpsc::UnboundedSender<(OperationId, Arc<Operation>)>,
}

/// Drives operations: dependencies, then conditions, then the work body.
///
/// Must be constructed inside a tokio runtime; each added operation is driven
/// on its own spawned task.
pub struct OperationQueue {
    shared: Arc<Shared>,
}

impl OperationQueue {
    /// Create a queue and the receiving end of its event channel.
    pub fn new(config: QueueConfig) -> Result<(Self, mpsc::Receiver<QueueEvent>)> {
        config.validate()?;
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
        let (produce_tx, mut produce_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            event_tx,
            produce_tx,
        });

        // Pump dynamically produced operations back onto this queue.
        let pump = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Some((parent, child)) = produce_rx.recv().await {
                let _ = pump
                    .event_tx
                    .send(QueueEvent::Produced {
                        parent,
                        child: child.id(),
                    })
                    .await;
                if let Err(err) = pump.add(child) {
                    tracing::warn!(parent = %parent.short(), %err, "produced operation rejected");
                }
            }
        });

        Ok((Self { shared }, event_rx))
    }

    /// Enqueue an operation and start driving it.
    ///
    /// Operations spawned by the operation's conditions are enqueued here as
    /// well and recorded as dependencies. Explicit dependencies added by the
    /// caller must be enqueued separately (on this queue or any other).
    pub fn add(&self, operation: Arc<Operation>) -> Result<()> {
        self.shared.add(operation)
    }
}

impl Shared {
    fn add(self: &Arc<Self>, operation: Arc<Operation>) -> Result<()> {
        let spawned: Vec<Arc<Operation>> = operation
            .conditions_snapshot()
            .iter()
            .filter_map(|condition| condition.dependency(&operation))
            .collect();
        for dependency in &spawned {
            operation.add_dependency(Arc::clone(dependency))?;
        }
        operation.enqueue(self.produce_tx.clone())?;
        tracing::debug!(
            op = %operation.id().short(),
            name = operation.name(),
            dependencies = operation.dependencies().len(),
            "operation enqueued"
        );
        for dependency in spawned {
            self.add(dependency)?;
        }

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            shared.drive(operation).await;
        });
        Ok(())
    }

    async fn drive(&self, operation: Arc<Operation>) {
        let token = operation.cancellation();

        // Dependencies: wait for each to finish, in any order. A failed
        // dependency is surfaced in the error list but does not cancel the
        // operation; conditions still run and may inspect the errors.
        for dependency in operation.dependencies() {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = dependency.wait_finished() => {
                    if let Some(Outcome::Failed { errors }) = dependency.outcome() {
                        tracing::debug!(
                            op = %operation.id().short(),
                            dependency = dependency.name(),
                            "dependency failed"
                        );
                        operation.append_error(OperationError::DependencyFailed {
                            dependency: dependency.name().to_string(),
                            errors,
                        });
                    }
                }
            }
        }
        if token.is_cancelled() {
            self.finish_early(&operation).await;
            return;
        }

        // Claim an execution slot. Operations parked on dependencies above do
        // not hold one, so a deep dependency chain cannot starve the queue.
        let permit = tokio::select! {
            _ = token.cancelled() => None,
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok(),
        };
        let Some(_permit) = permit else {
            self.finish_early(&operation).await;
            return;
        };

        // Conditions: sequential, in attach order; first failure aborts.
        operation.advance(OperationState::EvaluatingConditions);
        let mut failure = None;
        for condition in operation.take_conditions() {
            tokio::select! {
                _ = token.cancelled() => break,
                verdict = condition.evaluate(&operation) => {
                    if let ConditionVerdict::Failed(error) = verdict {
                        tracing::debug!(
                            op = %operation.id().short(),
                            condition = condition.name(),
                            "condition failed"
                        );
                        failure = Some(error);
                        break;
                    }
                }
            }
        }
        if token.is_cancelled() {
            self.finish_early(&operation).await;
            return;
        }
        if let Some(error) = failure {
            operation.finish(vec![error]);
            self.emit_finished(&operation).await;
            return;
        }

        // Execute. From here the body owns completion; it may finish from an
        // arbitrary thread long after execute() returns.
        operation.advance(OperationState::Ready);
        operation.begin_execution();
        let _ = self
            .event_tx
            .send(QueueEvent::Started {
                id: operation.id(),
                name: operation.name().to_string(),
            })
            .await;

        match operation.take_body() {
            Some(body) => body.execute(&operation).await,
            None => operation.finish(Vec::new()),
        }
        operation.wait_finished().await;
        self.emit_finished(&operation).await;
    }

    /// Finish an operation that never reached execution (cancelled while
    /// pending, waiting for a slot, or evaluating conditions). Observers
    /// still fire exactly once.
    async fn finish_early(&self, operation: &Arc<Operation>) {
        operation.finish(Vec::new());
        self.emit_finished(operation).await;
    }

    async fn emit_finished(&self, operation: &Arc<Operation>) {
        let outcome = operation.outcome().unwrap_or(Outcome::Success);
        let _ = self
            .event_tx
            .send(QueueEvent::Finished {
                id: operation.id(),
                name: operation.name().to_string(),
                outcome,
            })
            .await;
    }
}
