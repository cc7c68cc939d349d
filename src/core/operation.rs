//! The operation state machine.
//!
//! An operation wraps a unit of work (its [`Executable`] body) with
//! conditions, observers, dependencies, and an exactly-once finish protocol.
//! `finish` and `cancel` are safe to call from any thread at any time,
//! including before execution starts and after an external callback already
//! fired: the first finish wins, later calls are no-ops.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::condition::Condition;
use crate::core::exclusivity::Lease;
use crate::core::observer::OperationObserver;
use crate::error::OperationError;
use crate::{Error, Result};

/// Unique identifier for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 8 characters of the UUID for human-readable output.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle states, in order. Transitions are monotone: an operation never
/// moves backward. Cancellation is an orthogonal flag, not a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// Freshly constructed; conditions, observers, and dependencies may still
    /// be attached.
    Initialized,
    /// Handed to a queue; waiting for dependencies to finish.
    Pending,
    /// Conditions are being evaluated.
    EvaluatingConditions,
    /// All conditions passed; about to execute.
    Ready,
    /// The work body has been invoked and owns its own completion trigger.
    Executing,
    /// `finish` accepted; errors recorded, observers firing.
    Finishing,
    /// Terminal. Observers have fired exactly once.
    Finished,
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperationState::Initialized => "initialized",
            OperationState::Pending => "pending",
            OperationState::EvaluatingConditions => "evaluating_conditions",
            OperationState::Ready => "ready",
            OperationState::Executing => "executing",
            OperationState::Finishing => "finishing",
            OperationState::Finished => "finished",
        };
        write!(f, "{}", name)
    }
}

/// Terminal result of a finished operation, distinguishable three ways.
///
/// Errors take precedence: a cancelled operation that also recorded errors
/// reports `Failed` so the causal chain is never hidden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum Outcome {
    Success,
    Cancelled,
    Failed { errors: Vec<OperationError> },
}

/// The pluggable work body of an operation.
///
/// `execute` is invoked exactly once, after all conditions pass. From that
/// point the body owns completion: it must eventually call
/// [`Operation::finish`], possibly from an arbitrary thread inside an
/// external service callback. Bodies observe cancellation through
/// [`Operation::cancellation`] and are expected to stop in-flight work and
/// finish promptly when the token fires.
#[async_trait::async_trait]
pub trait Executable: Send + Sync {
    async fn execute(&self, operation: &Arc<Operation>);
}

type ProduceSender = mpsc::UnboundedSender<(OperationId, Arc<Operation>)>;

struct Inner {
    state: OperationState,
    errors: Vec<OperationError>,
    conditions: Vec<Arc<dyn Condition>>,
    observers: Vec<Arc<dyn OperationObserver>>,
    dependencies: Vec<Arc<Operation>>,
    body: Option<Arc<dyn Executable>>,
    leases: Vec<Lease>,
    produce_tx: Option<ProduceSender>,
    outcome: Option<Outcome>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

/// A unit of asynchronous work with a uniform lifecycle.
pub struct Operation {
    id: OperationId,
    name: String,
    cancel_token: CancellationToken,
    finished: watch::Sender<bool>,
    inner: Mutex<Inner>,
}

impl Operation {
    /// Create an operation around a work body. Conditions, observers, and
    /// dependencies may be attached until the operation is enqueued.
    pub fn new(name: &str, body: Arc<dyn Executable>) -> Arc<Self> {
        let (finished, _) = watch::channel(false);
        Arc::new(Self {
            id: OperationId::new(),
            name: name.to_string(),
            cancel_token: CancellationToken::new(),
            finished,
            inner: Mutex::new(Inner {
                state: OperationState::Initialized,
                errors: Vec::new(),
                conditions: Vec::new(),
                observers: Vec::new(),
                dependencies: Vec::new(),
                body: Some(body),
                leases: Vec::new(),
                produce_tx: None,
                outcome: None,
                created_at: Utc::now(),
                started_at: None,
                finished_at: None,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> OperationState {
        self.lock().state
    }

    /// Whether cancellation has been requested. Monotone: false to true only.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.lock().state == OperationState::Finished
    }

    /// Snapshot of the accumulated error list.
    pub fn errors(&self) -> Vec<OperationError> {
        self.lock().errors.clone()
    }

    /// Terminal result, or `None` while the operation is still live.
    pub fn outcome(&self) -> Option<Outcome> {
        self.lock().outcome.clone()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.lock().created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.lock().started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.lock().finished_at
    }

    /// A clone of the operation's cancellation token, for work bodies that
    /// need to select against it.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Attach a gating condition. Fails once the operation has been enqueued.
    pub fn add_condition(&self, condition: Arc<dyn Condition>) -> Result<()> {
        let mut inner = self.lock();
        if inner.state > OperationState::Initialized {
            return Err(Error::AlreadyStarted { id: self.id });
        }
        inner.conditions.push(condition);
        Ok(())
    }

    /// Attach a lifecycle observer. Fails once the operation has been enqueued.
    pub fn add_observer(&self, observer: Arc<dyn OperationObserver>) -> Result<()> {
        let mut inner = self.lock();
        if inner.state > OperationState::Initialized {
            return Err(Error::AlreadyStarted { id: self.id });
        }
        inner.observers.push(observer);
        Ok(())
    }

    /// Declare that this operation must not run before `dependency` finishes.
    /// The dependency must be enqueued separately (condition-spawned
    /// dependencies are enqueued by the engine).
    pub fn add_dependency(&self, dependency: Arc<Operation>) -> Result<()> {
        let mut inner = self.lock();
        if inner.state > OperationState::Initialized {
            return Err(Error::AlreadyStarted { id: self.id });
        }
        inner.dependencies.push(dependency);
        Ok(())
    }

    /// Request cooperative cancellation.
    ///
    /// Only sets the flag; never calls `finish`. The engine finishes
    /// cancelled operations that have not started executing, and executing
    /// bodies are responsible for noticing the token and finishing promptly.
    /// A no-op after the operation has finished.
    pub fn cancel(&self) {
        {
            let inner = self.lock();
            if inner.state >= OperationState::Finishing {
                return;
            }
        }
        tracing::debug!(op = %self.id.short(), name = %self.name, "cancel requested");
        self.cancel_token.cancel();
    }

    /// Record the terminal result and fire `did_finish` observers.
    ///
    /// Idempotent: only the first call transitions the operation and retains
    /// its errors; later calls (duplicate service callbacks, races between a
    /// cancel path and a completion path) are no-ops. Releases any exclusivity
    /// leases before observers run. Safe from any thread.
    pub fn finish(&self, errors: Vec<OperationError>) {
        let (observers, leases, all_errors) = {
            let mut inner = self.lock();
            if inner.state >= OperationState::Finishing {
                return;
            }
            inner.state = OperationState::Finishing;
            inner.errors.extend(errors);
            inner.finished_at = Some(Utc::now());
            inner.outcome = Some(if !inner.errors.is_empty() {
                Outcome::Failed {
                    errors: inner.errors.clone(),
                }
            } else if self.cancel_token.is_cancelled() {
                Outcome::Cancelled
            } else {
                Outcome::Success
            });
            (
                inner.observers.clone(),
                std::mem::take(&mut inner.leases),
                inner.errors.clone(),
            )
        };

        // Release exclusivity holds before anyone is notified, so a queued
        // contender is never blocked on observer work.
        drop(leases);

        tracing::debug!(
            op = %self.id.short(),
            name = %self.name,
            errors = all_errors.len(),
            cancelled = self.cancel_token.is_cancelled(),
            "operation finished"
        );

        // Observers run outside the lock; a hook calling back into finish or
        // cancel hits the idempotence guard above.
        for observer in &observers {
            observer.did_finish(self, &all_errors);
        }

        self.lock().state = OperationState::Finished;
        let _ = self.finished.send(true);
    }

    /// Hand a dynamically created operation to the queue this operation runs
    /// on, firing `did_produce_operation` observers.
    pub fn produce(&self, produced: Arc<Operation>) -> Result<()> {
        let (observers, tx) = {
            let inner = self.lock();
            let tx = inner.produce_tx.clone().ok_or(Error::NotEnqueued { id: self.id })?;
            (inner.observers.clone(), tx)
        };
        for observer in &observers {
            observer.did_produce_operation(self, &produced);
        }
        tx.send((self.id, produced)).map_err(|_| Error::QueueClosed)
    }

    /// Resolve once the operation reaches `Finished`, however it got there.
    pub async fn wait_finished(&self) {
        let mut rx = self.finished.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Hold an exclusivity lease for the duration of the operation. If the
    /// operation already finished (a cancel raced the grant), the lease is
    /// dropped, releasing the category immediately.
    pub(crate) fn attach_lease(&self, lease: Lease) {
        let mut inner = self.lock();
        if inner.state >= OperationState::Finishing {
            drop(inner);
            drop(lease);
            return;
        }
        inner.leases.push(lease);
    }

    /// Record a non-terminal error (dependency failures surface this way).
    pub(crate) fn append_error(&self, error: OperationError) {
        self.lock().errors.push(error);
    }

    /// Transition `Initialized` to `Pending` and install the queue's produce
    /// channel. Fails when the operation was already enqueued.
    pub(crate) fn enqueue(&self, produce_tx: ProduceSender) -> Result<()> {
        let mut inner = self.lock();
        if inner.state > OperationState::Initialized {
            return Err(Error::AlreadyStarted { id: self.id });
        }
        inner.state = OperationState::Pending;
        inner.produce_tx = Some(produce_tx);
        Ok(())
    }

    /// Monotone state advance; regressions are ignored.
    pub(crate) fn advance(&self, state: OperationState) {
        let mut inner = self.lock();
        if state > inner.state {
            inner.state = state;
        }
    }

    /// Mark the operation executing and fire `did_start` observers.
    pub(crate) fn begin_execution(&self) {
        let observers = {
            let mut inner = self.lock();
            if inner.state >= OperationState::Executing {
                return;
            }
            inner.state = OperationState::Executing;
            inner.started_at = Some(Utc::now());
            inner.observers.clone()
        };
        tracing::debug!(op = %self.id.short(), name = %self.name, "operation executing");
        for observer in &observers {
            observer.did_start(self);
        }
    }

    pub(crate) fn conditions_snapshot(&self) -> Vec<Arc<dyn Condition>> {
        self.lock().conditions.clone()
    }

    pub(crate) fn take_conditions(&self) -> Vec<Arc<dyn Condition>> {
        std::mem::take(&mut self.lock().conditions)
    }

    pub(crate) fn take_body(&self) -> Option<Arc<dyn Executable>> {
        self.lock().body.take()
    }

    pub(crate) fn dependencies(&self) -> Vec<Arc<Operation>> {
        self.lock().dependencies.clone()
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

type BlockWork = Box<dyn FnOnce(&Arc<Operation>) + Send>;

/// An operation body built from a closure.
///
/// The closure runs once; if it did not finish the operation itself, the
/// operation finishes successfully afterwards.
pub struct BlockTask {
    work: Mutex<Option<BlockWork>>,
}

impl BlockTask {
    pub fn operation(
        name: &str,
        work: impl FnOnce(&Arc<Operation>) + Send + 'static,
    ) -> Arc<Operation> {
        Operation::new(
            name,
            Arc::new(Self {
                work: Mutex::new(Some(Box::new(work))),
            }),
        )
    }
}

#[async_trait::async_trait]
impl Executable for BlockTask {
    async fn execute(&self, operation: &Arc<Operation>) {
        let work = self.work.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(work) = work {
            work(operation);
        }
        operation.finish(Vec::new());
    }
}
