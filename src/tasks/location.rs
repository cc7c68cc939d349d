//! Acquiring the user's current position.
//!
//! [`UserLocationTask`] listens to a continuous positioning feed until a
//! reading meets the requested accuracy, then stops the feed, delivers the
//! reading, and finishes. It is gated by a location-permission condition and
//! by mutual exclusion on the positioning hardware.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use crate::core::condition::{Condition, ConditionVerdict, MutuallyExclusive};
use crate::core::exclusivity::ExclusivityLedger;
use crate::core::operation::{Executable, Operation};
use crate::error::OperationError;
use crate::tasks::service::{
    AuthorizationSource, Dispatcher, Location, LocationRequest, LocationService, LocationUpdate,
    UsageRequirement,
};
use crate::Result;

/// Exclusivity category shared by every task that touches the positioning
/// hardware, process-wide.
pub const LOCATION_CATEGORY: &str = "location-service";

/// Drives an authorization prompt to completion.
///
/// The request "succeeds" whatever the user answers; whether the resulting
/// level is good enough is the gating condition's call, re-checked afterwards.
pub struct RequestAuthorizationTask {
    source: Arc<dyn AuthorizationSource>,
    usage: UsageRequirement,
}

impl RequestAuthorizationTask {
    pub fn operation(
        source: Arc<dyn AuthorizationSource>,
        usage: UsageRequirement,
    ) -> Arc<Operation> {
        Operation::new("request-authorization", Arc::new(Self { source, usage }))
    }
}

#[async_trait]
impl Executable for RequestAuthorizationTask {
    async fn execute(&self, operation: &Arc<Operation>) {
        let reply = self.source.request(self.usage);
        let token = operation.cancellation();
        tokio::select! {
            _ = token.cancelled() => operation.finish(Vec::new()),
            level = reply => match level {
                Ok(level) => {
                    tracing::debug!(?level, "authorization request resolved");
                    operation.finish(Vec::new());
                }
                Err(_) => operation.finish(vec![OperationError::service(
                    "authorization source dropped the request",
                )]),
            },
        }
    }
}

/// Gates an operation on location permission.
///
/// When the platform has not yet been asked, the condition spawns a
/// [`RequestAuthorizationTask`] as a dependency so the prompt completes
/// before evaluation.
pub struct LocationPermissionCondition {
    source: Arc<dyn AuthorizationSource>,
    usage: UsageRequirement,
}

impl LocationPermissionCondition {
    pub fn new(source: Arc<dyn AuthorizationSource>, usage: UsageRequirement) -> Self {
        Self { source, usage }
    }
}

#[async_trait]
impl Condition for LocationPermissionCondition {
    fn name(&self) -> &str {
        "location-permission"
    }

    fn dependency(&self, _operation: &Arc<Operation>) -> Option<Arc<Operation>> {
        use crate::tasks::service::AuthorizationLevel;
        if self.source.status() == AuthorizationLevel::NotDetermined {
            Some(RequestAuthorizationTask::operation(
                Arc::clone(&self.source),
                self.usage,
            ))
        } else {
            None
        }
    }

    async fn evaluate(&self, _operation: &Arc<Operation>) -> ConditionVerdict {
        let status = self.source.status();
        if status.satisfies(self.usage) {
            ConditionVerdict::Satisfied
        } else {
            ConditionVerdict::Failed(OperationError::condition(
                self.name(),
                format!("authorization level is {:?}", status),
            ))
        }
    }
}

type LocationHandler = Box<dyn FnOnce(Location) + Send>;

/// Acquires one location reading at or better than the requested accuracy.
pub struct UserLocationTask {
    accuracy: f64,
    service: Arc<dyn LocationService>,
    dispatcher: Arc<dyn Dispatcher>,
    handler: Mutex<Option<LocationHandler>>,
}

impl UserLocationTask {
    pub fn new(
        accuracy: f64,
        service: Arc<dyn LocationService>,
        dispatcher: Arc<dyn Dispatcher>,
        handler: impl FnOnce(Location) + Send + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            accuracy,
            service,
            dispatcher,
            handler: Mutex::new(Some(Box::new(handler))),
        })
    }

    /// Wrap the task in an operation with its standard conditions attached:
    /// location permission (when-in-use) and exclusivity on the positioning
    /// hardware.
    pub fn operation(
        self: &Arc<Self>,
        authorization: Arc<dyn AuthorizationSource>,
        ledger: Arc<ExclusivityLedger>,
    ) -> Result<Arc<Operation>> {
        let operation = Operation::new("user-location", Arc::clone(self) as Arc<dyn Executable>);
        operation.add_condition(Arc::new(LocationPermissionCondition::new(
            authorization,
            UsageRequirement::WhenInUse,
        )))?;
        operation.add_condition(Arc::new(MutuallyExclusive::new(LOCATION_CATEGORY, ledger)))?;
        Ok(operation)
    }

    /// Stop the feed on the service's serial context. Idempotent from the
    /// service's point of view.
    fn stop_updates(&self) {
        let service = Arc::clone(&self.service);
        self.dispatcher.dispatch(Box::new(move || service.stop()));
    }

    fn take_handler(&self) -> Option<LocationHandler> {
        self.handler.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

#[async_trait]
impl Executable for UserLocationTask {
    async fn execute(&self, operation: &Arc<Operation>) {
        // The service API is thread-affine: start it on the serial context
        // and ferry the update channel back.
        let (tx, rx) = oneshot::channel();
        let service = Arc::clone(&self.service);
        let request = LocationRequest {
            desired_accuracy: self.accuracy,
        };
        self.dispatcher.dispatch(Box::new(move || {
            let _ = tx.send(service.start(request));
        }));

        let mut updates = match rx.await {
            Ok(updates) => updates,
            Err(_) => {
                operation.finish(vec![OperationError::service(
                    "dispatcher dropped the start job",
                )]);
                return;
            }
        };

        let token = operation.cancellation();
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    self.stop_updates();
                    operation.finish(Vec::new());
                    return;
                }
                update = updates.recv() => match update {
                    Some(LocationUpdate::Reading(location))
                        if location.horizontal_accuracy <= self.accuracy =>
                    {
                        tracing::debug!(
                            accuracy = location.horizontal_accuracy,
                            "qualifying reading received"
                        );
                        // Stop listening before the caller sees the reading.
                        self.stop_updates();
                        if let Some(handler) = self.take_handler() {
                            handler(location);
                        }
                        operation.finish(Vec::new());
                        return;
                    }
                    Some(LocationUpdate::Reading(location)) => {
                        tracing::trace!(
                            accuracy = location.horizontal_accuracy,
                            threshold = self.accuracy,
                            "reading below threshold, still listening"
                        );
                    }
                    Some(LocationUpdate::Failed(detail)) => {
                        self.stop_updates();
                        operation.finish(vec![OperationError::ServiceFailed { detail }]);
                        return;
                    }
                    None => {
                        self.stop_updates();
                        operation.finish(vec![OperationError::service(
                            "location update feed closed",
                        )]);
                        return;
                    }
                }
            }
        }
    }
}
