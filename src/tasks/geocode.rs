//! Resolving a location into a human-readable place.
//!
//! [`ReverseGeocodeTask`] issues exactly one asynchronous lookup and records
//! the best-match candidate. Cancellation forwards to the service, whose own
//! completion may still arrive afterwards; the idempotent finish protocol
//! absorbs it.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::core::operation::{Executable, Operation};
use crate::error::OperationError;
use crate::observers::{
    ActivityIndicator, BackgroundTaskObserver, BackgroundTaskRegistry, NetworkActivityObserver,
};
use crate::tasks::service::{GeocodeService, Location, Placemark};
use crate::Result;

/// Resolves one location to its best-match placemark.
pub struct ReverseGeocodeTask {
    location: Location,
    service: Arc<dyn GeocodeService>,
    placemark: Mutex<Option<Placemark>>,
}

impl ReverseGeocodeTask {
    pub fn new(location: Location, service: Arc<dyn GeocodeService>) -> Arc<Self> {
        Arc::new(Self {
            location,
            service,
            placemark: Mutex::new(None),
        })
    }

    pub fn location(&self) -> Location {
        self.location
    }

    /// The recorded best match, available once the operation finished
    /// successfully.
    pub fn placemark(&self) -> Option<Placemark> {
        self.placemark.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Wrap the task in an operation with its bookkeeping observers attached.
    pub fn operation(
        self: &Arc<Self>,
        indicator: Arc<dyn ActivityIndicator>,
        background: Arc<dyn BackgroundTaskRegistry>,
    ) -> Result<Arc<Operation>> {
        let operation = Operation::new("reverse-geocode", Arc::clone(self) as Arc<dyn Executable>);
        operation.add_observer(Arc::new(NetworkActivityObserver::new(indicator)))?;
        operation.add_observer(Arc::new(BackgroundTaskObserver::new(background)))?;
        Ok(operation)
    }
}

#[async_trait]
impl Executable for ReverseGeocodeTask {
    async fn execute(&self, operation: &Arc<Operation>) {
        let reply = self.service.reverse_geocode(self.location);
        let token = operation.cancellation();

        tokio::select! {
            _ = token.cancelled() => {
                // Advisory cancel; a late completion is dropped with the
                // receiver and finish stays exactly-once either way.
                self.service.cancel();
                operation.finish(Vec::new());
            }
            reply = reply => match reply {
                Ok(reply) => {
                    if let Some(first) = reply.placemarks.into_iter().next() {
                        *self
                            .placemark
                            .lock()
                            .unwrap_or_else(|e| e.into_inner()) = Some(first);
                    }
                    let errors = match reply.error {
                        Some(detail) => vec![OperationError::ServiceFailed { detail }],
                        None => Vec::new(),
                    };
                    operation.finish(errors);
                }
                Err(_) => {
                    operation.finish(vec![OperationError::service(
                        "geocode service dropped the request",
                    )]);
                }
            },
        }
    }
}
