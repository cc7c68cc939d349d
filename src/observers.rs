//! Bookkeeping observers for leaf tasks.
//!
//! These mirror OS-level chores around a network-bound operation: showing an
//! activity indicator and keeping a background-task assertion alive. They are
//! side effects only, balanced exactly: one show per hide, one begin per end,
//! and nothing at all when the operation never starts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::observer::OperationObserver;
use crate::core::operation::Operation;
use crate::error::OperationError;

/// Something that can show and hide a network-activity indicator.
pub trait ActivityIndicator: Send + Sync {
    fn show(&self);
    fn hide(&self);
}

/// OS facility that keeps the process alive while work is in flight.
pub trait BackgroundTaskRegistry: Send + Sync {
    fn begin(&self);
    fn end(&self);
}

/// Shows the activity indicator while the operation executes.
pub struct NetworkActivityObserver {
    indicator: Arc<dyn ActivityIndicator>,
    shown: AtomicBool,
}

impl NetworkActivityObserver {
    pub fn new(indicator: Arc<dyn ActivityIndicator>) -> Self {
        Self {
            indicator,
            shown: AtomicBool::new(false),
        }
    }
}

impl OperationObserver for NetworkActivityObserver {
    fn did_start(&self, _operation: &Operation) {
        self.shown.store(true, Ordering::SeqCst);
        self.indicator.show();
    }

    fn did_finish(&self, _operation: &Operation, _errors: &[OperationError]) {
        // An operation killed by a failing condition never started; do not
        // hide an indicator that was never shown.
        if self.shown.swap(false, Ordering::SeqCst) {
            self.indicator.hide();
        }
    }
}

/// Holds a background-task assertion while the operation executes.
pub struct BackgroundTaskObserver {
    registry: Arc<dyn BackgroundTaskRegistry>,
    begun: AtomicBool,
}

impl BackgroundTaskObserver {
    pub fn new(registry: Arc<dyn BackgroundTaskRegistry>) -> Self {
        Self {
            registry,
            begun: AtomicBool::new(false),
        }
    }
}

impl OperationObserver for BackgroundTaskObserver {
    fn did_start(&self, _operation: &Operation) {
        self.begun.store(true, Ordering::SeqCst);
        self.registry.begin();
    }

    fn did_finish(&self, _operation: &Operation, _errors: &[OperationError]) {
        if self.begun.swap(false, Ordering::SeqCst) {
            self.registry.end();
        }
    }
}
