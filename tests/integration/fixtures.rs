//! Shared mock services for the integration tests.

use opkit::observers::{ActivityIndicator, BackgroundTaskRegistry};
use opkit::tasks::service::{
    AuthorizationLevel, AuthorizationSource, Dispatcher, GeocodeReply, GeocodeService, Location,
    LocationRequest, LocationService, LocationUpdate, UsageRequirement,
};
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Runs jobs immediately on the calling thread.
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, job: Box<dyn FnOnce() + Send>) {
        job();
    }
}

/// A scripted positioning feed: the test pushes updates through `send`.
pub struct ScriptedLocationService {
    tx: Mutex<Option<mpsc::UnboundedSender<LocationUpdate>>>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl ScriptedLocationService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tx: Mutex::new(None),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        })
    }

    pub fn send(&self, update: LocationUpdate) {
        if let Some(tx) = self.tx.lock().unwrap().as_ref() {
            let _ = tx.send(update);
        }
    }

    pub async fn wait_started(&self) {
        for _ in 0..500 {
            if self.tx.lock().unwrap().is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("location service never started");
    }
}

impl LocationService for ScriptedLocationService {
    fn start(&self, _request: LocationRequest) -> mpsc::UnboundedReceiver<LocationUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.tx.lock().unwrap() = Some(tx);
        self.starts.fetch_add(1, Ordering::SeqCst);
        rx
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// A scripted geocoder: the test resolves the pending lookup with `reply`.
pub struct ScriptedGeocoder {
    pub reply_tx: Mutex<Option<oneshot::Sender<GeocodeReply>>>,
    pub cancels: AtomicUsize,
}

impl ScriptedGeocoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            reply_tx: Mutex::new(None),
            cancels: AtomicUsize::new(0),
        })
    }

    pub fn reply(&self, reply: GeocodeReply) -> bool {
        match self.reply_tx.lock().unwrap().take() {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    pub async fn wait_issued(&self) {
        for _ in 0..500 {
            if self.reply_tx.lock().unwrap().is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("lookup never issued");
    }
}

impl GeocodeService for ScriptedGeocoder {
    fn reverse_geocode(&self, _location: Location) -> oneshot::Receiver<GeocodeReply> {
        let (tx, rx) = oneshot::channel();
        *self.reply_tx.lock().unwrap() = Some(tx);
        rx
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

/// Authorization source that starts NotDetermined and grants a fixed level
/// when prompted, counting the prompts.
pub struct PromptingAuthorization {
    status: Mutex<AuthorizationLevel>,
    grants: AuthorizationLevel,
    pub prompts: AtomicUsize,
}

impl PromptingAuthorization {
    pub fn new(initial: AuthorizationLevel, grants: AuthorizationLevel) -> Arc<Self> {
        Arc::new(Self {
            status: Mutex::new(initial),
            grants,
            prompts: AtomicUsize::new(0),
        })
    }
}

impl AuthorizationSource for PromptingAuthorization {
    fn status(&self) -> AuthorizationLevel {
        *self.status.lock().unwrap()
    }

    fn request(&self, _usage: UsageRequirement) -> oneshot::Receiver<AuthorizationLevel> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        *self.status.lock().unwrap() = self.grants;
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(self.grants);
        rx
    }
}

/// Indicator/registry counting its balance; must end at zero.
#[derive(Default)]
pub struct Bookkeeper {
    pub balance: AtomicIsize,
    pub peak: AtomicIsize,
}

impl Bookkeeper {
    fn up(&self) {
        let now = self.balance.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn down(&self) {
        self.balance.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ActivityIndicator for Bookkeeper {
    fn show(&self) {
        self.up();
    }

    fn hide(&self) {
        self.down();
    }
}

impl BackgroundTaskRegistry for Bookkeeper {
    fn begin(&self) {
        self.up();
    }

    fn end(&self) {
        self.down();
    }
}
