//! Interfaces required from the external services the leaf tasks wrap.
//!
//! The engine never touches location math or a network stack; it only needs
//! these contracts. Continuous-feed services deliver updates on a channel,
//! one-shot services on a oneshot; either way the delivering thread is
//! arbitrary and the core tolerates duplicate or late deliveries. Services
//! promise at most one terminal callback per logical request.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

/// A geographic reading with its reported accuracy in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// Radius of 68% confidence, metres. Smaller is better.
    pub horizontal_accuracy: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, horizontal_accuracy: f64) -> Self {
        Self {
            latitude,
            longitude,
            horizontal_accuracy,
        }
    }
}

/// A human-readable place resolved from a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placemark {
    pub name: String,
    pub locality: Option<String>,
    pub country: Option<String>,
}

/// One event on a continuous location feed.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationUpdate {
    Reading(Location),
    Failed(String),
}

/// Configuration handed to a location service when starting updates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationRequest {
    pub desired_accuracy: f64,
}

/// A continuous positioning feed.
///
/// `start` returns the update channel for this request; updates may be sent
/// from any thread. `stop` ends the feed; the service closes the channel.
pub trait LocationService: Send + Sync {
    fn start(&self, request: LocationRequest) -> mpsc::UnboundedReceiver<LocationUpdate>;
    fn stop(&self);
}

/// Terminal reply of a reverse-geocode lookup. Candidates are ordered
/// best-match first; `error` is set when the lookup failed.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeReply {
    pub placemarks: Vec<Placemark>,
    pub error: Option<String>,
}

/// A one-shot, cancellable place lookup.
///
/// `cancel` is advisory: a completion may still arrive afterwards and the
/// consumer must tolerate it.
pub trait GeocodeService: Send + Sync {
    fn reverse_geocode(&self, location: Location) -> oneshot::Receiver<GeocodeReply>;
    fn cancel(&self);
}

/// Authorization granted by the platform for using positioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationLevel {
    NotDetermined,
    Denied,
    WhenInUse,
    Always,
}

/// The level of access a task needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageRequirement {
    WhenInUse,
    Always,
}

impl AuthorizationLevel {
    pub fn satisfies(&self, usage: UsageRequirement) -> bool {
        match usage {
            UsageRequirement::WhenInUse => {
                matches!(self, AuthorizationLevel::WhenInUse | AuthorizationLevel::Always)
            }
            UsageRequirement::Always => matches!(self, AuthorizationLevel::Always),
        }
    }
}

/// Source of authorization state, and the ability to prompt for it.
///
/// `request` resolves with the level in force after the prompt; sources must
/// resolve even when the user dismisses the prompt.
pub trait AuthorizationSource: Send + Sync {
    fn status(&self) -> AuthorizationLevel;
    fn request(&self, usage: UsageRequirement) -> oneshot::Receiver<AuthorizationLevel>;
}

/// Runs a closure on a designated serial (main-like) context.
///
/// Services with thread-affine APIs are driven through this; the engine
/// depends on the facility but does not implement it.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job: Box<dyn FnOnce() + Send>);
}
