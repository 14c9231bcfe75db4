//! The port location providers drive.
//!
//! A [`LocationService`] wraps whatever actually produces fixes: a platform
//! location API, a GPS daemon, or [`crate::SimulatedLocationService`]. It is
//! asynchronous by nature: the provider connects, and the service reports back
//! through [`LocationListener::on_event`] from its own thread or task.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{GeoLocation, LocationRequest};

/// Why a service connection was suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspendCause {
    NetworkLost,
    ServiceDisconnected,
    Other,
}

impl fmt::Display for SuspendCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SuspendCause::NetworkLost => "network lost",
            SuspendCause::ServiceDisconnected => "service disconnected",
            SuspendCause::Other => "other",
        };
        f.write_str(s)
    }
}

/// Callbacks delivered by a [`LocationService`].
#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    /// The connection is ready; updates may be requested.
    Connected,
    /// The connection dropped temporarily. The service reconnects on its own.
    Suspended(SuspendCause),
    /// The connection could not be established.
    ConnectionFailed(String),
    /// A new fix is available.
    LocationChanged(GeoLocation),
}

/// Receives [`LocationEvent`]s from a connected service.
pub trait LocationListener: Send + Sync {
    fn on_event(&self, event: LocationEvent);
}

/// External source of location fixes.
///
/// Implementations must tolerate `remove_updates` and `disconnect` being
/// called when no updates are active or no connection exists.
pub trait LocationService: Send + Sync {
    /// Starts connecting. The outcome arrives as [`LocationEvent::Connected`]
    /// or [`LocationEvent::ConnectionFailed`] on `listener`.
    fn connect(&self, listener: Arc<dyn LocationListener>);

    /// Begins delivering [`LocationEvent::LocationChanged`] to the connected
    /// listener.
    fn request_updates(&self, request: LocationRequest);

    /// Stops delivering fixes.
    fn remove_updates(&self);

    /// Drops the connection and the listener.
    fn disconnect(&self);

    /// The most recent fix known to the service, if any. Does not require a
    /// connection.
    fn last_known(&self) -> Option<GeoLocation>;
}
