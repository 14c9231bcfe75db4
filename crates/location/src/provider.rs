//! Location providers.

use std::sync::Arc;
use std::time::Duration;

use streams::{
    Cardinality, Emitter, Provider, ProviderContext, ProviderDescriptor, ProviderName, QueryError,
};

use crate::{LocationEvent, LocationLevel, LocationListener, LocationRequest, LocationService};

// ---------------------------------------------------------------------------
// Continuous updates
// ---------------------------------------------------------------------------

/// Continuous stream of fixes at a requested interval and granularity.
///
/// Connects to the service on start and requests updates once connected. A
/// failed connection finishes the stream without items. Reaching any terminal
/// state removes the updates and disconnects.
pub struct LocationUpdates {
    descriptor: ProviderDescriptor,
    service: Arc<dyn LocationService>,
    request: LocationRequest,
}

impl LocationUpdates {
    pub const NAME: &'static str = "location_updates";

    /// Returns [`QueryError::InvalidParameter`] if `interval` is zero.
    pub fn new(
        service: Arc<dyn LocationService>,
        interval: Duration,
        level: LocationLevel,
    ) -> Result<Self, QueryError> {
        if interval.is_zero() {
            return Err(QueryError::invalid_parameter(
                "interval",
                "must be greater than zero",
            ));
        }

        let descriptor = ProviderDescriptor::new(
            ProviderName::from_static(Self::NAME),
            Cardinality::Multi,
        )
        .with_parameter("interval_ms", duration_millis(interval))
        .with_parameter("level", level.as_str())
        .requiring(level.required_capability());

        Ok(Self {
            descriptor,
            service,
            request: LocationRequest::new(interval, level),
        })
    }

    pub fn request(&self) -> LocationRequest {
        self.request
    }
}

impl Provider for LocationUpdates {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn provide(&self, ctx: ProviderContext) -> Result<(), QueryError> {
        tracing::debug!(
            session = %ctx.session(),
            interval_ms = duration_millis(self.request.interval),
            priority = ?self.request.priority,
            "Connecting to location service"
        );
        let listener = UpdatesListener {
            emitter: ctx.into_emitter(),
            service: Arc::clone(&self.service),
            request: self.request,
        };
        self.service.connect(Arc::new(listener));
        Ok(())
    }

    fn release(&self) {
        tracing::debug!("Removing location updates");
        self.service.remove_updates();
        self.service.disconnect();
    }
}

/// Bridges service callbacks to the source's emitter.
struct UpdatesListener {
    emitter: Emitter,
    service: Arc<dyn LocationService>,
    request: LocationRequest,
}

impl UpdatesListener {
    fn handle_event(&self, event: LocationEvent) {
        match event {
            LocationEvent::Connected => {
                if !self.emitter.is_active() {
                    tracing::debug!(source = %self.emitter.source_id(), "Connected after stop; ignoring");
                    return;
                }
                tracing::debug!(source = %self.emitter.source_id(), "Location service connected");
                self.service.request_updates(self.request);
            }
            LocationEvent::Suspended(cause) => {
                tracing::debug!(source = %self.emitter.source_id(), %cause, "Location service connection suspended");
            }
            LocationEvent::ConnectionFailed(reason) => {
                tracing::warn!(source = %self.emitter.source_id(), %reason, "Not connected to location service");
                self.emitter.finish();
            }
            LocationEvent::LocationChanged(fix) => {
                if let Err(err) = self.emitter.output(fix.into()) {
                    tracing::warn!(source = %self.emitter.source_id(), error = %err, "Location fix rejected downstream; updates stopped");
                }
            }
        }
    }
}

impl LocationListener for UpdatesListener {
    fn on_event(&self, event: LocationEvent) {
        self.handle_event(event);
    }
}

// ---------------------------------------------------------------------------
// Last known fix
// ---------------------------------------------------------------------------

/// Single-shot provider returning the service's most recent fix.
///
/// Finishes without an item when the service has never seen a fix.
pub struct LastKnownLocation {
    descriptor: ProviderDescriptor,
    service: Arc<dyn LocationService>,
}

impl LastKnownLocation {
    pub const NAME: &'static str = "last_known_location";

    pub fn new(service: Arc<dyn LocationService>, level: LocationLevel) -> Self {
        let descriptor = ProviderDescriptor::new(
            ProviderName::from_static(Self::NAME),
            Cardinality::Single,
        )
        .with_parameter("level", level.as_str())
        .requiring(level.required_capability());

        Self {
            descriptor,
            service,
        }
    }
}

impl Provider for LastKnownLocation {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn provide(&self, ctx: ProviderContext) -> Result<(), QueryError> {
        match self.service.last_known() {
            Some(fix) => ctx.emitter().output(fix.into()),
            None => {
                tracing::debug!("No last known location");
                ctx.emitter().finish();
                Ok(())
            }
        }
    }
}

pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_saturate_instead_of_truncating() {
        assert_eq!(duration_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_millis(Duration::MAX), u64::MAX);
    }
}
