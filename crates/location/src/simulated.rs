//! A [`LocationService`] that replays a fixed track on the tokio runtime.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use streams::Timestamp;
use thiserror::Error;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::task::JoinHandle;

use crate::provider::duration_millis;
use crate::{GeoLocation, LocationEvent, LocationListener, LocationRequest, LocationService};

/// Shortest replay period; `tokio::time::interval` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Simulated location service must be created inside a tokio runtime")]
    NoRuntime(#[from] TryCurrentError),

    #[error("Simulated track has no fixes")]
    EmptyTrack,
}

#[derive(Default)]
struct Inner {
    listener: Option<Arc<dyn LocationListener>>,
    updates: Option<JoinHandle<()>>,
    last: Option<GeoLocation>,
}

/// Replays `track` in a loop, one fix per requested interval, stamping each
/// with the current time.
///
/// Callbacks run on runtime worker tasks, never while the service's own lock
/// is held, so listeners may call back into the service.
pub struct SimulatedLocationService {
    runtime: Handle,
    track: Arc<[GeoLocation]>,
    connect_failure: Option<String>,
    inner: Arc<Mutex<Inner>>,
}

impl SimulatedLocationService {
    /// Creates a service on the current runtime. The first fix of the track is
    /// the initial last known location.
    pub fn new(track: Vec<GeoLocation>) -> Result<Self, SimulationError> {
        let runtime = Handle::try_current()?;
        let first = track.first().cloned().ok_or(SimulationError::EmptyTrack)?;
        Ok(Self {
            runtime,
            track: track.into(),
            connect_failure: None,
            inner: Arc::new(Mutex::new(Inner {
                last: Some(first),
                ..Inner::default()
            })),
        })
    }

    /// Makes every connection attempt fail with `reason`.
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.connect_failure = Some(reason.into());
        self
    }

    /// A short walk around a city block.
    pub fn sample_track() -> Vec<GeoLocation> {
        [
            (40.44335, -79.94435),
            (40.44361, -79.94402),
            (40.44389, -79.94371),
            (40.44362, -79.94330),
            (40.44334, -79.94365),
            (40.44320, -79.94400),
        ]
        .into_iter()
        .map(|(lat, lng)| GeoLocation::new(lat, lng, 8.0).with_motion(1.4, 45.0))
        .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LocationService for SimulatedLocationService {
    fn connect(&self, listener: Arc<dyn LocationListener>) {
        self.lock().listener = Some(Arc::clone(&listener));
        let event = match &self.connect_failure {
            Some(reason) => LocationEvent::ConnectionFailed(reason.clone()),
            None => LocationEvent::Connected,
        };
        self.runtime.spawn(async move {
            listener.on_event(event);
        });
    }

    fn request_updates(&self, request: LocationRequest) {
        let inner = Arc::clone(&self.inner);
        let track = Arc::clone(&self.track);
        let task = self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(request.interval.max(MIN_INTERVAL));
            for fix in track.iter().cycle() {
                ticker.tick().await;
                let fix = fix.clone().at(Timestamp::now());
                let listener = {
                    let mut inner = lock(&inner);
                    inner.last = Some(fix.clone());
                    inner.listener.clone()
                };
                match listener {
                    Some(listener) => listener.on_event(LocationEvent::LocationChanged(fix)),
                    None => break,
                }
            }
        });

        if let Some(previous) = self.lock().updates.replace(task) {
            previous.abort();
        }
        tracing::debug!(
            interval_ms = duration_millis(request.interval),
            priority = ?request.priority,
            "Simulated location updates started"
        );
    }

    fn remove_updates(&self) {
        if let Some(task) = self.lock().updates.take() {
            task.abort();
            tracing::debug!("Simulated location updates stopped");
        }
    }

    fn disconnect(&self) {
        self.remove_updates();
        self.lock().listener = None;
    }

    fn last_known(&self) -> Option<GeoLocation> {
        self.lock().last.clone()
    }
}
