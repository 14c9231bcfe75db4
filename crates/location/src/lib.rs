//! PrivStreams location providers.
//!
//! Two providers over one [`LocationService`] port:
//!
//! - [`LocationUpdates`]: continuous fixes at a requested interval.
//! - [`LastKnownLocation`]: the service's most recent fix, once.
//!
//! Both declare the capability their [`LocationLevel`] needs
//! (`ACCESS_FINE_LOCATION` for [`LocationLevel::Meter`],
//! `ACCESS_COARSE_LOCATION` otherwise), so the engine refuses to start them
//! until the host has granted it. Each fix is emitted as a
//! [`streams::Item`] with the fields listed in [`geo`].
//!
//! ## Architectural Layer
//!
//! **Infrastructure adapter.** Platform location APIs plug in by implementing
//! [`LocationService`]; [`SimulatedLocationService`] replays a recorded track
//! on the tokio runtime. The `streams` and `engine` crates know nothing about
//! location.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`level`] | `LocationLevel`, `Priority`, `LocationRequest` |
//! | [`geo`] | `GeoLocation` and its item fields |
//! | [`service`] | `LocationService` / `LocationListener` port, `LocationEvent` |
//! | [`provider`] | `LocationUpdates`, `LastKnownLocation` |
//! | [`simulated`] | `SimulatedLocationService` |

pub mod geo;
pub mod level;
pub mod provider;
pub mod service;
pub mod simulated;

pub use geo::GeoLocation;
pub use level::{
    LocationLevel, LocationRequest, ParseLevelError, Priority, ACCESS_COARSE_LOCATION,
    ACCESS_FINE_LOCATION,
};
pub use provider::{LastKnownLocation, LocationUpdates};
pub use service::{LocationEvent, LocationListener, LocationService, SuspendCause};
pub use simulated::{SimulatedLocationService, SimulationError};
