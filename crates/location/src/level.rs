//! Location granularity and the update request derived from it.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use streams::Capability;
use thiserror::Error;

/// Capability needed for [`LocationLevel::Meter`].
pub const ACCESS_FINE_LOCATION: &str = "ACCESS_FINE_LOCATION";

/// Capability needed for every level coarser than [`LocationLevel::Meter`].
pub const ACCESS_COARSE_LOCATION: &str = "ACCESS_COARSE_LOCATION";

/// How precisely the caller needs to know where the device is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationLevel {
    Country,
    City,
    Neighborhood,
    Building,
    Meter,
}

impl LocationLevel {
    /// The capability a provider at this level requires.
    pub fn required_capability(self) -> Capability {
        match self {
            LocationLevel::Meter => Capability::from_static(ACCESS_FINE_LOCATION),
            _ => Capability::from_static(ACCESS_COARSE_LOCATION),
        }
    }

    /// Power/accuracy trade-off requested from the location service.
    pub fn priority(self) -> Priority {
        match self {
            LocationLevel::Meter => Priority::HighAccuracy,
            LocationLevel::Building => Priority::BalancedPower,
            _ => Priority::LowPower,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LocationLevel::Country => "country",
            LocationLevel::City => "city",
            LocationLevel::Neighborhood => "neighborhood",
            LocationLevel::Building => "building",
            LocationLevel::Meter => "meter",
        }
    }
}

impl fmt::Display for LocationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no [`LocationLevel`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown location level '{0}'; expected country, city, neighborhood, building or meter")]
pub struct ParseLevelError(String);

impl FromStr for LocationLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "country" => Ok(LocationLevel::Country),
            "city" => Ok(LocationLevel::City),
            "neighborhood" => Ok(LocationLevel::Neighborhood),
            "building" => Ok(LocationLevel::Building),
            "meter" => Ok(LocationLevel::Meter),
            _ => Err(ParseLevelError(s.to_owned())),
        }
    }
}

/// Power/accuracy trade-off for location updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    HighAccuracy,
    BalancedPower,
    LowPower,
}

/// Parameters handed to [`crate::LocationService::request_updates`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRequest {
    /// Preferred time between updates.
    pub interval: Duration,
    /// Shortest time between updates the caller accepts; half the interval.
    pub fastest_interval: Duration,
    pub priority: Priority,
}

impl LocationRequest {
    pub fn new(interval: Duration, level: LocationLevel) -> Self {
        Self {
            interval,
            fastest_interval: interval / 2,
            priority: level.priority(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_meter_needs_fine_location() {
        assert_eq!(
            LocationLevel::Meter.required_capability().as_str(),
            ACCESS_FINE_LOCATION
        );
        for level in [
            LocationLevel::Country,
            LocationLevel::City,
            LocationLevel::Neighborhood,
            LocationLevel::Building,
        ] {
            assert_eq!(level.required_capability().as_str(), ACCESS_COARSE_LOCATION);
        }
    }

    #[test]
    fn request_halves_the_interval_and_follows_the_level() {
        let request = LocationRequest::new(Duration::from_millis(1000), LocationLevel::Building);
        assert_eq!(request.fastest_interval, Duration::from_millis(500));
        assert_eq!(request.priority, Priority::BalancedPower);

        assert_eq!(
            LocationRequest::new(Duration::from_secs(1), LocationLevel::Meter).priority,
            Priority::HighAccuracy
        );
        assert_eq!(
            LocationRequest::new(Duration::from_secs(1), LocationLevel::City).priority,
            Priority::LowPower
        );
    }

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!("Meter".parse(), Ok(LocationLevel::Meter));
        assert_eq!(" building ".parse(), Ok(LocationLevel::Building));
        assert!("street".parse::<LocationLevel>().is_err());
    }

    #[test]
    fn levels_deserialize_from_lowercase_names() {
        let level: LocationLevel = serde_json::from_str("\"neighborhood\"").unwrap();
        assert_eq!(level, LocationLevel::Neighborhood);
        assert_eq!(level.to_string(), "neighborhood");
    }
}
