//! A single location fix.

use serde::{Deserialize, Serialize};
use streams::{Item, Timestamp};

/// Item field holding the latitude in degrees.
pub const LATITUDE: &str = "lat";
/// Item field holding the longitude in degrees.
pub const LONGITUDE: &str = "lng";
/// Item field holding the horizontal accuracy radius in meters.
pub const ACCURACY: &str = "accuracy";
/// Item field holding the ground speed in meters per second, or null.
pub const SPEED: &str = "speed";
/// Item field holding the bearing in degrees, or null.
pub const BEARING: &str = "bearing";
/// Item field holding the fix time in milliseconds since the Unix epoch.
pub const TIME: &str = "time";

/// A position reported by a [`crate::LocationService`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub speed: Option<f64>,
    pub bearing: Option<f64>,
    pub time: Timestamp,
}

impl GeoLocation {
    pub fn new(latitude: f64, longitude: f64, accuracy: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
            speed: None,
            bearing: None,
            time: Timestamp::now(),
        }
    }

    pub fn with_motion(mut self, speed: f64, bearing: f64) -> Self {
        self.speed = Some(speed);
        self.bearing = Some(bearing);
        self
    }

    pub fn at(mut self, time: Timestamp) -> Self {
        self.time = time;
        self
    }
}

impl From<GeoLocation> for Item {
    fn from(fix: GeoLocation) -> Self {
        Item::new()
            .with(LATITUDE, fix.latitude)
            .with(LONGITUDE, fix.longitude)
            .with(ACCURACY, fix.accuracy)
            .with(SPEED, fix.speed)
            .with(BEARING, fix.bearing)
            .with(TIME, fix.time.as_datetime().timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn fix_becomes_an_item_with_named_fields() {
        let time = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let item: Item = GeoLocation::new(40.4433, -79.9436, 12.5)
            .with_motion(1.5, 90.0)
            .at(Timestamp::from_utc(time))
            .into();

        assert_eq!(item.get_f64(LATITUDE), Some(40.4433));
        assert_eq!(item.get_f64(LONGITUDE), Some(-79.9436));
        assert_eq!(item.get_f64(ACCURACY), Some(12.5));
        assert_eq!(item.get_f64(SPEED), Some(1.5));
        assert_eq!(item.get_f64(BEARING), Some(90.0));
        assert_eq!(
            item.get(TIME).and_then(|v| v.as_i64()),
            Some(time.timestamp_millis())
        );
    }

    #[test]
    fn missing_motion_is_null() {
        let item: Item = GeoLocation::new(0.0, 0.0, 100.0).into();
        assert_eq!(item.get(SPEED), Some(&serde_json::Value::Null));
        assert_eq!(item.get_f64(BEARING), None);
    }
}
