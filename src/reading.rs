//! Data model for sensor readings and webcam snapshots.
//!
//! A [`Reading`] is one timestamped measurement record produced by the weather
//! sensor. Every measured field is independently optional: the station emits
//! its values across several correlated packets, and a field that never
//! arrived is `None`, not zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Battery value reported when the station runs on external power.
///
/// `None` means the battery level is unknown; this sentinel means "no battery
/// in use at all".
pub const BATTERY_EXTERNAL_POWER: i32 = -1;

/// A single weather sensor reading.
///
/// Matches the JSON schema expected by the remote collector: the timestamp is
/// ISO-8601, absent fields are omitted from the serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Timestamp assigned by the producer when the reading was assembled
    pub timestamp: DateTime<Utc>,

    /// Battery level (%), or [`BATTERY_EXTERNAL_POWER`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<i32>,

    /// Temperature in degrees celsius
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Relative humidity (%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,

    /// Dew point in degrees celsius
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dew_point: Option<f64>,

    /// Atmospheric pressure (hPa)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,

    /// Illumination level (lux)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub illumination: Option<f64>,

    /// Wind speed (m/s)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<f64>,

    /// Gust speed (m/s)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gust_speed: Option<f64>,

    /// Wind direction (degrees)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_direction: Option<i32>,

    /// UV index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uv_index: Option<i32>,

    /// Whether rain is currently detected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raining: Option<bool>,

    /// Precipitation rate (mm/h)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precipitation: Option<f64>,
}

impl Reading {
    /// Create an empty reading stamped with the current wall-clock time.
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Create an empty reading with an explicit timestamp.
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            battery: None,
            temperature: None,
            humidity: None,
            dew_point: None,
            pressure: None,
            illumination: None,
            wind_speed: None,
            gust_speed: None,
            wind_direction: None,
            uv_index: None,
            raining: None,
            precipitation: None,
        }
    }

    /// Whether the station reported running on external power.
    pub fn is_externally_powered(&self) -> bool {
        self.battery == Some(BATTERY_EXTERNAL_POWER)
    }
}

impl Default for Reading {
    fn default() -> Self {
        Self::new()
    }
}

/// The closed set of sensor fields the station can report.
///
/// Device packets carry string-keyed values; this enum maps each known key to
/// its typed [`Reading`] field at compile time. Unknown keys are rejected by
/// [`SensorField::from_key`] so the source can log and discard them instead
/// of silently inventing attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorField {
    Battery,
    Temperature,
    Humidity,
    DewPoint,
    Pressure,
    Illumination,
    WindSpeed,
    GustSpeed,
    WindDirection,
    UvIndex,
    Raining,
    Precipitation,
}

impl SensorField {
    /// Get all known sensor fields.
    pub fn all() -> &'static [SensorField] {
        &[
            SensorField::Battery,
            SensorField::Temperature,
            SensorField::Humidity,
            SensorField::DewPoint,
            SensorField::Pressure,
            SensorField::Illumination,
            SensorField::WindSpeed,
            SensorField::GustSpeed,
            SensorField::WindDirection,
            SensorField::UvIndex,
            SensorField::Raining,
            SensorField::Precipitation,
        ]
    }

    /// Map a device wire key to a field, or `None` for unknown keys.
    ///
    /// Keys follow the station's advertisement vocabulary (`speed_1` is
    /// sustained wind, `speed_2` is gust, `direction` is wind direction).
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "battery" => Some(SensorField::Battery),
            "temperature" => Some(SensorField::Temperature),
            "humidity" => Some(SensorField::Humidity),
            "dew_point" => Some(SensorField::DewPoint),
            "pressure" => Some(SensorField::Pressure),
            "illuminance" => Some(SensorField::Illumination),
            "speed_1" => Some(SensorField::WindSpeed),
            "speed_2" => Some(SensorField::GustSpeed),
            "direction" => Some(SensorField::WindDirection),
            "uv_index" => Some(SensorField::UvIndex),
            "raining" => Some(SensorField::Raining),
            "precipitation" => Some(SensorField::Precipitation),
            _ => None,
        }
    }

    /// Apply a numeric value from the device to the matching reading field.
    ///
    /// Integer-typed fields are rounded; the rain flag treats any non-zero
    /// value as "raining".
    pub fn apply(&self, reading: &mut Reading, value: f64) {
        match self {
            SensorField::Battery => reading.battery = Some(value.round() as i32),
            SensorField::Temperature => reading.temperature = Some(value),
            SensorField::Humidity => reading.humidity = Some(value),
            SensorField::DewPoint => reading.dew_point = Some(value),
            SensorField::Pressure => reading.pressure = Some(value),
            SensorField::Illumination => reading.illumination = Some(value),
            SensorField::WindSpeed => reading.wind_speed = Some(value),
            SensorField::GustSpeed => reading.gust_speed = Some(value),
            SensorField::WindDirection => {
                reading.wind_direction = Some(value.round() as i32)
            }
            SensorField::UvIndex => reading.uv_index = Some(value.round() as i32),
            SensorField::Raining => reading.raining = Some(value != 0.0),
            SensorField::Precipitation => reading.precipitation = Some(value),
        }
    }
}

/// A single webcam snapshot.
///
/// Snapshots are latest-wins: they flow through the single-slot buffer and an
/// older snapshot overwritten before delivery is simply dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Timestamp when the snapshot was captured
    pub timestamp: DateTime<Utc>,

    /// Raw image bytes
    pub image_data: Vec<u8>,

    /// Image MIME type, e.g. `image/jpeg`
    pub image_type: String,
}

impl Snapshot {
    /// Create a snapshot stamped with the current wall-clock time.
    pub fn new(image_data: Vec<u8>, image_type: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            image_data,
            image_type: image_type.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_reading_has_timestamp_and_no_fields() {
        let reading = Reading::new();
        assert!(reading.battery.is_none());
        assert!(reading.temperature.is_none());
        assert!(reading.raining.is_none());
        assert!(!reading.is_externally_powered());
    }

    #[test]
    fn test_external_power_sentinel() {
        let mut reading = Reading::new();
        reading.battery = Some(BATTERY_EXTERNAL_POWER);
        assert!(reading.is_externally_powered());

        reading.battery = Some(85);
        assert!(!reading.is_externally_powered());
    }

    #[test]
    fn test_serialization_omits_absent_fields() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let mut reading = Reading::at(ts);
        reading.temperature = Some(21.5);

        let json = serde_json::to_value(&reading).unwrap();
        let obj = json.as_object().unwrap();

        assert_eq!(obj.len(), 2); // timestamp + temperature only
        assert_eq!(obj["temperature"], 21.5);
        assert!(obj["timestamp"].as_str().unwrap().starts_with("2025-06-01T12:00:00"));
    }

    #[test]
    fn test_roundtrip_full_reading() {
        let mut reading = Reading::new();
        reading.battery = Some(92);
        reading.temperature = Some(-3.2);
        reading.humidity = Some(78.0);
        reading.wind_direction = Some(270);
        reading.raining = Some(true);

        let json = serde_json::to_string(&reading).unwrap();
        let parsed: Reading = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, reading);
    }

    #[test]
    fn test_sensor_field_from_key() {
        assert_eq!(SensorField::from_key("speed_1"), Some(SensorField::WindSpeed));
        assert_eq!(SensorField::from_key("speed_2"), Some(SensorField::GustSpeed));
        assert_eq!(SensorField::from_key("illuminance"), Some(SensorField::Illumination));
        assert_eq!(SensorField::from_key("direction"), Some(SensorField::WindDirection));
        assert_eq!(SensorField::from_key("co2"), None);
        assert_eq!(SensorField::from_key(""), None);
    }

    #[test]
    fn test_sensor_field_all_keys_resolve() {
        // Every variant must be reachable from at least one wire key.
        let resolved: Vec<SensorField> = [
            "battery",
            "temperature",
            "humidity",
            "dew_point",
            "pressure",
            "illuminance",
            "speed_1",
            "speed_2",
            "direction",
            "uv_index",
            "raining",
            "precipitation",
        ]
        .iter()
        .filter_map(|k| SensorField::from_key(k))
        .collect();
        assert_eq!(resolved.len(), SensorField::all().len());
    }

    #[test]
    fn test_sensor_field_apply() {
        let mut reading = Reading::new();

        SensorField::Temperature.apply(&mut reading, 19.25);
        SensorField::WindDirection.apply(&mut reading, 89.6);
        SensorField::UvIndex.apply(&mut reading, 3.0);
        SensorField::Raining.apply(&mut reading, 1.0);
        SensorField::Battery.apply(&mut reading, -1.0);

        assert_eq!(reading.temperature, Some(19.25));
        assert_eq!(reading.wind_direction, Some(90));
        assert_eq!(reading.uv_index, Some(3));
        assert_eq!(reading.raining, Some(true));
        assert!(reading.is_externally_powered());
    }

    #[test]
    fn test_snapshot_new() {
        let snapshot = Snapshot::new(vec![0xff, 0xd8, 0xff], "image/jpeg");
        assert_eq!(snapshot.image_data, vec![0xff, 0xd8, 0xff]);
        assert_eq!(snapshot.image_type, "image/jpeg");
    }
}
