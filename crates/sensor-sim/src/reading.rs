//! Sensor Reading Types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stable sensor identifier, `1..=N`
pub type SensorId = u32;

/// One cycle's readings keyed by sensor, at most one per sensor
pub type Batch = BTreeMap<SensorId, SensorReading>;

/// A single environmental reading for one sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor_id: SensorId,
    /// Air temperature (°C)
    pub temperature: i32,
    /// Wind speed (km/h)
    pub wind: i32,
    /// Relative humidity (%)
    pub relative_humidity: i32,
    /// CO2 concentration (ppm)
    pub co2: i32,
}

impl SensorReading {
    /// Create a reading with explicit values
    pub fn new(sensor_id: SensorId, temperature: i32, wind: i32, relative_humidity: i32, co2: i32) -> Self {
        Self {
            sensor_id,
            temperature,
            wind,
            relative_humidity,
            co2,
        }
    }
}
