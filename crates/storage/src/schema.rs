//! Sensor Table Schema

use sensor_sim::{SensorId, SensorReading};
use serde::{Deserialize, Serialize};

/// Name of the table holding the current reading per sensor
pub const SENSOR_TABLE: &str = "LeedsSensorsData";

pub(crate) const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS LeedsSensorsData (
    sensor_id   INTEGER PRIMARY KEY NOT NULL,
    Temperature INTEGER NOT NULL,
    Wind        INTEGER NOT NULL,
    R_Humidity  INTEGER NOT NULL,
    CO2         INTEGER NOT NULL
)";

pub(crate) const ROW_EXISTS: &str = "SELECT 1 FROM LeedsSensorsData WHERE sensor_id = ?1";

pub(crate) const UPDATE_ROW: &str = "UPDATE LeedsSensorsData \
    SET Temperature = ?2, Wind = ?3, R_Humidity = ?4, CO2 = ?5 \
    WHERE sensor_id = ?1";

pub(crate) const INSERT_ROW: &str = "INSERT INTO LeedsSensorsData \
    (sensor_id, Temperature, Wind, R_Humidity, CO2) \
    VALUES (?1, ?2, ?3, ?4, ?5)";

pub(crate) const SELECT_ROWS: &str = "SELECT sensor_id, Temperature, Wind, R_Humidity, CO2 \
    FROM LeedsSensorsData ORDER BY sensor_id";

pub(crate) const COUNT_ROWS: &str = "SELECT COUNT(*) FROM LeedsSensorsData";

/// Persisted row, keyed by `sensor_id`
///
/// Field names follow the table's column names when serialized so change
/// payloads carry the same shape as the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SensorRow {
    pub sensor_id: SensorId,
    #[serde(rename = "Temperature")]
    #[sqlx(rename = "Temperature")]
    pub temperature: i32,
    #[serde(rename = "Wind")]
    #[sqlx(rename = "Wind")]
    pub wind: i32,
    #[serde(rename = "R_Humidity")]
    #[sqlx(rename = "R_Humidity")]
    pub relative_humidity: i32,
    #[serde(rename = "CO2")]
    #[sqlx(rename = "CO2")]
    pub co2: i32,
}

impl From<&SensorReading> for SensorRow {
    fn from(reading: &SensorReading) -> Self {
        Self {
            sensor_id: reading.sensor_id,
            temperature: reading.temperature,
            wind: reading.wind,
            relative_humidity: reading.relative_humidity,
            co2: reading.co2,
        }
    }
}
