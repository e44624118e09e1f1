//! Sensor Simulation
//!
//! Produces one synthetic environmental reading per sensor each cycle.

mod generator;
mod reading;

pub use generator::{generate, generate_with, CO2_RANGE, HUMIDITY_RANGE, TEMPERATURE_RANGE, WIND_RANGE};
pub use reading::{Batch, SensorId, SensorReading};
