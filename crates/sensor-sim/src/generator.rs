//! Reading Generator

use crate::reading::{Batch, SensorId, SensorReading};
use rand::Rng;
use std::ops::RangeInclusive;
use tracing::debug;

/// Temperature bounds (°C)
pub const TEMPERATURE_RANGE: RangeInclusive<i32> = 8..=15;
/// Wind speed bounds (km/h)
pub const WIND_RANGE: RangeInclusive<i32> = 15..=25;
/// Relative humidity bounds (%)
pub const HUMIDITY_RANGE: RangeInclusive<i32> = 40..=70;
/// CO2 bounds (ppm)
pub const CO2_RANGE: RangeInclusive<i32> = 500..=1500;

/// Generate one reading for each sensor `1..=sensor_count` using the thread RNG
pub fn generate(sensor_count: u32) -> Batch {
    generate_with(&mut rand::thread_rng(), sensor_count)
}

/// Generate a batch from the given RNG
///
/// Every field is drawn independently and uniformly from its inclusive range.
/// A count of zero yields an empty batch.
pub fn generate_with<R: Rng>(rng: &mut R, sensor_count: u32) -> Batch {
    let batch: Batch = (1..=sensor_count)
        .map(|sensor_id| (sensor_id, draw(rng, sensor_id)))
        .collect();

    debug!("Generated {} sensor readings", batch.len());
    batch
}

fn draw<R: Rng>(rng: &mut R, sensor_id: SensorId) -> SensorReading {
    SensorReading {
        sensor_id,
        temperature: rng.gen_range(TEMPERATURE_RANGE),
        wind: rng.gen_range(WIND_RANGE),
        relative_humidity: rng.gen_range(HUMIDITY_RANGE),
        co2: rng.gen_range(CO2_RANGE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn in_bounds(reading: &SensorReading) -> bool {
        TEMPERATURE_RANGE.contains(&reading.temperature)
            && WIND_RANGE.contains(&reading.wind)
            && HUMIDITY_RANGE.contains(&reading.relative_humidity)
            && CO2_RANGE.contains(&reading.co2)
    }

    #[test]
    fn test_generate_keys_one_through_count() {
        let batch = generate(5);

        assert_eq!(batch.len(), 5);
        assert_eq!(batch.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        for (id, reading) in &batch {
            assert_eq!(*id, reading.sensor_id);
            assert!(in_bounds(reading), "out of bounds: {:?}", reading);
        }
    }

    #[test]
    fn test_generate_zero_is_empty() {
        assert!(generate(0).is_empty());
    }

    #[test]
    fn test_seeded_generation_is_repeatable() {
        let a = generate_with(&mut StdRng::seed_from_u64(7), 4);
        let b = generate_with(&mut StdRng::seed_from_u64(7), 4);
        assert_eq!(a, b);
    }

    #[test]
    fn test_bounds_are_reachable() {
        // Temperature has only 8 values; 2000 draws should hit both ends
        let mut rng = StdRng::seed_from_u64(42);
        let batch = generate_with(&mut rng, 2000);

        let temps: Vec<i32> = batch.values().map(|r| r.temperature).collect();
        assert!(temps.contains(&8));
        assert!(temps.contains(&15));
    }

    proptest! {
        #[test]
        fn prop_every_reading_in_bounds(count in 1u32..200, seed in any::<u64>()) {
            let batch = generate_with(&mut StdRng::seed_from_u64(seed), count);

            prop_assert_eq!(batch.len(), count as usize);
            prop_assert_eq!(batch.keys().next().copied(), Some(1));
            prop_assert_eq!(batch.keys().last().copied(), Some(count));
            for reading in batch.values() {
                prop_assert!(in_bounds(reading));
            }
        }
    }
}
