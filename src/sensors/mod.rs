//! Sensor collaborators.
//!
//! This module contains:
//! - [`EnvironmentSensor`] and [`PowerMonitor`]: the traits the controller reads
//! - [`SurrogateEnvironment`]: random readings for nodes with no climate sensor
//! - [`power`]: INA219 register constants and raw-value conversions
//! - [`Ina219`]: the I2C power-monitor driver (ESP32 only)

pub mod power;

#[cfg(feature = "esp32")]
mod ina219;

#[cfg(feature = "esp32")]
pub use ina219::Ina219;

use rand_core::RngCore;
use std::fmt;

/// Temperature and relative humidity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentReading {
    pub temperature_c: f64,
    pub humidity_pct: f64,
}

/// One power-monitor sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerReading {
    pub voltage_v: f64,
    pub current_ma: f64,
    pub power_mw: f64,
    pub shunt_mv: f64,
}

impl PowerReading {
    /// The reading reported when no monitor is fitted or a read fails.
    pub const fn zero() -> Self {
        Self {
            voltage_v: 0.0,
            current_ma: 0.0,
            power_mw: 0.0,
            shunt_mv: 0.0,
        }
    }
}

/// Source of temperature and humidity values.
pub trait EnvironmentSensor {
    fn read(&mut self) -> Result<EnvironmentReading, SensorError>;
}

/// Source of bus voltage, current and power.
pub trait PowerMonitor {
    fn read(&mut self) -> Result<PowerReading, SensorError>;
}

/// Sensor errors.
#[derive(Debug)]
pub enum SensorError {
    /// No sensor of this kind is attached.
    NotFitted,
    /// Bus transaction failed.
    Bus(String),
    /// ESP-IDF I2C driver error.
    #[cfg(feature = "esp32")]
    I2c(esp_idf_sys::EspError),
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFitted => write!(f, "sensor not fitted"),
            Self::Bus(msg) => write!(f, "bus error: {}", msg),
            #[cfg(feature = "esp32")]
            Self::I2c(e) => write!(f, "I2C error: {:?}", e),
        }
    }
}

impl std::error::Error for SensorError {}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for SensorError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::I2c(e)
    }
}

/// Temperature range the surrogate reports, in °C.
pub const TEMPERATURE_RANGE: (f64, f64) = (-40.0, 80.0);
/// Humidity range the surrogate reports, in %.
pub const HUMIDITY_RANGE: (f64, f64) = (0.0, 100.0);

const BASE_TEMPERATURE_C: f64 = 25.0;
const TEMPERATURE_JITTER_C: f64 = 3.0;
const BASE_HUMIDITY_PCT: f64 = 60.0;
const HUMIDITY_JITTER_PCT: f64 = 10.0;

/// Build a surrogate reading from two deltas.
///
/// Deltas are added to the base values and the sums clamped to the sensor
/// ranges, so any delta yields an in-range reading.
pub fn surrogate_reading(temperature_delta: f64, humidity_delta: f64) -> EnvironmentReading {
    EnvironmentReading {
        temperature_c: (BASE_TEMPERATURE_C + temperature_delta)
            .clamp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1),
        humidity_pct: (BASE_HUMIDITY_PCT + humidity_delta)
            .clamp(HUMIDITY_RANGE.0, HUMIDITY_RANGE.1),
    }
}

/// Map a random word onto `[-span, span]`.
fn spread(word: u32, span: f64) -> f64 {
    (word as f64 / u32::MAX as f64) * 2.0 * span - span
}

/// Stand-in climate sensor producing jittered values around 25 °C / 60 %.
pub struct SurrogateEnvironment<G: RngCore> {
    rng: G,
}

impl<G: RngCore> SurrogateEnvironment<G> {
    pub fn new(rng: G) -> Self {
        Self { rng }
    }
}

impl<G: RngCore> EnvironmentSensor for SurrogateEnvironment<G> {
    fn read(&mut self) -> Result<EnvironmentReading, SensorError> {
        let temperature_delta = spread(self.rng.next_u32(), TEMPERATURE_JITTER_C);
        let humidity_delta = spread(self.rng.next_u32(), HUMIDITY_JITTER_PCT);
        Ok(surrogate_reading(temperature_delta, humidity_delta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// RNG that always yields the same word.
    struct Constant(u32);

    impl RngCore for Constant {
        fn next_u32(&mut self) -> u32 {
            self.0
        }

        fn next_u64(&mut self) -> u64 {
            self.0 as u64
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(self.0 as u8);
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    fn in_range(reading: &EnvironmentReading) -> bool {
        (TEMPERATURE_RANGE.0..=TEMPERATURE_RANGE.1).contains(&reading.temperature_c)
            && (HUMIDITY_RANGE.0..=HUMIDITY_RANGE.1).contains(&reading.humidity_pct)
    }

    #[test]
    fn test_surrogate_extremes_of_jitter() {
        let low = SurrogateEnvironment::new(Constant(0)).read().unwrap();
        assert!((low.temperature_c - 22.0).abs() < 1e-9);
        assert!((low.humidity_pct - 50.0).abs() < 1e-9);

        let high = SurrogateEnvironment::new(Constant(u32::MAX)).read().unwrap();
        assert!((high.temperature_c - 28.0).abs() < 1e-9);
        assert!((high.humidity_pct - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_surrogate_clamps_after_adding_delta() {
        let hot = surrogate_reading(500.0, 500.0);
        assert_eq!(hot.temperature_c, 80.0);
        assert_eq!(hot.humidity_pct, 100.0);

        let cold = surrogate_reading(-500.0, -500.0);
        assert_eq!(cold.temperature_c, -40.0);
        assert_eq!(cold.humidity_pct, 0.0);
    }

    #[test]
    fn test_surrogate_always_in_range() {
        for word in (0..=u32::MAX).step_by(7_919_993) {
            let reading = SurrogateEnvironment::new(Constant(word)).read().unwrap();
            assert!(in_range(&reading), "{:?}", reading);
        }
        for delta in [-1e6, -60.0, -3.0, 0.0, 3.0, 55.0, 1e6] {
            assert!(in_range(&surrogate_reading(delta, delta)));
        }
    }

    #[test]
    fn test_zero_power_reading() {
        let zero = PowerReading::zero();
        assert_eq!(zero.voltage_v, 0.0);
        assert_eq!(zero.current_ma, 0.0);
        assert_eq!(zero.power_mw, 0.0);
    }
}
