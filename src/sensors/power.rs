//! INA219 registers and raw-value conversions.
//!
//! Calibration targets a 0.1 Ω shunt with a 32 V bus range and 2 A maximum
//! current: 0.1 mA per current LSB and 2 mW per power LSB.

use super::PowerReading;

/// Default I2C address (A0 and A1 tied to ground).
pub const DEFAULT_ADDRESS: u8 = 0x40;

pub const REG_CONFIG: u8 = 0x00;
pub const REG_SHUNT_VOLTAGE: u8 = 0x01;
pub const REG_BUS_VOLTAGE: u8 = 0x02;
pub const REG_POWER: u8 = 0x03;
pub const REG_CURRENT: u8 = 0x04;
pub const REG_CALIBRATION: u8 = 0x05;

/// 32 V range, ±320 mV shunt gain, 12-bit ADCs, continuous shunt and bus.
pub const CONFIG_32V_2A: u16 = 0x399F;

/// Calibration value for the 32 V / 2 A setup.
pub const CALIBRATION_32V_2A: u16 = 4096;

pub const CURRENT_LSB_MA: f64 = 0.1;
pub const POWER_LSB_MW: f64 = 2.0;
pub const BUS_VOLTAGE_LSB_V: f64 = 0.004;
pub const SHUNT_VOLTAGE_LSB_MV: f64 = 0.01;

/// Bus voltage register to volts. The low three bits are status flags.
pub fn bus_voltage_v(raw: u16) -> f64 {
    (raw >> 3) as f64 * BUS_VOLTAGE_LSB_V
}

/// Shunt voltage register (signed) to millivolts.
pub fn shunt_voltage_mv(raw: u16) -> f64 {
    raw as i16 as f64 * SHUNT_VOLTAGE_LSB_MV
}

/// Current register (signed) to milliamps.
pub fn current_ma(raw: u16) -> f64 {
    raw as i16 as f64 * CURRENT_LSB_MA
}

/// Power register to milliwatts.
pub fn power_mw(raw: u16) -> f64 {
    raw as f64 * POWER_LSB_MW
}

/// Math overflow flag in the bus voltage register.
pub fn overflowed(bus_raw: u16) -> bool {
    bus_raw & 0x0001 != 0
}

/// Raw register values from one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    pub bus: u16,
    pub shunt: u16,
    pub current: u16,
    pub power: u16,
}

impl RawSample {
    pub fn to_reading(self) -> PowerReading {
        PowerReading {
            voltage_v: bus_voltage_v(self.bus),
            current_ma: current_ma(self.current),
            power_mw: power_mw(self.power),
            shunt_mv: shunt_voltage_mv(self.shunt),
        }
    }
}
