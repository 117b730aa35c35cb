//! INA219 power monitor over I2C.

use super::power::{
    self, RawSample, CALIBRATION_32V_2A, CONFIG_32V_2A, REG_BUS_VOLTAGE, REG_CALIBRATION,
    REG_CONFIG, REG_CURRENT, REG_POWER, REG_SHUNT_VOLTAGE,
};
use super::{PowerMonitor, PowerReading, SensorError};
use esp_idf_hal::delay::BLOCK;
use esp_idf_hal::i2c::I2cDriver;
use log::{debug, warn};

pub struct Ina219<'d> {
    i2c: I2cDriver<'d>,
    address: u8,
}

impl<'d> Ina219<'d> {
    /// Configure the chip for the 32 V / 2 A range.
    pub fn new(i2c: I2cDriver<'d>, address: u8) -> Result<Self, SensorError> {
        let mut ina = Self { i2c, address };
        ina.write_register(REG_CONFIG, CONFIG_32V_2A)?;
        ina.write_register(REG_CALIBRATION, CALIBRATION_32V_2A)?;
        debug!("INA219 configured at 0x{:02x}", address);
        Ok(ina)
    }

    fn write_register(&mut self, reg: u8, value: u16) -> Result<(), SensorError> {
        let [hi, lo] = value.to_be_bytes();
        self.i2c.write(self.address, &[reg, hi, lo], BLOCK)?;
        Ok(())
    }

    fn read_register(&mut self, reg: u8) -> Result<u16, SensorError> {
        let mut buf = [0u8; 2];
        self.i2c.write_read(self.address, &[reg], &mut buf, BLOCK)?;
        Ok(u16::from_be_bytes(buf))
    }
}

impl PowerMonitor for Ina219<'_> {
    fn read(&mut self) -> Result<PowerReading, SensorError> {
        // The calibration register is cleared by brown-outs
        self.write_register(REG_CALIBRATION, CALIBRATION_32V_2A)?;

        let sample = RawSample {
            bus: self.read_register(REG_BUS_VOLTAGE)?,
            shunt: self.read_register(REG_SHUNT_VOLTAGE)?,
            current: self.read_register(REG_CURRENT)?,
            power: self.read_register(REG_POWER)?,
        };
        if power::overflowed(sample.bus) {
            warn!("INA219 math overflow, current and power are unreliable");
        }
        Ok(sample.to_reading())
    }
}
