//! Power logger firmware.
//!
//! Samples an INA219 (I2C0, SDA GPIO21, SCL GPIO22, address 0x40) every
//! 100 ms for 600 samples and prints the CSV on the serial console:
//!
//! ```bash
//! cargo espflash flash --bin power-logger --features esp32 --release --monitor | tee power.csv
//! ```

#[cfg(feature = "esp32")]
fn run() -> Result<(), Box<dyn std::error::Error>> {
    use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_hal::units::Hertz;
    use espnow_sensor_node::instrument::{CsvRow, PowerLogConfig, PowerLogger, SampleLog};
    use espnow_sensor_node::link::PowerSample;
    use espnow_sensor_node::platform::SystemClock;
    use espnow_sensor_node::sensors::{power, Ina219};

    let peripherals = Peripherals::take()?;
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio21,
        peripherals.pins.gpio22,
        &I2cConfig::new().baudrate(Hertz(400_000)),
    )?;
    let monitor = Ina219::new(i2c, power::DEFAULT_ADDRESS)?;

    let log = SampleLog::with_header(std::io::stdout(), PowerSample::HEADER)?;
    let mut logger = PowerLogger::new(monitor, SystemClock::new(), log, PowerLogConfig::default());
    logger.run()?;
    Ok(())
}

#[cfg(feature = "esp32")]
fn main() {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    if let Err(e) = run() {
        log::error!("Power logger stopped: {}", e);
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    eprintln!("This binary must be built for ESP32.");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  cargo espflash flash --bin power-logger --features esp32 --release --monitor");
    std::process::exit(1);
}
