//! Sensor node firmware.
//!
//! One wake cycle per boot: listen for control messages, send telemetry,
//! deep-sleep. Any fault resets the chip after a short delay.
//!
//! ```bash
//! cargo espflash flash --bin node --features esp32 --release --monitor
//! ```
//!
//! Pins: wake indicator on GPIO19, external wake on GPIO33 (high),
//! INA219 on I2C0 (SDA GPIO21, SCL GPIO22, 400 kHz).

#[cfg(feature = "esp32")]
use espnow_sensor_node::{
    config::NodeConfig,
    link::EspNowRadio,
    persistence::NvsStorage,
    platform::{EspPlatform, Platform, SystemClock},
    sensors::{power, Ina219, SurrogateEnvironment},
    supervise, CycleError, CycleReport, DutyCycleController,
};
#[cfg(feature = "esp32")]
use log::{error, info, warn};

// ESP32: Initialize ESP-IDF before anything else
#[cfg(feature = "esp32")]
fn platform_init() {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("ESP-IDF initialized");
}

#[cfg(feature = "esp32")]
fn run(config: &NodeConfig, clock: SystemClock) -> Result<CycleReport, CycleError> {
    use esp_idf_hal::gpio::PinDriver;
    use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_hal::units::Hertz;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use rand_core::OsRng;

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let storage = NvsStorage::new(nvs.clone())?;
    let radio = EspNowRadio::new(peripherals.modem, sysloop, Some(nvs), config.wifi_channel)?;
    let wake_line = PinDriver::output(peripherals.pins.gpio19)?;

    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio21,
        peripherals.pins.gpio22,
        &I2cConfig::new().baudrate(Hertz(400_000)),
    )?;

    let controller = DutyCycleController::new(
        config.clone(),
        radio,
        storage,
        clock,
        Box::new(SurrogateEnvironment::new(OsRng)),
    );
    // A missing power monitor only zeroes the power fields
    let controller = match Ina219::new(i2c, power::DEFAULT_ADDRESS) {
        Ok(ina) => {
            info!("INA219 initialized");
            controller.with_power_monitor(Box::new(ina))
        }
        Err(e) => {
            warn!("INA219 init error: {}", e);
            controller
        }
    };

    controller.with_wake_signal(Box::new(wake_line)).run_cycle()
}

#[cfg(feature = "esp32")]
fn main() {
    platform_init();
    EspPlatform::log_wake_cause();

    let clock = SystemClock::new();
    let config = match NodeConfig::from_build_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid build configuration ({}), using defaults", e);
            NodeConfig::default()
        }
    };

    let verdict = supervise(|| run(&config, clock));
    EspPlatform::new().finish(verdict, &clock, config.fault_reset_delay);
}

#[cfg(not(feature = "esp32"))]
fn main() {
    eprintln!("This binary must be built for ESP32.");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  cargo espflash flash --bin node --features esp32 --release");
    eprintln!();
    eprintln!("To simulate a node on this machine: cargo run --bin host-node");
    std::process::exit(1);
}
