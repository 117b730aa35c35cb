//! Wake-latency harness firmware.
//!
//! Runs on a separate board wired to the node under test: GPIO23 drives the
//! node's wake line, GPIO19 reads the node's wake indicator, and the LED on
//! GPIO2 stays lit while measuring. Samples are printed as CSV on the serial
//! console:
//!
//! ```bash
//! cargo espflash flash --bin wake-harness --features esp32 --release --monitor | tee wake_time.csv
//! ```

#[cfg(feature = "esp32")]
fn run() -> Result<(), Box<dyn std::error::Error>> {
    use esp_idf_hal::gpio::{PinDriver, Pull};
    use esp_idf_hal::peripherals::Peripherals;
    use espnow_sensor_node::instrument::{CsvRow, HarnessConfig, SampleLog, WakeLatencyHarness};
    use espnow_sensor_node::link::WakeTimingSample;
    use espnow_sensor_node::platform::SystemClock;

    let peripherals = Peripherals::take()?;
    let ready = PinDriver::output(peripherals.pins.gpio23)?;
    let mut partner = PinDriver::input(peripherals.pins.gpio19)?;
    partner.set_pull(Pull::Down)?;
    let led = PinDriver::output(peripherals.pins.gpio2)?;

    let log = SampleLog::with_header(std::io::stdout(), WakeTimingSample::HEADER)?;
    let mut harness =
        WakeLatencyHarness::new(ready, partner, SystemClock::new(), log, HarnessConfig::default())
            .with_indicator(Box::new(led));

    harness.run(None)?;
    Ok(())
}

#[cfg(feature = "esp32")]
fn main() {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    log::info!("Wake-latency harness starting");

    if let Err(e) = run() {
        log::error!("Harness stopped: {}", e);
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    eprintln!("This binary must be built for ESP32.");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  cargo espflash flash --bin wake-harness --features esp32 --release --monitor");
    std::process::exit(1);
}
