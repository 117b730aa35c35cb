//! ESP-IDF deep sleep, restart and GPIO lines.

use super::{Platform, SignalError, SignalInput, SignalOutput, WakePin, EXT0_WAKE_PIN};
use esp_idf_hal::gpio::{Input, InputPin, Output, OutputPin, PinDriver};
use esp_idf_sys::{self as sys, esp};
use log::{error, info};
use std::time::Duration;

/// Chip-level power control.
#[derive(Debug, Default)]
pub struct EspPlatform;

impl EspPlatform {
    pub fn new() -> Self {
        Self
    }

    /// Log why the chip last reset.
    pub fn log_wake_cause() {
        let cause = unsafe { sys::esp_sleep_get_wakeup_cause() };
        match cause {
            sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER => info!("Woke on timer"),
            sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_EXT0 => info!("Woke on external signal"),
            sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_UNDEFINED => info!("Power-on or reset boot"),
            other => info!("Woke on source {}", other),
        }
    }

    fn arm_wake_sources(duration: Duration) -> Result<(), sys::EspError> {
        let micros = duration.as_micros().min(u64::MAX as u128) as u64;
        esp!(unsafe { sys::esp_sleep_enable_timer_wakeup(micros) })?;
        Self::arm_ext0(&EXT0_WAKE_PIN)
    }

    fn arm_ext0(pin: &WakePin) -> Result<(), sys::EspError> {
        if pin.pull_down {
            esp!(unsafe { sys::rtc_gpio_pullup_dis(pin.gpio) })?;
            esp!(unsafe { sys::rtc_gpio_pulldown_en(pin.gpio) })?;
        } else {
            esp!(unsafe { sys::rtc_gpio_pulldown_dis(pin.gpio) })?;
            esp!(unsafe { sys::rtc_gpio_pullup_en(pin.gpio) })?;
        }
        esp!(unsafe { sys::esp_sleep_enable_ext0_wakeup(pin.gpio, i32::from(pin.wake_high)) })
    }
}

impl Platform for EspPlatform {
    #[allow(unreachable_code)]
    fn deep_sleep(&mut self, duration: Duration) -> ! {
        if let Err(e) = Self::arm_wake_sources(duration) {
            error!("Failed to arm wake sources: {:?}", e);
        }
        unsafe { sys::esp_deep_sleep_start() };
        error!("Deep sleep failed");
        self.restart()
    }

    #[allow(unreachable_code)]
    fn restart(&mut self) -> ! {
        unsafe { sys::esp_restart() };
        loop {
            std::thread::sleep(Duration::from_secs(1));
        }
    }
}

impl<'d, T: OutputPin> SignalOutput for PinDriver<'d, T, Output> {
    fn set_level(&mut self, high: bool) -> Result<(), SignalError> {
        if high {
            self.set_high()?;
        } else {
            self.set_low()?;
        }
        Ok(())
    }
}

impl<'d, T: InputPin> SignalInput for PinDriver<'d, T, Input> {
    fn is_high(&mut self) -> Result<bool, SignalError> {
        Ok(PinDriver::is_high(self))
    }
}

impl From<sys::EspError> for SignalError {
    fn from(e: sys::EspError) -> Self {
        Self::Gpio(e)
    }
}
