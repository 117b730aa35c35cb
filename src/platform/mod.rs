//! Time, signal lines and power-state control.
//!
//! The duty-cycle controller and the instruments only see the traits in this
//! module, so their timing can be driven by a manual clock in host tests.
//!
//! - [`Clock`]: monotonic time since wake plus a blocking delay
//! - [`SignalOutput`] / [`SignalInput`]: single digital lines
//! - [`Platform`]: deep sleep and chip restart (never return)
//! - [`esp32`]: ESP-IDF implementations (ESP32 only)

#[cfg(feature = "esp32")]
mod esp32;

#[cfg(feature = "esp32")]
pub use esp32::EspPlatform;

use crate::supervisor::Verdict;
use log::{error, info};
use std::fmt;
use std::time::{Duration, Instant};

/// Monotonic time source with a blocking delay.
pub trait Clock {
    /// Time elapsed since the clock's origin (normally the wake-up).
    fn now(&self) -> Duration;

    /// Block for `duration`.
    fn sleep(&self, duration: Duration);

    /// Time elapsed since an earlier [`Clock::now`] reading.
    fn since(&self, earlier: Duration) -> Duration {
        self.now().saturating_sub(earlier)
    }
}

/// Wall-clock implementation backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Start a clock at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A digital output line.
pub trait SignalOutput {
    fn set_level(&mut self, high: bool) -> Result<(), SignalError>;
}

/// A digital input line.
pub trait SignalInput {
    fn is_high(&mut self) -> Result<bool, SignalError>;
}

/// Deep sleep and restart. Both are terminal.
pub trait Platform {
    /// Power down until the wake timer or an external wake line fires.
    fn deep_sleep(&mut self, duration: Duration) -> !;

    /// Hard-reset the chip.
    fn restart(&mut self) -> !;

    /// Carry out a supervisor verdict. A reset waits `fault_delay` first.
    fn finish(&mut self, verdict: Verdict, clock: &dyn Clock, fault_delay: Duration) -> ! {
        match verdict {
            Verdict::Sleep(duration) => {
                info!("Entering deep sleep for {} ms", duration.as_millis());
                self.deep_sleep(duration)
            }
            Verdict::Reset => {
                error!("Resetting in {}s", fault_delay.as_secs());
                clock.sleep(fault_delay);
                self.restart()
            }
        }
    }
}

/// External line that wakes the chip from deep sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakePin {
    /// RTC-capable GPIO number.
    pub gpio: i32,
    /// Level that triggers the wake.
    pub wake_high: bool,
    /// Internal pull resistor direction: `true` pulls down, `false` pulls up.
    pub pull_down: bool,
}

impl WakePin {
    /// Whether an undriven pin rests at the level that does not wake.
    pub fn rests_quiet(&self) -> bool {
        self.pull_down == self.wake_high
    }
}

/// GPIO33, level-high, pulled down so a disconnected harness cannot wake
/// the node.
pub const EXT0_WAKE_PIN: WakePin = WakePin {
    gpio: 33,
    wake_high: true,
    pull_down: true,
};

/// Poll `input` every `poll` until it reads `level`.
///
/// Returns the time waited, or `Ok(None)` once `timeout` has passed.
/// Without a timeout the wait is unbounded.
pub fn wait_for_level<I, C>(
    input: &mut I,
    level: bool,
    clock: &C,
    poll: Duration,
    timeout: Option<Duration>,
) -> Result<Option<Duration>, SignalError>
where
    I: SignalInput + ?Sized,
    C: Clock + ?Sized,
{
    let start = clock.now();
    loop {
        if input.is_high()? == level {
            return Ok(Some(clock.since(start)));
        }
        if let Some(limit) = timeout {
            if clock.since(start) >= limit {
                return Ok(None);
            }
        }
        clock.sleep(poll);
    }
}

/// Signal line errors.
#[derive(Debug)]
pub enum SignalError {
    /// Line is not connected or was released.
    Unavailable(&'static str),
    /// ESP-IDF GPIO error.
    #[cfg(feature = "esp32")]
    Gpio(esp_idf_sys::EspError),
}

impl fmt::Display for SignalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(line) => write!(f, "signal line unavailable: {}", line),
            #[cfg(feature = "esp32")]
            Self::Gpio(e) => write!(f, "GPIO error: {:?}", e),
        }
    }
}

impl std::error::Error for SignalError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ManualClock, ScriptedInput};

    #[test]
    fn test_ext0_wake_pin_rests_below_wake_level() {
        assert_eq!(EXT0_WAKE_PIN.gpio, 33);
        assert!(EXT0_WAKE_PIN.wake_high);
        assert!(EXT0_WAKE_PIN.rests_quiet());

        let floating_up = WakePin {
            pull_down: false,
            ..EXT0_WAKE_PIN
        };
        assert!(!floating_up.rests_quiet());
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        clock.sleep(Duration::from_millis(2));
        assert!(clock.since(a) >= Duration::from_millis(2));
    }

    #[test]
    fn test_wait_for_level_reports_elapsed_time() {
        let clock = ManualClock::new();
        let mut input = ScriptedInput::new(clock.clone()).high_at(Duration::from_millis(37));

        let waited = wait_for_level(&mut input, true, &clock, Duration::from_millis(1), None)
            .unwrap()
            .unwrap();
        assert_eq!(waited, Duration::from_millis(37));
    }

    #[test]
    fn test_wait_for_level_times_out() {
        let clock = ManualClock::new();
        let mut input = ScriptedInput::new(clock.clone());

        let result = wait_for_level(
            &mut input,
            true,
            &clock,
            Duration::from_millis(10),
            Some(Duration::from_millis(100)),
        )
        .unwrap();
        assert_eq!(result, None);
        assert_eq!(clock.elapsed(), Duration::from_millis(100));
    }

    #[test]
    fn test_wait_for_level_returns_immediately_when_already_there() {
        let clock = ManualClock::new();
        let mut input = ScriptedInput::new(clock.clone());
        let waited = wait_for_level(&mut input, false, &clock, Duration::from_millis(1), None)
            .unwrap();
        assert_eq!(waited, Some(Duration::ZERO));
    }
}
