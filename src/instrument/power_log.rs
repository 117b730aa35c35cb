//! Fixed-rate power sampling.

use super::{InstrumentError, SampleLog};
use crate::link::PowerSample;
use crate::platform::Clock;
use crate::sensors::PowerMonitor;
use log::{info, warn};
use std::io::Write;
use std::time::Duration;

/// Sampling schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerLogConfig {
    pub period: Duration,
    pub samples: usize,
}

impl Default for PowerLogConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
            samples: 600,
        }
    }
}

/// Result of a logging run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerLogSummary {
    pub written: usize,
    pub read_errors: usize,
}

/// Samples a power monitor into a [`SampleLog`].
pub struct PowerLogger<M: PowerMonitor, C: Clock, W: Write> {
    monitor: M,
    clock: C,
    log: SampleLog<W>,
    config: PowerLogConfig,
}

impl<M: PowerMonitor, C: Clock, W: Write> PowerLogger<M, C, W> {
    pub fn new(monitor: M, clock: C, log: SampleLog<W>, config: PowerLogConfig) -> Self {
        Self {
            monitor,
            clock,
            log,
            config,
        }
    }

    /// Take every scheduled sample.
    ///
    /// Slot `n` is due at `start + (n + 1) * period` regardless of how long
    /// earlier reads took. A failed read is logged and its slot is consumed.
    pub fn run(&mut self) -> Result<PowerLogSummary, InstrumentError> {
        let mut summary = PowerLogSummary {
            written: 0,
            read_errors: 0,
        };
        let mut deadline = self.clock.now() + self.config.period;
        info!(
            "Logging {} power samples every {}ms",
            self.config.samples,
            self.config.period.as_millis()
        );

        for _ in 0..self.config.samples {
            let now = self.clock.now();
            if now < deadline {
                self.clock.sleep(deadline - now);
            }
            deadline += self.config.period;

            match self.monitor.read() {
                Ok(reading) => {
                    let sample = PowerSample {
                        timestamp_ms: self.clock.now().as_millis().min(u32::MAX as u128) as u32,
                        current_ma: reading.current_ma as f32,
                        voltage_v: reading.voltage_v as f32,
                        power_mw: reading.power_mw as f32,
                    };
                    self.log.append(&sample)?;
                    summary.written += 1;
                }
                Err(e) => {
                    warn!("Power measurement error: {}", e);
                    summary.read_errors += 1;
                }
            }
        }

        info!(
            "Power log done: {} written, {} read errors",
            summary.written, summary.read_errors
        );
        Ok(summary)
    }

    pub fn into_log(self) -> SampleLog<W> {
        self.log
    }
}
