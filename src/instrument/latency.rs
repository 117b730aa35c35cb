//! Wake-latency harness.
//!
//! Each cycle raises the "ready" line, polls the partner line until the node
//! under test raises it, logs the elapsed time, then waits for the partner
//! line to clear, lowers "ready" and pauses before the next cycle.

use super::{InstrumentError, SampleLog};
use crate::link::WakeTimingSample;
use crate::platform::{wait_for_level, Clock, SignalInput, SignalOutput};
use log::{info, warn};
use std::io::Write;
use std::time::Duration;

/// Harness timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// How often the partner line is sampled.
    pub poll_interval: Duration,
    /// Pause after each cycle.
    pub inter_cycle_delay: Duration,
    /// Give up on a cycle after this long. `None` waits forever.
    pub ack_timeout: Option<Duration>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            inter_cycle_delay: Duration::from_secs(5),
            ack_timeout: None,
        }
    }
}

pub struct WakeLatencyHarness<O, I, C, W>
where
    O: SignalOutput,
    I: SignalInput,
    C: Clock,
    W: Write,
{
    ready: O,
    partner: I,
    clock: C,
    log: SampleLog<W>,
    config: HarnessConfig,
    /// Lit for the duration of [`Self::run`].
    indicator: Option<Box<dyn SignalOutput>>,
}

impl<O, I, C, W> WakeLatencyHarness<O, I, C, W>
where
    O: SignalOutput,
    I: SignalInput,
    C: Clock,
    W: Write,
{
    pub fn new(ready: O, partner: I, clock: C, log: SampleLog<W>, config: HarnessConfig) -> Self {
        Self {
            ready,
            partner,
            clock,
            log,
            config,
            indicator: None,
        }
    }

    /// Light `line` while the harness is measuring.
    pub fn with_indicator(mut self, line: Box<dyn SignalOutput>) -> Self {
        self.indicator = Some(line);
        self
    }

    fn set_indicator(&mut self, on: bool) -> Result<(), InstrumentError> {
        match self.indicator.as_mut() {
            Some(line) => Ok(line.set_level(on)?),
            None => Ok(()),
        }
    }

    /// Run one handshake and log its sample.
    pub fn run_cycle(&mut self) -> Result<WakeTimingSample, InstrumentError> {
        self.ready.set_level(true)?;

        let waited = wait_for_level(
            &mut self.partner,
            true,
            &self.clock,
            self.config.poll_interval,
            self.config.ack_timeout,
        )?;
        let Some(elapsed) = waited else {
            self.ready.set_level(false)?;
            self.clock.sleep(self.config.inter_cycle_delay);
            return Err(InstrumentError::AckTimeout(
                self.config.ack_timeout.unwrap_or_default(),
            ));
        };

        let sample = WakeTimingSample {
            elapsed_ms: elapsed.as_millis().min(u32::MAX as u128) as u32,
        };
        self.log.append(&sample)?;
        info!("Wake latency: {}ms", sample.elapsed_ms);

        wait_for_level(
            &mut self.partner,
            false,
            &self.clock,
            self.config.poll_interval,
            None,
        )?;
        self.ready.set_level(false)?;
        self.clock.sleep(self.config.inter_cycle_delay);
        Ok(sample)
    }

    /// Run `max_cycles` cycles, or forever when `None`. Timed-out cycles are
    /// logged and skipped. Returns the number of samples logged.
    ///
    /// The indicator is turned off again even when a cycle fails.
    pub fn run(&mut self, max_cycles: Option<usize>) -> Result<usize, InstrumentError> {
        self.set_indicator(true)?;
        let result = self.run_cycles(max_cycles);
        let off = self.set_indicator(false);
        let written = result?;
        off?;
        Ok(written)
    }

    fn run_cycles(&mut self, max_cycles: Option<usize>) -> Result<usize, InstrumentError> {
        let mut cycles = 0;
        while max_cycles.map_or(true, |max| cycles < max) {
            cycles += 1;
            match self.run_cycle() {
                Ok(_) => {}
                Err(e @ InstrumentError::AckTimeout(_)) => warn!("Cycle {}: {}", cycles, e),
                Err(e) => return Err(e),
            }
        }
        Ok(self.log.written())
    }

    pub fn into_log(self) -> SampleLog<W> {
        self.log
    }
}
