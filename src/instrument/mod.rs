//! Standalone measurement instruments.
//!
//! Neither instrument is part of the node's duty cycle; each runs on its own
//! board next to the node under test.
//!
//! - [`latency`]: times how long the node takes to answer a wake request
//! - [`power_log`]: samples a power monitor at a fixed rate
//! - [`sample_log`]: the append-only CSV files both write to

pub mod latency;
pub mod power_log;
pub mod sample_log;

pub use latency::{HarnessConfig, WakeLatencyHarness};
pub use power_log::{PowerLogConfig, PowerLogSummary, PowerLogger};
pub use sample_log::SampleLog;

use crate::link::{PowerSample, WakeTimingSample};
use crate::platform::SignalError;
use std::fmt;
use std::io;
use std::time::Duration;

/// One CSV line for a sample log.
pub trait CsvRow {
    /// Column names, comma separated.
    const HEADER: &'static str;

    fn row(&self) -> String;
}

impl CsvRow for WakeTimingSample {
    const HEADER: &'static str = "elapsed_ms";

    fn row(&self) -> String {
        self.elapsed_ms.to_string()
    }
}

impl CsvRow for PowerSample {
    const HEADER: &'static str = "timestamp,current_mA,voltage_V,power_mW";

    fn row(&self) -> String {
        format!(
            "{},{:.2},{:.2},{:.2}",
            self.timestamp_ms, self.current_ma, self.voltage_v, self.power_mw
        )
    }
}

/// Instrument errors.
#[derive(Debug)]
pub enum InstrumentError {
    /// Log file could not be written.
    Io(io::Error),
    /// Signal line could not be driven or read.
    Signal(SignalError),
    /// Partner did not answer within the configured timeout.
    AckTimeout(Duration),
}

impl fmt::Display for InstrumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "log write failed: {}", e),
            Self::Signal(e) => write!(f, "{}", e),
            Self::AckTimeout(after) => {
                write!(f, "no answer from partner after {}ms", after.as_millis())
            }
        }
    }
}

impl std::error::Error for InstrumentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Signal(e) => Some(e),
            Self::AckTimeout(_) => None,
        }
    }
}

impl From<io::Error> for InstrumentError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<SignalError> for InstrumentError {
    fn from(e: SignalError) -> Self {
        Self::Signal(e)
    }
}
