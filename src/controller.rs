//! Duty-cycle controller.
//!
//! One wake cycle runs `Init -> ActiveListen -> TelemetrySend -> SleepPending`
//! and hands back a [`CycleReport`]. Entering deep sleep is left to the
//! caller (see [`crate::supervisor`]), so a cycle can run to completion in
//! host tests.
//!
//! Everything the cycle touches is passed in and owned by the controller:
//! the radio, the storage backend, the clock, the sensors and the optional
//! wake indicator line. The link is released before `run_cycle` returns.

use crate::boot::BootAccountant;
use crate::config::{ConfigError, NodeConfig};
use crate::link::{LinkError, Message, PeerLink, Radio, SensorData};
use crate::persistence::{Storage, StorageError};
use crate::platform::{Clock, SignalOutput};
use crate::sensors::{EnvironmentReading, EnvironmentSensor, PowerMonitor, PowerReading};
use crate::settings::{NodeSettings, SettingsStore};
use log::{debug, info, warn};
use std::fmt;
use std::time::Duration;

/// Phase of a wake cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Init,
    ActiveListen,
    TelemetrySend,
    SleepPending,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::ActiveListen => "ACTIVE_LISTEN",
            Self::TelemetrySend => "TELEMETRY_SEND",
            Self::SleepPending => "SLEEP_PENDING",
        };
        f.write_str(name)
    }
}

/// Outcome of one completed wake cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub boot_count: u32,
    /// Settings as of the end of the listen window.
    pub settings: NodeSettings,
    /// Control messages received while listening.
    pub control_messages: usize,
    /// Whether a telemetry frame was accepted by the radio.
    pub telemetry_sent: bool,
    /// How long to deep-sleep before the next cycle.
    pub sleep_for: Duration,
}

/// Runs a single wake cycle over owned handles.
pub struct DutyCycleController<R: Radio, S: Storage, C: Clock> {
    config: NodeConfig,
    link: PeerLink<R>,
    storage: S,
    clock: C,
    environment: Box<dyn EnvironmentSensor>,
    power: Option<Box<dyn PowerMonitor>>,
    wake_signal: Option<Box<dyn SignalOutput>>,
    state: CycleState,
}

impl<R: Radio, S: Storage, C: Clock> DutyCycleController<R, S, C> {
    pub fn new(
        config: NodeConfig,
        radio: R,
        storage: S,
        clock: C,
        environment: Box<dyn EnvironmentSensor>,
    ) -> Self {
        Self {
            config,
            link: PeerLink::new(radio),
            storage,
            clock,
            environment,
            power: None,
            wake_signal: None,
            state: CycleState::Init,
        }
    }

    /// Read power values from `monitor` instead of reporting zeros.
    pub fn with_power_monitor(mut self, monitor: Box<dyn PowerMonitor>) -> Self {
        self.power = Some(monitor);
        self
    }

    /// Raise `line` once initialised and lower it just before sleep.
    pub fn with_wake_signal(mut self, line: Box<dyn SignalOutput>) -> Self {
        self.wake_signal = Some(line);
        self
    }

    /// Current phase.
    pub fn state(&self) -> CycleState {
        self.state
    }

    fn enter(&mut self, next: CycleState) {
        debug!("{} -> {}", self.state, next);
        self.state = next;
    }

    /// Run one wake cycle.
    ///
    /// Errors are limited to faults the node cannot continue past: an
    /// invalid configuration, peer registration failing, or the first-boot
    /// signal having no peer.
    /// Sensor, storage and send faults are logged and absorbed.
    pub fn run_cycle(mut self) -> Result<CycleReport, CycleError> {
        let (boot_count, mut settings) = self.init()?;

        self.enter(CycleState::ActiveListen);
        let window_start = self.clock.now();
        let control_messages = self.listen(&mut settings, window_start);

        self.enter(CycleState::TelemetrySend);
        let telemetry_sent = if settings.sensing_enabled {
            self.send_telemetry(boot_count)
        } else {
            info!("Sensing disabled, skipping data collection");
            false
        };

        self.enter(CycleState::SleepPending);
        let remaining = self
            .config
            .active_window
            .saturating_sub(self.clock.since(window_start));
        if !remaining.is_zero() {
            debug!("Waiting {}ms before sleep", remaining.as_millis());
            self.clock.sleep(remaining);
        }

        let Self {
            link, wake_signal, ..
        } = self;
        link.release();
        if let Some(mut line) = wake_signal {
            if let Err(e) = line.set_level(false) {
                warn!("Failed to lower wake signal: {}", e);
            }
        }

        let report = CycleReport {
            boot_count,
            settings,
            control_messages,
            telemetry_sent,
            sleep_for: settings.sleep_duration(),
        };
        info!(
            "Cycle {} done: {} control message(s), telemetry {}, sleeping {}ms",
            report.boot_count,
            report.control_messages,
            if report.telemetry_sent { "sent" } else { "not sent" },
            report.sleep_for.as_millis()
        );
        Ok(report)
    }

    fn init(&mut self) -> Result<(u32, NodeSettings), CycleError> {
        self.config.validate()?;
        let settings = SettingsStore::new(&mut self.storage).load();

        self.link
            .register(self.config.telemetry_peer, Some("telemetry"))?;
        self.link
            .register(self.config.experiment_peer, Some("experiment"))?;

        let boot_count = BootAccountant::new(&mut self.storage)
            .next_boot_count(&mut self.link, self.config.experiment_peer)?;

        if let Some(line) = self.wake_signal.as_mut() {
            if let Err(e) = line.set_level(true) {
                warn!("Failed to raise wake signal: {}", e);
            }
        }
        info!("Node boot #{} initialised", boot_count);
        Ok((boot_count, settings))
    }

    /// Apply control messages until the listen window closes. Persists the
    /// settings once at the end if anything changed.
    fn listen(&mut self, settings: &mut NodeSettings, window_start: Duration) -> usize {
        let listen_for = self.config.listen_window();
        info!("Listening for control messages ({}ms)", listen_for.as_millis());

        let mut control_messages = 0;
        let mut dirty = false;
        loop {
            let elapsed = self.clock.since(window_start);
            if elapsed >= listen_for {
                break;
            }
            let timeout = self.config.poll_timeout.min(listen_for - elapsed);
            let Some((src, payload)) = self.link.receive(timeout) else {
                continue;
            };
            match payload.as_control() {
                Some(control) => {
                    debug!("Control message from {}: {:?}", src, control);
                    control_messages += 1;
                    dirty |= settings.apply_control(control, self.config.active_window);
                }
                None => debug!("Ignoring non-control payload from {}", src),
            }
        }

        if dirty {
            SettingsStore::new(&mut self.storage).save(settings);
        }
        control_messages
    }

    fn send_telemetry(&mut self, boot_count: u32) -> bool {
        let environment = match self.environment.read() {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Environment read error: {}", e);
                EnvironmentReading {
                    temperature_c: 0.0,
                    humidity_pct: 0.0,
                }
            }
        };

        let power = match self.power.as_mut().map(|monitor| monitor.read()) {
            Some(Ok(reading)) => reading,
            Some(Err(e)) => {
                warn!("Power read error: {}", e);
                PowerReading::zero()
            }
            None => PowerReading::zero(),
        };
        info!(
            "Power: {:.2}V {:.2}mA {:.2}mW (shunt {:.2}mV)",
            power.voltage_v, power.current_ma, power.power_mw, power.shunt_mv
        );

        let message = Message::SensorData(SensorData {
            temperature: environment.temperature_c,
            humidity: environment.humidity_pct,
            voltage: power.voltage_v,
            current: power.current_ma,
            power: power.power_mw,
            timestamp: self.clock.now().as_millis() as u64,
            boot_count,
        });

        let sent = self.link.send(&message, Some(self.config.telemetry_peer));
        if sent {
            info!(
                "Sensor data sent: T={:.1}C, H={:.1}%, V={:.2}V",
                environment.temperature_c, environment.humidity_pct, power.voltage_v
            );
        } else {
            warn!("Failed to send sensor data");
        }
        sent
    }
}

/// Faults that end a cycle early.
#[derive(Debug)]
pub enum CycleError {
    /// Peer registration or the first-boot handshake failed.
    Link(LinkError),
    /// Storage backend could not be opened.
    Storage(StorageError),
    /// Configuration rejected before the cycle started.
    Config(ConfigError),
    /// ESP-IDF peripheral setup failed.
    #[cfg(feature = "esp32")]
    Esp(esp_idf_sys::EspError),
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(e) => write!(f, "link error: {}", e),
            Self::Storage(e) => write!(f, "storage error: {}", e),
            Self::Config(e) => write!(f, "configuration error: {}", e),
            #[cfg(feature = "esp32")]
            Self::Esp(e) => write!(f, "ESP-IDF error: {:?}", e),
        }
    }
}

impl std::error::Error for CycleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Link(e) => Some(e),
            Self::Storage(e) => Some(e),
            Self::Config(e) => Some(e),
            #[cfg(feature = "esp32")]
            Self::Esp(_) => None,
        }
    }
}

impl From<LinkError> for CycleError {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

impl From<StorageError> for CycleError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<ConfigError> for CycleError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for CycleError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Esp(e)
    }
}
