//! Deterministic doubles for host tests.

use crate::link::{Frame, LinkError, PeerAddress, Radio};
use crate::platform::{Clock, SignalError, SignalInput, SignalOutput};
use crate::sensors::{EnvironmentReading, EnvironmentSensor, PowerMonitor, PowerReading, SensorError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Clock that only moves when something sleeps or is told to advance.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.micros.fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }

    /// Move forward to `at`; never moves backwards.
    pub fn advance_to(&self, at: Duration) {
        self.micros
            .fetch_max(at.as_micros() as u64, Ordering::SeqCst);
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::SeqCst))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[derive(Debug, Default)]
struct RadioState {
    peers_added: Vec<PeerAddress>,
    sent: Vec<(PeerAddress, Vec<u8>)>,
    send_attempts: usize,
    frames_remaining: usize,
    shut_down: bool,
}

/// Shared view of what a [`ScriptedRadio`] did.
#[derive(Debug, Clone, Default)]
pub struct RadioLog {
    state: Arc<Mutex<RadioState>>,
}

impl RadioLog {
    pub fn peers_added(&self) -> Vec<PeerAddress> {
        self.state.lock().unwrap().peers_added.clone()
    }

    /// Frames the radio accepted, in order.
    pub fn sent(&self) -> Vec<(PeerAddress, Vec<u8>)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_to(&self, addr: PeerAddress) -> Vec<Vec<u8>> {
        self.sent()
            .into_iter()
            .filter(|(to, _)| *to == addr)
            .map(|(_, data)| data)
            .collect()
    }

    pub fn send_attempts(&self) -> usize {
        self.state.lock().unwrap().send_attempts
    }

    pub fn frames_remaining(&self) -> usize {
        self.state.lock().unwrap().frames_remaining
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().unwrap().shut_down
    }
}

/// Radio with a timed inbound script on a [`ManualClock`].
///
/// Waiting with nothing due advances the clock by the full timeout.
pub struct ScriptedRadio {
    clock: ManualClock,
    inbound: VecDeque<(Duration, Frame)>,
    fail_sends: usize,
    log: RadioLog,
}

impl ScriptedRadio {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            inbound: VecDeque::new(),
            fail_sends: 0,
            log: RadioLog::default(),
        }
    }

    /// Queue a frame that becomes available at `at`. Frames must be queued
    /// in time order.
    pub fn with_frame_at(mut self, at: Duration, src: PeerAddress, data: Vec<u8>) -> Self {
        self.inbound.push_back((at, Frame { src, data }));
        self.sync_log();
        self
    }

    /// Reject the next `n` send attempts.
    pub fn failing_sends(mut self, n: usize) -> Self {
        self.fail_sends = n;
        self
    }

    pub fn log(&self) -> RadioLog {
        self.log.clone()
    }

    fn sync_log(&self) {
        self.log.state.lock().unwrap().frames_remaining = self.inbound.len();
    }

    fn pop(&mut self) -> Option<Frame> {
        let (at, frame) = self.inbound.pop_front()?;
        self.clock.advance_to(at);
        self.sync_log();
        Some(frame)
    }
}

impl Radio for ScriptedRadio {
    fn add_peer(&mut self, addr: PeerAddress) -> Result<(), LinkError> {
        self.log.state.lock().unwrap().peers_added.push(addr);
        Ok(())
    }

    fn send(&mut self, addr: PeerAddress, data: &[u8]) -> Result<(), LinkError> {
        let mut state = self.log.state.lock().unwrap();
        if state.shut_down {
            return Err(LinkError::Closed);
        }
        state.send_attempts += 1;
        if self.fail_sends > 0 {
            self.fail_sends -= 1;
            return Err(LinkError::Closed);
        }
        state.sent.push((addr, data.to_vec()));
        Ok(())
    }

    fn recv(&mut self, timeout: Option<Duration>) -> Result<Option<Frame>, LinkError> {
        if self.log.is_shut_down() {
            return Err(LinkError::Closed);
        }
        match timeout {
            Some(timeout) => {
                let deadline = self.clock.now() + timeout;
                let due = matches!(self.inbound.front(), Some((at, _)) if *at <= deadline);
                if due {
                    Ok(self.pop())
                } else {
                    self.clock.advance_to(deadline);
                    Ok(None)
                }
            }
            // Nothing left to deliver would block forever.
            None => self.pop().map(Some).ok_or(LinkError::Closed),
        }
    }

    fn shutdown(&mut self) -> Result<(), LinkError> {
        self.log.state.lock().unwrap().shut_down = true;
        Ok(())
    }
}

/// Input line whose level follows a timeline on a [`ManualClock`].
pub struct ScriptedInput {
    clock: ManualClock,
    /// `(from, level)` transitions in time order; low before the first.
    transitions: Vec<(Duration, bool)>,
}

impl ScriptedInput {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            transitions: Vec::new(),
        }
    }

    pub fn high_at(mut self, at: Duration) -> Self {
        self.transitions.push((at, true));
        self
    }

    pub fn low_at(mut self, at: Duration) -> Self {
        self.transitions.push((at, false));
        self
    }
}

impl SignalInput for ScriptedInput {
    fn is_high(&mut self) -> Result<bool, SignalError> {
        let now = self.clock.now();
        Ok(self
            .transitions
            .iter()
            .take_while(|(at, _)| *at <= now)
            .last()
            .map(|(_, level)| *level)
            .unwrap_or(false))
    }
}

/// Output line that records every level it is driven to.
#[derive(Debug, Clone, Default)]
pub struct RecordingOutput {
    levels: Arc<Mutex<Vec<bool>>>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn levels(&self) -> Vec<bool> {
        self.levels.lock().unwrap().clone()
    }
}

impl SignalOutput for RecordingOutput {
    fn set_level(&mut self, high: bool) -> Result<(), SignalError> {
        self.levels.lock().unwrap().push(high);
        Ok(())
    }
}

/// Environment sensor returning a fixed reading, or always failing.
pub struct FixedEnvironment(pub Option<EnvironmentReading>);

impl EnvironmentSensor for FixedEnvironment {
    fn read(&mut self) -> Result<EnvironmentReading, SensorError> {
        self.0.ok_or(SensorError::NotFitted)
    }
}

/// Power monitor returning a fixed reading, or always failing.
pub struct FixedPower(pub Option<PowerReading>);

impl PowerMonitor for FixedPower {
    fn read(&mut self) -> Result<PowerReading, SensorError> {
        self.0.ok_or(SensorError::Bus("no ack".into()))
    }
}
