//! Peer table and best-effort messaging over a [`Radio`].
//!
//! `PeerLink` never propagates a transmission or decode fault to its caller:
//! sends report a boolean, receives report an absent result. The only
//! unbounded waits are [`PeerLink::await_from`] and
//! [`PeerLink::send_until_acknowledged_target`], both reserved for the
//! one-shot experiment-start handshake.

use super::message::{Outgoing, Payload};
use super::record::FixedRecord;
use super::{LinkError, PeerAddress, Radio, ESPNOW_MTU};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::time::Duration;

/// Pause between attempts while retrying the experiment-start signal.
const RETRY_PAUSE: Duration = Duration::from_millis(10);

/// Registered peers on top of a radio driver.
pub struct PeerLink<R: Radio> {
    radio: R,
    /// Known peers with optional labels, in address order.
    peers: BTreeMap<PeerAddress, Option<String>>,
}

impl<R: Radio> PeerLink<R> {
    /// Wrap a radio with an empty peer table.
    pub fn new(radio: R) -> Self {
        Self {
            radio,
            peers: BTreeMap::new(),
        }
    }

    /// Register a peer. Idempotent.
    ///
    /// A known address is not re-added to the radio; a provided label
    /// replaces the old one.
    pub fn register(
        &mut self,
        addr: PeerAddress,
        label: Option<&str>,
    ) -> Result<PeerAddress, LinkError> {
        if let Some(existing) = self.peers.get_mut(&addr) {
            if let Some(label) = label {
                *existing = Some(label.to_string());
            }
            return Ok(addr);
        }

        self.radio.add_peer(addr)?;
        self.peers.insert(addr, label.map(str::to_string));
        debug!("Registered peer {} ({})", addr, label.unwrap_or("unnamed"));
        Ok(addr)
    }

    /// Whether `addr` has been registered.
    pub fn is_registered(&self, addr: &PeerAddress) -> bool {
        self.peers.contains_key(addr)
    }

    /// Label of a registered peer.
    pub fn label_of(&self, addr: &PeerAddress) -> Option<&str> {
        self.peers.get(addr).and_then(|l| l.as_deref())
    }

    /// Registered peers with their labels.
    pub fn peers(&self) -> impl Iterator<Item = (PeerAddress, Option<&str>)> {
        self.peers.iter().map(|(addr, l)| (*addr, l.as_deref()))
    }

    /// Send a payload to `target`, or to every registered peer when `None`.
    ///
    /// Returns `true` only if the radio accepted every frame.
    pub fn send<'a>(&mut self, payload: impl Into<Outgoing<'a>>, target: Option<PeerAddress>) -> bool {
        let bytes = match payload.into().to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Send error: {}", LinkError::Encode(e.to_string()));
                return false;
            }
        };
        self.send_bytes(&bytes, target)
    }

    /// Send a fixed-layout record.
    pub fn send_record<T: FixedRecord>(&mut self, record: &T, target: Option<PeerAddress>) -> bool {
        self.send_bytes(&record.to_bytes(), target)
    }

    fn send_bytes(&mut self, bytes: &[u8], target: Option<PeerAddress>) -> bool {
        if bytes.len() > ESPNOW_MTU {
            warn!(
                "Send error: {}",
                LinkError::PayloadTooLarge {
                    size: bytes.len(),
                    max: ESPNOW_MTU,
                }
            );
            return false;
        }

        match target {
            Some(addr) => self.transmit(addr, bytes),
            None => {
                if self.peers.is_empty() {
                    warn!("Broadcast with no registered peers");
                    return false;
                }
                let targets: Vec<PeerAddress> = self.peers.keys().copied().collect();
                // Every peer gets its frame even if an earlier one failed.
                targets
                    .into_iter()
                    .fold(true, |ok, addr| self.transmit(addr, bytes) && ok)
            }
        }
    }

    fn transmit(&mut self, addr: PeerAddress, bytes: &[u8]) -> bool {
        if !self.is_registered(&addr) {
            warn!("Send error: {}", LinkError::UnknownPeer(addr));
            return false;
        }
        match self.radio.send(addr, bytes) {
            Ok(()) => true,
            Err(e) => {
                warn!("Send to {} failed: {}", addr, e);
                false
            }
        }
    }

    /// Wait up to `timeout` for one frame.
    ///
    /// Returns `None` on timeout, on a radio fault, or for an empty frame.
    pub fn receive(&mut self, timeout: Duration) -> Option<(PeerAddress, Payload)> {
        match self.radio.recv(Some(timeout)) {
            Ok(Some(frame)) if !frame.data.is_empty() => {
                Some((frame.src, Payload::decode(frame.data)))
            }
            Ok(_) => None,
            Err(e) => {
                debug!("Receive error: {}", e);
                None
            }
        }
    }

    /// Block until any frame arrives from `addr`.
    ///
    /// Frames from other senders are discarded. Only a closed radio ends
    /// the wait early.
    pub fn await_from(&mut self, addr: PeerAddress) -> Result<(), LinkError> {
        info!("Waiting for start signal from {}", addr);
        loop {
            match self.radio.recv(None) {
                Ok(Some(frame)) if frame.src == addr => return Ok(()),
                Ok(_) => continue,
                Err(LinkError::Closed) => return Err(LinkError::Closed),
                Err(e) => debug!("Receive error while waiting: {}", e),
            }
        }
    }

    /// Resend until the local radio accepts the frame for `target`.
    ///
    /// Acceptance is not delivery: nothing here learns whether the peer
    /// received it. Returns the number of attempts.
    pub fn send_until_acknowledged_target<'a>(
        &mut self,
        payload: impl Into<Outgoing<'a>>,
        target: PeerAddress,
    ) -> Result<u32, LinkError> {
        if !self.is_registered(&target) {
            return Err(LinkError::UnknownPeer(target));
        }
        let payload = payload.into();
        let mut attempts = 0u32;
        loop {
            attempts = attempts.saturating_add(1);
            if self.send(payload, Some(target)) {
                info!("Start signal accepted for {} after {} attempt(s)", target, attempts);
                return Ok(attempts);
            }
            std::thread::sleep(RETRY_PAUSE);
        }
    }

    /// Shut the radio down and hand it back.
    pub fn release(mut self) -> R {
        if let Err(e) = self.radio.shutdown() {
            warn!("Radio shutdown failed: {}", e);
        }
        self.radio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{ControlMessage, Message, WakeTimingSample, EXPERIMENT_START_MARKER};
    use crate::sim::Air;
    use crate::test_support::{ManualClock, ScriptedRadio};
    use std::time::Instant;

    fn addr(last: u8) -> PeerAddress {
        PeerAddress::new([0x02, 0, 0, 0, 0, last])
    }

    fn control_bytes(enabled: bool) -> Vec<u8> {
        Message::Control(ControlMessage {
            sensing_interval_ms: None,
            sensing_enabled: Some(enabled),
        })
        .encode()
        .unwrap()
    }

    #[test]
    fn test_register_is_idempotent() {
        let radio = ScriptedRadio::new(ManualClock::new());
        let log = radio.log();
        let mut link = PeerLink::new(radio);

        link.register(addr(1), Some("gateway")).unwrap();
        link.register(addr(1), Some("renamed")).unwrap();
        link.register(addr(1), None).unwrap();

        assert_eq!(link.peers().count(), 1);
        assert_eq!(link.label_of(&addr(1)), Some("renamed"));
        assert_eq!(log.peers_added(), vec![addr(1)]);
    }

    #[test]
    fn test_unicast_to_unregistered_peer_fails() {
        let radio = ScriptedRadio::new(ManualClock::new());
        let log = radio.log();
        let mut link = PeerLink::new(radio);

        assert!(!link.send(&b"hi"[..], Some(addr(9))));
        assert!(log.sent().is_empty());
    }

    #[test]
    fn test_broadcast_reaches_every_peer() {
        let radio = ScriptedRadio::new(ManualClock::new());
        let log = radio.log();
        let mut link = PeerLink::new(radio);
        link.register(addr(2), None).unwrap();
        link.register(addr(1), None).unwrap();

        assert!(link.send(&b"all"[..], None));
        assert_eq!(
            log.sent(),
            vec![(addr(1), b"all".to_vec()), (addr(2), b"all".to_vec())]
        );
    }

    #[test]
    fn test_broadcast_without_peers_fails() {
        let mut link = PeerLink::new(ScriptedRadio::new(ManualClock::new()));
        assert!(!link.send(&b"nobody"[..], None));
    }

    #[test]
    fn test_broadcast_reports_partial_failure() {
        let radio = ScriptedRadio::new(ManualClock::new()).failing_sends(1);
        let log = radio.log();
        let mut link = PeerLink::new(radio);
        link.register(addr(1), None).unwrap();
        link.register(addr(2), None).unwrap();

        assert!(!link.send(&b"x"[..], None));
        // Second peer still got its frame.
        assert_eq!(log.sent(), vec![(addr(2), b"x".to_vec())]);
    }

    #[test]
    fn test_structured_send_is_json() {
        let radio = ScriptedRadio::new(ManualClock::new());
        let log = radio.log();
        let mut link = PeerLink::new(radio);
        link.register(addr(1), None).unwrap();

        let message = Message::Control(ControlMessage {
            sensing_interval_ms: Some(30000),
            sensing_enabled: None,
        });
        assert!(link.send(&message, Some(addr(1))));

        let (_, bytes) = log.sent().remove(0);
        assert_eq!(Message::decode(&bytes).unwrap(), message);
    }

    #[test]
    fn test_oversized_payload_is_rejected_locally() {
        let radio = ScriptedRadio::new(ManualClock::new());
        let log = radio.log();
        let mut link = PeerLink::new(radio);
        link.register(addr(1), None).unwrap();

        let big = vec![0u8; ESPNOW_MTU + 1];
        assert!(!link.send(&big[..], Some(addr(1))));
        assert_eq!(log.send_attempts(), 0);
    }

    #[test]
    fn test_send_record_delivers_fixed_layout() {
        let radio = ScriptedRadio::new(ManualClock::new());
        let log = radio.log();
        let mut link = PeerLink::new(radio);
        link.register(addr(1), None).unwrap();

        let sample = WakeTimingSample { elapsed_ms: 1375 };
        assert!(link.send_record(&sample, Some(addr(1))));

        let sent = log.sent_to(addr(1));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].len(), WakeTimingSample::SIZE);
        let payload = Payload::decode(sent[0].clone());
        assert_eq!(payload.decode_record::<WakeTimingSample>(), Some(sample));
    }

    /// A record wider than one ESP-NOW frame.
    struct Oversized;

    impl FixedRecord for Oversized {
        const SIZE: usize = ESPNOW_MTU + 1;

        fn to_bytes(&self) -> Vec<u8> {
            vec![0xaa; Self::SIZE]
        }

        fn from_bytes(bytes: &[u8]) -> Option<Self> {
            (bytes.len() == Self::SIZE).then_some(Oversized)
        }
    }

    #[test]
    fn test_send_record_rejects_records_over_mtu() {
        let radio = ScriptedRadio::new(ManualClock::new());
        let log = radio.log();
        let mut link = PeerLink::new(radio);
        link.register(addr(1), None).unwrap();

        assert!(!link.send_record(&Oversized, Some(addr(1))));
        assert!(!link.send_record(&Oversized, None));
        assert_eq!(log.send_attempts(), 0);
    }

    #[test]
    fn test_receive_decodes_structured_first() {
        let radio = ScriptedRadio::new(ManualClock::new())
            .with_frame_at(Duration::ZERO, addr(1), control_bytes(false));
        let mut link = PeerLink::new(radio);

        let (from, payload) = link.receive(Duration::from_millis(50)).unwrap();
        assert_eq!(from, addr(1));
        assert_eq!(payload.as_control().unwrap().sensing_enabled, Some(false));
    }

    #[test]
    fn test_receive_returns_raw_for_fixed_records() {
        let sample = WakeTimingSample { elapsed_ms: 412 };
        let radio = ScriptedRadio::new(ManualClock::new()).with_frame_at(
            Duration::ZERO,
            addr(1),
            sample.to_bytes(),
        );
        let mut link = PeerLink::new(radio);

        let (_, payload) = link.receive(Duration::from_millis(50)).unwrap();
        assert_eq!(payload.decode_record::<WakeTimingSample>(), Some(sample));
    }

    #[test]
    fn test_receive_treats_empty_frame_as_no_data() {
        let radio = ScriptedRadio::new(ManualClock::new())
            .with_frame_at(Duration::ZERO, addr(1), Vec::new());
        let mut link = PeerLink::new(radio);
        assert!(link.receive(Duration::from_millis(50)).is_none());
    }

    #[test]
    fn test_receive_times_out_on_manual_clock() {
        let clock = ManualClock::new();
        let mut link = PeerLink::new(ScriptedRadio::new(clock.clone()));

        assert!(link.receive(Duration::from_millis(50)).is_none());
        assert_eq!(clock.elapsed(), Duration::from_millis(50));
    }

    #[test]
    fn test_receive_timeout_bound_in_real_time() {
        let air = Air::new();
        let mut link = PeerLink::new(air.attach(addr(1)));
        let timeout = Duration::from_millis(50);

        let start = Instant::now();
        let result = link.receive(timeout);
        let elapsed = start.elapsed();

        assert!(result.is_none());
        assert!(elapsed >= timeout, "returned early after {:?}", elapsed);
        assert!(
            elapsed < timeout + Duration::from_millis(250),
            "returned late after {:?}",
            elapsed
        );
    }

    #[test]
    fn test_await_from_skips_other_senders() {
        let radio = ScriptedRadio::new(ManualClock::new())
            .with_frame_at(Duration::from_millis(5), addr(7), b"noise".to_vec())
            .with_frame_at(Duration::from_millis(9), addr(3), b"go".to_vec());
        let log = radio.log();
        let mut link = PeerLink::new(radio);

        assert!(link.await_from(addr(3)).is_ok());
        assert_eq!(log.frames_remaining(), 0);
    }

    #[test]
    fn test_await_from_ends_when_radio_closes() {
        let mut link = PeerLink::new(ScriptedRadio::new(ManualClock::new()));
        assert!(matches!(link.await_from(addr(3)), Err(LinkError::Closed)));
    }

    #[test]
    fn test_send_until_acknowledged_retries_until_accepted() {
        let radio = ScriptedRadio::new(ManualClock::new()).failing_sends(3);
        let log = radio.log();
        let mut link = PeerLink::new(radio);
        link.register(addr(5), None).unwrap();

        let attempts = link
            .send_until_acknowledged_target(EXPERIMENT_START_MARKER, addr(5))
            .unwrap();
        assert_eq!(attempts, 4);
        assert_eq!(log.sent(), vec![(addr(5), EXPERIMENT_START_MARKER.to_vec())]);
    }

    #[test]
    fn test_send_until_acknowledged_requires_registration() {
        let mut link = PeerLink::new(ScriptedRadio::new(ManualClock::new()));
        let result = link.send_until_acknowledged_target(EXPERIMENT_START_MARKER, addr(5));
        assert!(matches!(result, Err(LinkError::UnknownPeer(_))));
    }

    #[test]
    fn test_release_shuts_radio_down() {
        let radio = ScriptedRadio::new(ManualClock::new());
        let log = radio.log();
        let link = PeerLink::new(radio);
        let _radio = link.release();
        assert!(log.is_shut_down());
    }

    #[test]
    fn test_channel_radios_exchange_frames() {
        let air = Air::new();
        let mut a = PeerLink::new(air.attach(addr(1)));
        let mut b = PeerLink::new(air.attach(addr(2)));
        a.register(addr(2), Some("b")).unwrap();

        assert!(a.send(&control_bytes(true)[..], Some(addr(2))));
        let (from, payload) = b.receive(Duration::from_millis(200)).unwrap();
        assert_eq!(from, addr(1));
        assert!(payload.as_control().is_some());
    }
}
