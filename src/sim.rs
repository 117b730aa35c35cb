//! In-process radio simulation for host builds.
//!
//! An [`Air`] is a shared medium; every attached [`ChannelRadio`] gets its
//! own inbound channel keyed by its address. Unicast frames to an address
//! nobody is attached to are accepted and lost, as they would be on air.
//!
//! ```
//! use espnow_sensor_node::link::{PeerAddress, PeerLink};
//! use espnow_sensor_node::sim::Air;
//! use std::time::Duration;
//!
//! let air = Air::new();
//! let a = PeerAddress::new([2, 0, 0, 0, 0, 1]);
//! let b = PeerAddress::new([2, 0, 0, 0, 0, 2]);
//!
//! let mut node = PeerLink::new(air.attach(a));
//! let mut gateway = PeerLink::new(air.attach(b));
//! node.register(b, Some("gateway")).unwrap();
//!
//! assert!(node.send(&b"hello"[..], Some(b)));
//! let (from, _) = gateway.receive(Duration::from_millis(100)).unwrap();
//! assert_eq!(from, a);
//! ```

use crate::link::{Frame, LinkError, PeerAddress, Radio};
use log::trace;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type StationMap = Arc<Mutex<HashMap<PeerAddress, (u64, Sender<Frame>)>>>;

/// Shared simulated medium.
#[derive(Clone, Default)]
pub struct Air {
    stations: StationMap,
    next_id: Arc<AtomicU64>,
}

impl Air {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a radio at `addr`, replacing any earlier radio at that address.
    pub fn attach(&self, addr: PeerAddress) -> ChannelRadio {
        let (tx, rx) = mpsc::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(addr, (id, tx));
        ChannelRadio {
            addr,
            id,
            air: self.clone(),
            rx,
            peers: HashSet::new(),
            closed: false,
        }
    }

    /// Whether a radio is currently attached at `addr`.
    pub fn is_attached(&self, addr: &PeerAddress) -> bool {
        self.lock().contains_key(addr)
    }

    fn deliver(&self, to: PeerAddress, frame: Frame) {
        if let Some((_, tx)) = self.lock().get(&to) {
            let _ = tx.send(frame);
        } else {
            trace!("No station at {}, frame lost", to);
        }
    }

    fn detach(&self, addr: PeerAddress, id: u64) {
        let mut stations = self.lock();
        if matches!(stations.get(&addr), Some((current, _)) if *current == id) {
            stations.remove(&addr);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PeerAddress, (u64, Sender<Frame>)>> {
        self.stations.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A radio attached to an [`Air`].
pub struct ChannelRadio {
    addr: PeerAddress,
    id: u64,
    air: Air,
    rx: Receiver<Frame>,
    peers: HashSet<PeerAddress>,
    closed: bool,
}

impl ChannelRadio {
    /// This radio's own address.
    pub fn address(&self) -> PeerAddress {
        self.addr
    }
}

impl Radio for ChannelRadio {
    fn add_peer(&mut self, addr: PeerAddress) -> Result<(), LinkError> {
        self.peers.insert(addr);
        Ok(())
    }

    fn send(&mut self, addr: PeerAddress, data: &[u8]) -> Result<(), LinkError> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        if !self.peers.contains(&addr) {
            return Err(LinkError::UnknownPeer(addr));
        }
        self.air.deliver(
            addr,
            Frame {
                src: self.addr,
                data: data.to_vec(),
            },
        );
        Ok(())
    }

    fn recv(&mut self, timeout: Option<Duration>) -> Result<Option<Frame>, LinkError> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        match timeout {
            Some(timeout) => match self.rx.recv_timeout(timeout) {
                Ok(frame) => Ok(Some(frame)),
                Err(RecvTimeoutError::Timeout) => Ok(None),
                Err(RecvTimeoutError::Disconnected) => Err(LinkError::Closed),
            },
            None => self.rx.recv().map(Some).map_err(|_| LinkError::Closed),
        }
    }

    fn shutdown(&mut self) -> Result<(), LinkError> {
        self.closed = true;
        self.air.detach(self.addr, self.id);
        Ok(())
    }
}
