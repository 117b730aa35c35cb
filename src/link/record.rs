//! Fixed-layout binary records.
//!
//! Packed little-endian with no framing or tag; the receiver has to know
//! which record to expect. Only used by the measurement instruments, never
//! on the control channel.

/// A record with a fixed little-endian byte layout.
pub trait FixedRecord: Sized {
    /// Exact encoded size in bytes.
    const SIZE: usize;

    /// Encode into exactly [`Self::SIZE`] bytes.
    fn to_bytes(&self) -> Vec<u8>;

    /// Decode, returning `None` unless `bytes.len() == SIZE`.
    fn from_bytes(bytes: &[u8]) -> Option<Self>;
}

/// One wake-latency measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeTimingSample {
    /// Time from asserting "ready" to seeing the partner's acknowledgment.
    pub elapsed_ms: u32,
}

impl FixedRecord for WakeTimingSample {
    const SIZE: usize = 4;

    fn to_bytes(&self) -> Vec<u8> {
        self.elapsed_ms.to_le_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 4] = bytes.try_into().ok()?;
        Some(Self {
            elapsed_ms: u32::from_le_bytes(raw),
        })
    }
}

/// One power-monitor sample.
///
/// Layout: `[timestamp_ms:u32][current_ma:f32][voltage_v:f32][power_mw:f32]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerSample {
    pub timestamp_ms: u32,
    pub current_ma: f32,
    pub voltage_v: f32,
    pub power_mw: f32,
}

impl FixedRecord for PowerSample {
    const SIZE: usize = 16;

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::SIZE);
        bytes.extend_from_slice(&self.timestamp_ms.to_le_bytes());
        bytes.extend_from_slice(&self.current_ma.to_le_bytes());
        bytes.extend_from_slice(&self.voltage_v.to_le_bytes());
        bytes.extend_from_slice(&self.power_mw.to_le_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SIZE {
            return None;
        }
        let word = |i: usize| -> [u8; 4] {
            let mut w = [0u8; 4];
            w.copy_from_slice(&bytes[i * 4..i * 4 + 4]);
            w
        };
        Some(Self {
            timestamp_ms: u32::from_le_bytes(word(0)),
            current_ma: f32::from_le_bytes(word(1)),
            voltage_v: f32::from_le_bytes(word(2)),
            power_mw: f32::from_le_bytes(word(3)),
        })
    }
}
