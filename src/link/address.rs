//! Hardware peer addresses.
//!
//! Peers are identified by their 6-byte station MAC. The textual form is the
//! usual lowercase colon-separated hex (`ac:67:b2:2a:7e:88`); parsing also
//! accepts `-` separators or a bare 12-digit hex string.

use std::fmt;
use std::str::FromStr;

/// Length of a peer address in bytes.
pub const ADDRESS_LEN: usize = 6;

/// A fixed-width hardware identifier for a peer node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerAddress([u8; ADDRESS_LEN]);

impl PeerAddress {
    /// Create an address from its raw octets.
    pub const fn new(octets: [u8; ADDRESS_LEN]) -> Self {
        Self(octets)
    }

    /// Raw octets, as handed to the radio driver.
    pub const fn octets(&self) -> [u8; ADDRESS_LEN] {
        self.0
    }
}

impl From<[u8; ADDRESS_LEN]> for PeerAddress {
    fn from(octets: [u8; ADDRESS_LEN]) -> Self {
        Self(octets)
    }
}

impl TryFrom<&[u8]> for PeerAddress {
    type Error = AddressError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let octets: [u8; ADDRESS_LEN] = bytes
            .try_into()
            .map_err(|_| AddressError::WrongLength(bytes.len()))?;
        Ok(Self(octets))
    }
}

impl FromStr for PeerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s
            .trim()
            .chars()
            .filter(|c| *c != ':' && *c != '-')
            .collect();

        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AddressError::InvalidHex(digits));
        }
        if digits.len() != ADDRESS_LEN * 2 {
            return Err(AddressError::WrongLength(digits.len() / 2));
        }

        let mut octets = [0u8; ADDRESS_LEN];
        for (i, octet) in octets.iter_mut().enumerate() {
            let pair = &digits[i * 2..i * 2 + 2];
            *octet = u8::from_str_radix(pair, 16)
                .map_err(|_| AddressError::InvalidHex(pair.to_string()))?;
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

impl fmt::Debug for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerAddress({})", self)
    }
}

/// Errors from parsing a peer address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Input did not contain exactly six octets.
    WrongLength(usize),
    /// An octet was not valid hexadecimal.
    InvalidHex(String),
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongLength(n) => {
                write!(f, "expected {} octets, got {}", ADDRESS_LEN, n)
            }
            Self::InvalidHex(s) => write!(f, "invalid hex octet: {:?}", s),
        }
    }
}

impl std::error::Error for AddressError {}
