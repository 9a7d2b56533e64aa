//! Bluetooth device addresses.
use core::fmt;

use crate::codec::{self, Decode, Encode, FixedSize};

/// A 48-bit device address, stored in the little-endian order used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BdAddr([u8; 6]);

impl BdAddr {
    pub const fn new(val: [u8; 6]) -> Self {
        Self(val)
    }

    pub fn raw(&self) -> &[u8; 6] {
        &self.0
    }
}

impl FixedSize for BdAddr {
    const SIZE: usize = 6;
}

impl Encode for BdAddr {
    fn encode(&self, dest: &mut [u8]) -> Result<(), codec::Error> {
        self.0.encode(dest)
    }
}

impl Decode<'_> for BdAddr {
    fn decode(src: &[u8]) -> Result<Self, codec::Error> {
        Ok(Self(<[u8; 6]>::decode(src)?))
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a[5], a[4], a[3], a[2], a[1], a[0]
        )
    }
}

/// Address type as carried in HCI commands and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddrKind {
    Public,
    Random,
    /// Public identity address resolved by the controller.
    PublicIdentity,
    /// Static random identity address resolved by the controller.
    RandomIdentity,
    Other(u8),
}

impl AddrKind {
    pub fn from_raw(value: u8) -> Self {
        match value {
            0x00 => Self::Public,
            0x01 => Self::Random,
            0x02 => Self::PublicIdentity,
            0x03 => Self::RandomIdentity,
            other => Self::Other(other),
        }
    }

    pub fn into_raw(self) -> u8 {
        match self {
            Self::Public => 0x00,
            Self::Random => 0x01,
            Self::PublicIdentity => 0x02,
            Self::RandomIdentity => 0x03,
            Self::Other(other) => other,
        }
    }
}

/// A device address together with its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub kind: AddrKind,
    pub addr: BdAddr,
}

impl Address {
    /// A random address, bytes given in wire (little-endian) order.
    pub const fn random(val: [u8; 6]) -> Self {
        Self {
            kind: AddrKind::Random,
            addr: BdAddr::new(val),
        }
    }

    /// A public address, bytes given in wire (little-endian) order.
    pub const fn public(val: [u8; 6]) -> Self {
        Self {
            kind: AddrKind::Public,
            addr: BdAddr::new(val),
        }
    }

    /// Whether this is a static random address (two most significant bits set).
    pub fn is_static_random(&self) -> bool {
        self.kind == AddrKind::Random && self.addr.raw()[5] & 0xc0 == 0xc0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.addr)?;
        match self.kind {
            AddrKind::Public => f.write_str("(public)"),
            AddrKind::Random => f.write_str("(random)"),
            AddrKind::PublicIdentity => f.write_str("(public-id)"),
            AddrKind::RandomIdentity => f.write_str("(random-id)"),
            AddrKind::Other(kind) => write!(f, "(0x{:02x})", kind),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Address {
    fn format(&self, fmt: defmt::Formatter) {
        let a = self.addr.raw();
        defmt::write!(
            fmt,
            "{=u8:02X}:{=u8:02X}:{=u8:02X}:{=u8:02X}:{=u8:02X}:{=u8:02X} ({})",
            a[5],
            a[4],
            a[3],
            a[2],
            a[1],
            a[0],
            self.kind
        )
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::string::ToString;

    use super::*;

    #[test]
    fn renders_most_significant_byte_first() {
        let addr = Address::random([0xff, 0x8f, 0x1a, 0x05, 0xe4, 0xc3]);
        assert_eq!(addr.to_string(), "C3:E4:05:1A:8F:FF (random)");
        assert!(addr.is_static_random());

        let addr = Address::public([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert_eq!(addr.to_string(), "06:05:04:03:02:01 (public)");
        assert!(!addr.is_static_random());
    }

    #[test]
    fn identity_and_unknown_kinds() {
        let mut addr = Address::public([0; 6]);
        addr.kind = AddrKind::from_raw(0x03);
        assert_eq!(addr.to_string(), "00:00:00:00:00:00 (random-id)");
        addr.kind = AddrKind::from_raw(0x02);
        assert_eq!(addr.to_string(), "00:00:00:00:00:00 (public-id)");
        addr.kind = AddrKind::from_raw(0x7e);
        assert_eq!(addr.kind.into_raw(), 0x7e);
        assert_eq!(addr.to_string(), "00:00:00:00:00:00 (0x7e)");
    }
}
