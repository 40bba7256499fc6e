//! Provides the IPv4 address type the engine iterates over, and its
//! conversions to and from dotted-quad text.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

use crate::errors::AddressError;

/// An IPv4 address as a plain 32-bit integer.
///
/// Ordering is numeric, which is also the order the engine dispatches in.
///
/// ```rust
/// # use rangescan::address::Address;
/// let addr: Address = "8.8.4.4".parse().unwrap();
/// assert_eq!(addr.to_string(), "8.8.4.4");
/// assert_eq!(addr.octets(), [8, 8, 4, 4]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u32);

impl Address {
    /// First address of the scan domain; `0.0.0.0/8` is never scanned.
    pub const DEFAULT_START: Self = Self(1 << 24);

    /// Exclusive upper bound of the scan domain, the start of the multicast block.
    pub const DOMAIN_END: Self = Self(224 << 24);

    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn from_octets(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self(u32::from_be_bytes([a, b, c, d]))
    }

    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn octets(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Next address by integer increment, carrying across octets.
    ///
    /// Returns `None` on wrap past `255.255.255.255`.
    #[must_use]
    pub const fn successor(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Whether the address lies in `[0.0.0.0, 224.0.0.0)`.
    #[must_use]
    pub const fn in_domain(self) -> bool {
        self.0 < Self::DOMAIN_END.0
    }

    #[must_use]
    pub fn socket_addr(self, port: u16) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.into(), port))
    }

    /// Parses a user supplied start address; an empty string means the
    /// default start of the domain.
    pub fn parse_start(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::DEFAULT_START);
        }
        trimmed.parse()
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| AddressError::InvalidAddress {
            input: input.to_owned(),
            reason,
        };

        let segments: Vec<&str> = input.split('.').collect();
        if segments.len() != 4 {
            return Err(invalid(format!(
                "expected 4 segments, found {}",
                segments.len()
            )));
        }

        let mut octets = [0u8; 4];
        for (octet, segment) in octets.iter_mut().zip(&segments) {
            if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid(format!("invalid segment '{segment}'")));
            }
            *octet = segment
                .parse::<u8>()
                .map_err(|_| invalid(format!("segment '{segment}' is out of range")))?;
        }

        Ok(Self(u32::from_be_bytes(octets)))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.octets();
        write!(f, "{a}.{b}.{c}.{d}")
    }
}

impl From<Address> for Ipv4Addr {
    fn from(addr: Address) -> Self {
        Self::from(addr.0)
    }
}

impl From<Ipv4Addr> for Address {
    fn from(ip: Ipv4Addr) -> Self {
        Self(u32::from(ip))
    }
}
