use std::{fmt, net::Ipv4Addr, str::FromStr};

/// An IPv4 address, held in host order so that comparisons and masking are
/// plain integer operations.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ipv4Address(u32);

impl Ipv4Address {
    /// `0.0.0.0`. As a gateway it means the destination is on-link.
    pub const CURRENT_NETWORK: Self = Self(0);

    /// `255.255.255.255`, the limited broadcast address.
    pub const SUBNET: Self = Self(u32::MAX);

    /// `224.0.0.9`, the group RIPv2 updates are sent to.
    pub const RIP_ROUTERS: Self = Self::new([224, 0, 0, 9]);

    pub const fn new(octets: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(octets))
    }

    pub const fn to_u32(self) -> u32 {
        self.0
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub const fn is_unspecified(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.to_bytes();
        write!(f, "{a}.{b}.{c}.{d}")
    }
}

impl fmt::Debug for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ipv4Address({self})")
    }
}

impl FromStr for Ipv4Address {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Ipv4Addr>().map(|address| Self(address.into()))
    }
}

impl From<u32> for Ipv4Address {
    fn from(n: u32) -> Self {
        Self(n)
    }
}

impl From<[u8; 4]> for Ipv4Address {
    fn from(octets: [u8; 4]) -> Self {
        Self::new(octets)
    }
}

impl From<Ipv4Address> for u32 {
    fn from(address: Ipv4Address) -> Self {
        address.0
    }
}

impl From<Ipv4Address> for [u8; 4] {
    fn from(address: Ipv4Address) -> Self {
        address.to_bytes()
    }
}
