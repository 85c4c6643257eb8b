//! Subnet masks and network prefixes.
//!
//! Masks are always contiguous (CIDR), so ordering two masks as integers
//! orders them by prefix length.

use super::Ipv4Address;
use std::{fmt, str::FromStr};

/// A contiguous subnet mask.
#[derive(Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Default)]
pub struct Ipv4Mask(u32);

impl Ipv4Mask {
    /// The mask with the top `len` bits set. Lengths past 32 saturate.
    ///
    /// ```
    /// # use vrouter_core::protocols::ipv4::Ipv4Mask;
    /// assert_eq!(Ipv4Mask::from_bitcount(20).to_u32(), 0xFF_FF_F0_00);
    /// assert_eq!(Ipv4Mask::from_bitcount(0).to_u32(), 0);
    /// ```
    pub const fn from_bitcount(len: u32) -> Self {
        match len {
            0 => Self(0),
            len if len >= 32 => Self(u32::MAX),
            len => Self(u32::MAX << (32 - len)),
        }
    }

    /// The prefix length.
    pub const fn count_ones(&self) -> u32 {
        self.0.count_ones()
    }

    pub const fn to_u32(self) -> u32 {
        self.0
    }

    /// Clears the host bits of `address`.
    pub fn apply(self, address: Ipv4Address) -> Ipv4Address {
        (address.to_u32() & self.0).into()
    }
}

impl fmt::Debug for Ipv4Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ipv4Mask(/{})", self.count_ones())
    }
}

impl fmt::Display for Ipv4Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Ipv4Address::from(self.0), f)
    }
}

impl From<Ipv4Mask> for u32 {
    fn from(mask: Ipv4Mask) -> u32 {
        mask.0
    }
}

/// Fails with the original value when the ones are not contiguous from the
/// top bit.
impl TryFrom<u32> for Ipv4Mask {
    type Error = u32;

    fn try_from(bits: u32) -> Result<Self, u32> {
        // Contiguous iff inverting gives a run of low ones
        match (!bits).checked_add(1) {
            Some(next) if next & !bits != 0 => Err(bits),
            _ => Ok(Self(bits)),
        }
    }
}

impl TryFrom<Ipv4Address> for Ipv4Mask {
    type Error = Ipv4Address;

    fn try_from(address: Ipv4Address) -> Result<Self, Ipv4Address> {
        Self::try_from(address.to_u32()).map_err(Ipv4Address::from)
    }
}

/// A network prefix. The address always has its host bits cleared.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ipv4Net {
    id: Ipv4Address,
    mask: Ipv4Mask,
}

impl Ipv4Net {
    pub fn new(address: Ipv4Address, mask: Ipv4Mask) -> Self {
        Self {
            id: mask.apply(address),
            mask,
        }
    }

    /// ```
    /// # use vrouter_core::protocols::ipv4::*;
    /// let net = Ipv4Net::new_short([172, 16, 9, 1], 16);
    /// assert_eq!(net.id(), Ipv4Address::new([172, 16, 0, 0]));
    /// ```
    pub fn new_short(address: impl Into<Ipv4Address>, len: u32) -> Self {
        Self::new(address.into(), Ipv4Mask::from_bitcount(len))
    }

    pub fn id(&self) -> Ipv4Address {
        self.id
    }

    pub fn mask(&self) -> Ipv4Mask {
        self.mask
    }

    pub fn contains(&self, address: Ipv4Address) -> bool {
        self.mask.apply(address) == self.id
    }
}

impl fmt::Debug for Ipv4Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ipv4Net({self})")
    }
}

impl fmt::Display for Ipv4Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.id, self.mask.count_ones())
    }
}

impl FromStr for Ipv4Net {
    type Err = CidrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, mask) = cidr_to_ip(s)?;
        Ok(Self::new(address, mask))
    }
}

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum CidrParseError {
    #[error("Expected an address of the form a.b.c.d/len")]
    Ipv4,
    #[error("Invalid prefix length: {0}")]
    Mask(#[from] std::num::ParseIntError),
    #[error("Prefix length {0} is longer than 32")]
    TooLong(u32),
}

/// Splits `a.b.c.d/len` into its address, host bits kept, and mask.
///
/// ```
/// # use vrouter_core::protocols::ipv4::*;
/// let (address, mask) = cidr_to_ip("10.1.2.3/8").unwrap();
/// assert_eq!(address, Ipv4Address::new([10, 1, 2, 3]));
/// assert_eq!(mask.count_ones(), 8);
/// assert!(cidr_to_ip("10.1.2.3").is_err());
/// ```
pub fn cidr_to_ip(cidr: &str) -> Result<(Ipv4Address, Ipv4Mask), CidrParseError> {
    let (address, len) = cidr.split_once('/').ok_or(CidrParseError::Ipv4)?;
    let address = address.parse().map_err(|_| CidrParseError::Ipv4)?;
    match len.parse()? {
        len if len > 32 => Err(CidrParseError::TooLong(len)),
        len => Ok((address, Ipv4Mask::from_bitcount(len))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_order_by_length() {
        assert_eq!(Ipv4Mask::from_bitcount(24).to_u32(), 0xFF_FF_FF_00);
        assert_eq!(Ipv4Mask::from_bitcount(32).to_u32(), u32::MAX);
        assert_eq!(Ipv4Mask::from_bitcount(45), Ipv4Mask::from_bitcount(32));
        assert!(Ipv4Mask::from_bitcount(25) > Ipv4Mask::from_bitcount(24));
        assert!(Ipv4Mask::from_bitcount(1) > Ipv4Mask::from_bitcount(0));
        assert_eq!(Ipv4Mask::from_bitcount(16).to_string(), "255.255.0.0");
    }

    #[test]
    fn only_contiguous_masks_convert() {
        for len in 0..=32 {
            let mask = Ipv4Mask::from_bitcount(len);
            assert_eq!(Ipv4Mask::try_from(mask.to_u32()), Ok(mask));
        }
        assert_eq!(Ipv4Mask::try_from(0xFF_00_FF_00), Err(0xFF_00_FF_00));
        assert_eq!(Ipv4Mask::try_from(1), Err(1));
        assert!(Ipv4Mask::try_from(Ipv4Address::new([255, 0, 255, 0])).is_err());
    }

    #[test]
    fn network_membership() {
        let net: Ipv4Net = "10.0.3.77/22".parse().unwrap();
        assert_eq!(net.id(), Ipv4Address::new([10, 0, 0, 0]));
        assert!(net.contains([10, 0, 3, 255].into()));
        assert!(!net.contains([10, 0, 4, 0].into()));
        assert_eq!(net.to_string(), "10.0.0.0/22");

        let everything = Ipv4Net::new_short([1, 2, 3, 4], 0);
        assert!(everything.contains([255, 255, 255, 255].into()));
    }

    #[test]
    fn rejects_bad_cidr() {
        assert_eq!(cidr_to_ip("10.0.0.0/33"), Err(CidrParseError::TooLong(33)));
        assert_eq!(cidr_to_ip("10.0.0/8"), Err(CidrParseError::Ipv4));
        assert!(matches!(cidr_to_ip("10.0.0.0/x"), Err(CidrParseError::Mask(_))));
    }
}
