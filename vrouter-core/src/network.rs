//! The router's view of its links: the [`Interface`]s it owns and the
//! [`Transport`] that moves frames on and off them.

use crate::{
    protocols::ipv4::{Ipv4Address, Ipv4Mask, Ipv4Net},
    Frame,
};
use rustc_hash::FxHashMap;
use std::{fmt, ops::Index, str::FromStr, sync::Arc};

/// A 48 bit link-layer address, stored in the low bits of a `u64`.
pub type Mac = u64;

/// The link-layer broadcast address `ff:ff:ff:ff:ff:ff`.
pub const BROADCAST_MAC: Mac = 0xffff_ffff_ffff;

/// Identifies one of the router's interfaces by its position in the
/// [`Interfaces`] set.
pub type Slot = u32;

/// One of the router's attached links.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interface {
    pub slot: Slot,
    pub name: String,
    pub address: Ipv4Address,
    pub mask: Ipv4Mask,
    pub mac: Mac,
}

impl Interface {
    /// The subnet this interface is attached to.
    pub fn network(&self) -> Ipv4Net {
        Ipv4Net::new(self.address, self.mask)
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{} {}",
            self.name,
            self.address,
            self.mask.count_ones(),
            MacDisplay(self.mac)
        )
    }
}

/// The immutable set of interfaces a router was started with. Cloning is
/// cheap and every clone refers to the same interfaces.
#[derive(Debug, Clone)]
pub struct Interfaces {
    interfaces: Arc<[Interface]>,
    by_name: Arc<FxHashMap<String, Slot>>,
}

impl Interfaces {
    /// Builds the set, assigning slots in iteration order. The `slot` field
    /// of each given interface is overwritten.
    pub fn new(interfaces: impl IntoIterator<Item = Interface>) -> Self {
        let interfaces: Arc<[Interface]> = interfaces
            .into_iter()
            .enumerate()
            .map(|(i, mut iface)| {
                iface.slot = i as Slot;
                iface
            })
            .collect();
        let by_name = interfaces
            .iter()
            .map(|iface| (iface.name.clone(), iface.slot))
            .collect();
        Self {
            interfaces,
            by_name: Arc::new(by_name),
        }
    }

    pub fn get(&self, slot: Slot) -> Option<&Interface> {
        self.interfaces.get(slot as usize)
    }

    pub fn by_name(&self, name: &str) -> Option<&Interface> {
        self.by_name.get(name).and_then(|slot| self.get(*slot))
    }

    /// Whether `address` is assigned to one of the interfaces.
    pub fn is_local_address(&self, address: Ipv4Address) -> bool {
        self.interfaces.iter().any(|iface| iface.address == address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.iter()
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Index<Slot> for Interfaces {
    type Output = Interface;

    fn index(&self, slot: Slot) -> &Interface {
        &self.interfaces[slot as usize]
    }
}

/// A frame received on one of the router's interfaces.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// The raw Ethernet frame.
    pub frame: Frame,
    /// The interface the frame arrived on.
    pub slot: Slot,
}

/// Moves frames on and off the router's links.
///
/// Inbound frames are handed to the router as [`Delivery`]s on a channel
/// created alongside the transport; outbound frames go through
/// [`Transport::send`]. Any link emulation, socket, or test harness that can
/// do both can carry a router.
pub trait Transport: Send + Sync + 'static {
    /// The interfaces this transport serves.
    fn interfaces(&self) -> &Interfaces;

    /// Queues `frame` for transmission out of the interface in `slot`.
    fn send(&self, frame: Frame, slot: Slot) -> Result<(), SendError>;
}

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("No interface in slot {0}")]
    UnknownSlot(Slot),
    #[error("The link attached to slot {0} is closed")]
    Closed(Slot),
    #[error("The link attached to slot {0} cannot take more frames right now")]
    Busy(Slot),
    #[error("The frame of {0} bytes is too large for the link")]
    Mtu(usize),
}

/// Formats a [`Mac`] as `aa:bb:cc:dd:ee:ff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacDisplay(pub Mac);

impl fmt::Display for MacDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_be_bytes();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]
        )
    }
}

/// Parses a MAC address written as six colon separated hex octets.
pub fn parse_mac(s: &str) -> Result<Mac, MacParseError> {
    let mut mac: Mac = 0;
    let mut octets = 0;
    for part in s.split(':') {
        if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
            Err(MacParseError(s.to_string()))?
        }
        let octet = u8::from_str_radix(part, 16).map_err(|_| MacParseError(s.to_string()))?;
        mac = (mac << 8) | octet as Mac;
        octets += 1;
    }
    if octets != 6 {
        Err(MacParseError(s.to_string()))?
    }
    Ok(mac)
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("Expected a MAC address of the form aa:bb:cc:dd:ee:ff, got '{0}'")]
pub struct MacParseError(pub String);

impl FromStr for MacDisplay {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_mac(s).map(MacDisplay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interface(name: &str, address: [u8; 4], mac: Mac) -> Interface {
        Interface {
            slot: 99,
            name: name.to_string(),
            address: address.into(),
            mask: Ipv4Mask::from_bitcount(24),
            mac,
        }
    }

    #[test]
    fn assigns_slots_in_order() {
        let interfaces = Interfaces::new([
            interface("eth0", [192, 168, 1, 1], 1),
            interface("eth1", [10, 0, 0, 1], 2),
        ]);
        assert_eq!(interfaces.len(), 2);
        assert_eq!(interfaces[1].name, "eth1");
        assert_eq!(interfaces.by_name("eth0").map(|i| i.slot), Some(0));
        assert!(interfaces.by_name("eth2").is_none());
        assert!(interfaces.is_local_address([10, 0, 0, 1].into()));
        assert!(!interfaces.is_local_address([10, 0, 0, 2].into()));
        assert_eq!(interfaces[0].network(), Ipv4Net::new_short([192, 168, 1, 0], 24));
    }

    #[test]
    fn mac_text_form() {
        assert_eq!(parse_mac("02:00:00:00:00:0a"), Ok(0x0200_0000_000a));
        assert_eq!(MacDisplay(0x0200_0000_000a).to_string(), "02:00:00:00:00:0a");
        assert!(parse_mac("02:00:00:00:00").is_err());
        assert!(parse_mac("02:00:00:00:00:zz").is_err());
        assert!(parse_mac("0200:00:00:00:0a").is_err());
        assert!(parse_mac("+f:00:00:00:00:01").is_err());
        assert!(parse_mac("02:00:00:00:00:-1").is_err());
    }
}
