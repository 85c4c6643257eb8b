//! The static IPv4 to link-layer address mapping used to address forwarded
//! frames.

use crate::{
    network::{Mac, MacDisplay},
    protocols::ipv4::Ipv4Address,
};
use dashmap::DashMap;
use std::fmt;

/// Maps next-hop addresses to the MAC of the neighbor that owns them.
///
/// The router never resolves addresses on its own: entries are loaded once
/// at startup and a miss is final.
#[derive(Debug, Default)]
pub struct ArpCache {
    entries: DashMap<Ipv4Address, Mac>,
}

impl ArpCache {
    pub fn new() -> Self {
        Default::default()
    }

    /// Records that `address` is reached at `mac`, returning the previous
    /// mapping if there was one.
    pub fn insert(&self, address: Ipv4Address, mac: Mac) -> Option<Mac> {
        self.entries.insert(address, mac)
    }

    pub fn lookup(&self, address: Ipv4Address) -> Option<Mac> {
        self.entries.get(&address).map(|mac| *mac)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(Ipv4Address, Mac)> for ArpCache {
    fn from_iter<T: IntoIterator<Item = (Ipv4Address, Mac)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for ArpCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        entries.sort_unstable();
        writeln!(f, "{:<16}{}", "address", "mac")?;
        for (address, mac) in entries {
            writeln!(f, "{:<16}{}", address.to_string(), MacDisplay(mac))?;
        }
        Ok(())
    }
}
