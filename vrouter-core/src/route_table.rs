//! The router's forwarding rules and their lifecycle.

use crate::{
    logging::route_event,
    network::{Interfaces, Slot},
    protocols::ipv4::{Ipv4Address, Ipv4Mask},
};
use std::{
    collections::BTreeMap,
    fmt,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};
use tokio::time::Instant;

/// The metric at which a destination is considered unreachable.
pub const INFINITY: u8 = 16;

type Key = (Ipv4Address, Ipv4Mask);

/// Where a route came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Loaded from configuration at startup.
    Static,
    /// The subnet of one of the router's own interfaces.
    Connected,
    /// Heard from a neighbor through the routing protocol.
    Learned,
}

/// A single forwarding rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    /// The network address, always equal to itself under `mask`.
    pub destination: Ipv4Address,
    pub mask: Ipv4Mask,
    /// The next hop, or `0.0.0.0` if the destination is directly reachable.
    pub gateway: Ipv4Address,
    /// The interface to send matching datagrams out of.
    pub interface: Slot,
    pub metric: u8,
    pub origin: Origin,
    /// When a learned entry was last confirmed by its next hop.
    pub last_refreshed: Instant,
}

impl RouteEntry {
    pub fn new(
        destination: Ipv4Address,
        gateway: Ipv4Address,
        mask: Ipv4Mask,
        interface: Slot,
        metric: u8,
        origin: Origin,
    ) -> Self {
        Self {
            destination: mask.apply(destination),
            mask,
            gateway,
            interface,
            metric,
            origin,
            last_refreshed: Instant::now(),
        }
    }

    /// The route to the subnet an interface is directly attached to.
    pub fn connected(address: Ipv4Address, mask: Ipv4Mask, interface: Slot) -> Self {
        Self::new(
            address,
            Ipv4Address::CURRENT_NETWORK,
            mask,
            interface,
            0,
            Origin::Connected,
        )
    }

    /// Whether the destination is attached to the outgoing interface.
    pub fn is_direct(&self) -> bool {
        self.gateway.is_unspecified()
    }

    pub fn is_reachable(&self) -> bool {
        self.metric < INFINITY
    }

    fn key(&self) -> Key {
        (self.destination, self.mask)
    }
}

#[derive(Debug, Default)]
struct Inner {
    routes: BTreeMap<Key, RouteEntry>,
    /// The number of routes using each mask, so lookups only try mask
    /// lengths that are present.
    masks: BTreeMap<Ipv4Mask, u32>,
}

impl Inner {
    fn insert(&mut self, entry: RouteEntry) -> Option<RouteEntry> {
        let previous = self.routes.insert(entry.key(), entry);
        if previous.is_none() {
            *self.masks.entry(entry.mask).or_insert(0) += 1;
        }
        previous
    }

    fn remove(&mut self, key: &Key) -> Option<RouteEntry> {
        let removed = self.routes.remove(key)?;
        if let Some(count) = self.masks.get_mut(&key.1) {
            *count -= 1;
            if *count == 0 {
                self.masks.remove(&key.1);
            }
        }
        Some(removed)
    }
}

/// A longest-prefix-match table of [`RouteEntry`]s, keyed by destination and
/// mask.
///
/// Lookups may run concurrently with one another. Mutations take the whole
/// table for their duration, so readers always observe either the state
/// before or after a change.
#[derive(Debug)]
pub struct RouteTable {
    inner: RwLock<Inner>,
    interfaces: Interfaces,
}

impl RouteTable {
    pub fn new(interfaces: Interfaces) -> Self {
        Self {
            inner: Default::default(),
            interfaces,
        }
    }

    pub fn interfaces(&self) -> &Interfaces {
        &self.interfaces
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `entry`, replacing any route with the same destination and mask.
    /// A learned entry's expiry clock starts over.
    pub fn insert(&self, mut entry: RouteEntry) {
        entry.destination = entry.mask.apply(entry.destination);
        if entry.origin == Origin::Learned {
            entry.last_refreshed = Instant::now();
        }
        let previous = self.write().insert(entry);
        route_event(
            if previous.is_some() { "replace" } else { "insert" },
            &entry,
        );
    }

    /// Adds a connected route for the subnet of every interface. A static
    /// route already configured for the same subnet is kept.
    pub fn insert_connected(&self) {
        for iface in self.interfaces.iter() {
            self.modify(iface.address, iface.mask, |existing| match existing {
                Some(entry) if entry.origin == Origin::Static => None,
                _ => Some(RouteEntry::connected(iface.address, iface.mask, iface.slot)),
            });
        }
    }

    /// Reads the route for exactly `destination`/`mask` and, under the same
    /// lock, writes whatever `decide` returns in its place. No other change
    /// to the table can land between the read and the write.
    ///
    /// The returned entry is stored as given; `decide` is responsible for
    /// its timestamp. Returns the stored entry, if any.
    pub fn modify(
        &self,
        destination: Ipv4Address,
        mask: Ipv4Mask,
        decide: impl FnOnce(Option<&RouteEntry>) -> Option<RouteEntry>,
    ) -> Option<RouteEntry> {
        let key = (mask.apply(destination), mask);
        let mut inner = self.write();
        let mut entry = decide(inner.routes.get(&key))?;
        entry.destination = key.0;
        entry.mask = key.1;
        let previous = inner.insert(entry);
        drop(inner);
        let action = match previous {
            None => "insert",
            Some(_) if !entry.is_reachable() => "withdraw",
            Some(_) => "update",
        };
        route_event(action, &entry);
        Some(entry)
    }

    /// Finds the most specific route whose network contains `address`.
    pub fn lookup(&self, address: Ipv4Address) -> Option<RouteEntry> {
        let inner = self.read();
        inner
            .masks
            .keys()
            .rev()
            .find_map(|mask| inner.routes.get(&(mask.apply(address), *mask)))
            .copied()
    }

    /// Finds the route for exactly `destination`/`mask`.
    pub fn find(&self, destination: Ipv4Address, mask: Ipv4Mask) -> Option<RouteEntry> {
        self.read()
            .routes
            .get(&(mask.apply(destination), mask))
            .copied()
    }

    /// Removes the route for exactly `destination`/`mask`, if there is one.
    pub fn remove(&self, destination: Ipv4Address, mask: Ipv4Mask) -> Option<RouteEntry> {
        let removed = self.write().remove(&(mask.apply(destination), mask));
        if let Some(entry) = &removed {
            route_event("remove", entry);
        }
        removed
    }

    /// Marks a route unreachable without restarting its expiry clock. Returns
    /// false if there is no such route.
    pub fn withdraw(&self, destination: Ipv4Address, mask: Ipv4Mask) -> bool {
        self.modify(destination, mask, |existing| {
            existing.map(|entry| RouteEntry {
                metric: INFINITY,
                ..*entry
            })
        })
        .is_some()
    }

    /// A consistent copy of every route, in destination order.
    pub fn entries(&self) -> Vec<RouteEntry> {
        self.read().routes.values().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.read().routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every learned route last refreshed more than `timeout` before
    /// `now` and returns them.
    pub fn sweep_expired_at(&self, now: Instant, timeout: Duration) -> Vec<RouteEntry> {
        let is_expired = |entry: &RouteEntry| {
            entry.origin == Origin::Learned
                && now.saturating_duration_since(entry.last_refreshed) > timeout
        };
        // Most sweeps find nothing, so check under the read lock first
        if !self.read().routes.values().any(is_expired) {
            return vec![];
        }
        let mut inner = self.write();
        let expired: Vec<Key> = inner
            .routes
            .values()
            .filter(|entry| is_expired(entry))
            .map(RouteEntry::key)
            .collect();
        let removed: Vec<_> = expired
            .iter()
            .filter_map(|key| inner.remove(key))
            .collect();
        drop(inner);
        for entry in removed.iter() {
            route_event("expire", entry);
        }
        removed
    }

    /// [`RouteTable::sweep_expired_at`] the current time.
    pub fn sweep_expired(&self, timeout: Duration) -> Vec<RouteEntry> {
        self.sweep_expired_at(Instant::now(), timeout)
    }
}

impl fmt::Display for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<16}{:<16}{:<16}{:<10}{}",
            "destination", "gateway", "mask", "interface", "metric"
        )?;
        for entry in self.entries() {
            let name = self
                .interfaces
                .get(entry.interface)
                .map(|iface| iface.name.as_str())
                .unwrap_or("?");
            writeln!(
                f,
                "{:<16}{:<16}{:<16}{:<10}{}",
                entry.destination.to_string(),
                entry.gateway.to_string(),
                entry.mask.to_string(),
                name,
                entry.metric
            )?;
        }
        Ok(())
    }
}
