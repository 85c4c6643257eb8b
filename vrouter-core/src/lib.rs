//! The core of a small software IP router, a library for forwarding IPv4
//! datagrams between a handful of links and learning routes from neighbors
//! with RIPv2.
//!
//! # Organization
//! - [`RouteTable`] holds the forwarding rules and expires stale ones
//! - [`Forwarding`] validates each datagram and sends it on or delivers it
//!   locally
//! - [`Rip`](protocols::Rip) exchanges distance-vector advertisements and
//!   keeps the table current
//! - [`Router`] owns one of each and runs them against a [`Transport`]
//!
//! # Transports
//!
//! The router never opens a socket itself. Anything that implements
//! [`Transport`] can carry it: the in-memory [`networks::Segment`] used by
//! simulations and tests, the [`networks::Capture`] recorder, or a real link
//! supplied by the binary.

mod logging;
pub mod protocols;

pub mod arp_cache;
pub use arp_cache::ArpCache;

pub mod forwarding;
pub use forwarding::{Disposition, DropReason, Forwarding};

pub mod network;
pub use network::{Delivery, Interface, Interfaces, Mac, Slot, Transport};

pub mod networks;

pub mod route_table;
pub use route_table::{Origin, RouteEntry, RouteTable};

mod router;
pub use router::Router;

mod shutdown;
pub use shutdown::{ExitStatus, Shutdown};

/// A raw Ethernet frame, without preamble or frame check sequence.
pub type Frame = Vec<u8>;
