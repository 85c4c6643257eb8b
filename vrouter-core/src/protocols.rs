//! The wire formats a router speaks, and the routing protocol built on them.

pub mod ethernet;
pub mod ipv4;
pub mod rip;
pub mod udp;
pub mod utility;

pub use rip::Rip;
