//! Parsing and building of [User Datagram
//! Protocol](https://datatracker.ietf.org/doc/html/rfc768) headers. The
//! router only terminates UDP for its own routing protocol traffic.

pub mod udp_parsing;
pub use udp_parsing::{build_udp_header, UdpHeader};
