//! Parsing and building of [Internet Protocol version
//! 4](https://datatracker.ietf.org/doc/html/rfc791) headers.

pub mod ipv4_parsing;
pub use ipv4_parsing::{rewrite_time_to_live, Ipv4Header, Ipv4HeaderBuilder};

mod ipv4_address;
pub use ipv4_address::Ipv4Address;

pub mod subnetting;
pub use subnetting::{cidr_to_ip, Ipv4Mask, Ipv4Net};

/// The EtherType carried by frames holding an IPv4 datagram.
pub const ETHER_TYPE: u16 = 0x0800;

// Enum for which upstream protocol to use
// see https://en.wikipedia.org/wiki/List_of_IP_protocol_numbers
// for more info about protocol numbers
#[derive(Eq, PartialEq, Hash, Debug, Clone, Copy)]
#[repr(u8)]
pub enum ProtocolNumber {
    Icmp = 1,
    Tcp = 6,
    Udp = 17,
    Other = 0,
}

impl From<u8> for ProtocolNumber {
    fn from(value: u8) -> Self {
        match value {
            1 => ProtocolNumber::Icmp,
            6 => ProtocolNumber::Tcp,
            17 => ProtocolNumber::Udp,
            _ => ProtocolNumber::Other,
        }
    }
}
