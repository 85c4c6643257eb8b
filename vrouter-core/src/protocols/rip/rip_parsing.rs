//! The RIPv2 message format.
//!
//! See <https://www.rfc-editor.org/rfc/rfc2453> section 4. A message is a
//! four byte header (command, version, two zero bytes) followed by up to 25
//! twenty byte route entries.

use crate::protocols::{
    ipv4::{Ipv4Address, Ipv4Mask},
    utility::BytesExt,
};
use thiserror::Error as ThisError;

/// The number of bytes in the message header
const HEADER_OCTETS: usize = 4;
/// The number of bytes in each route entry
const ENTRY_OCTETS: usize = 20;
/// The most entries a single message may carry
pub const MAX_ENTRIES: usize = 25;
/// The address family identifier for IP
pub const AF_INET: u16 = 2;
/// The protocol version we send
pub const VERSION: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Request = 1,
    Response = 2,
}

impl TryFrom<u8> for Command {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Command::Request),
            2 => Ok(Command::Response),
            other => Err(ParseError::UnknownCommand(other)),
        }
    }
}

/// One advertised route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RipEntry {
    pub address_family: u16,
    pub route_tag: u16,
    pub address: Ipv4Address,
    pub subnet_mask: Ipv4Mask,
    /// Where the advertiser forwards traffic for this route, or `0.0.0.0`
    /// for "through the advertiser itself"
    pub next_hop: Ipv4Address,
    pub metric: u32,
}

impl RipEntry {
    pub fn new(
        address: Ipv4Address,
        subnet_mask: Ipv4Mask,
        next_hop: Ipv4Address,
        metric: u32,
    ) -> Self {
        Self {
            address_family: AF_INET,
            route_tag: 0,
            address,
            subnet_mask,
            next_hop,
            metric,
        }
    }

    fn from_bytes(bytes: &mut impl Iterator<Item = u8>) -> Result<Self, ParseError> {
        const HTS: ParseError = ParseError::EntryTooShort;
        let address_family = bytes.next_u16_be().ok_or(HTS)?;
        let route_tag = bytes.next_u16_be().ok_or(HTS)?;
        let address = bytes.next_ipv4addr().ok_or(HTS)?;
        let mask = bytes.next_u32_be().ok_or(HTS)?;
        let subnet_mask = Ipv4Mask::try_from(mask).map_err(ParseError::InvalidMask)?;
        let next_hop = bytes.next_ipv4addr().ok_or(HTS)?;
        let metric = bytes.next_u32_be().ok_or(HTS)?;
        Ok(Self {
            address_family,
            route_tag,
            address,
            subnet_mask,
            next_hop,
            metric,
        })
    }

    fn build(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.address_family.to_be_bytes());
        out.extend_from_slice(&self.route_tag.to_be_bytes());
        out.extend_from_slice(&self.address.to_bytes());
        out.extend_from_slice(&self.subnet_mask.to_u32().to_be_bytes());
        out.extend_from_slice(&self.next_hop.to_bytes());
        out.extend_from_slice(&self.metric.to_be_bytes());
    }
}

/// A RIP message: a command and the routes it carries. Requests for a full
/// table carry no entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RipPacket {
    pub command: Command,
    pub version: u8,
    pub entries: Vec<RipEntry>,
}

impl RipPacket {
    /// A request for the receiver's whole routing table.
    pub fn new_full_table_request() -> Self {
        Self {
            command: Command::Request,
            version: VERSION,
            entries: Vec::new(),
        }
    }

    /// Splits `entries` into as many responses as the per-message entry limit
    /// requires. An empty table still yields one empty response.
    pub fn new_responses(entries: Vec<RipEntry>) -> Vec<Self> {
        if entries.is_empty() {
            return vec![Self::new_response(entries)];
        }
        entries
            .chunks(MAX_ENTRIES)
            .map(|chunk| Self::new_response(chunk.to_vec()))
            .collect()
    }

    fn new_response(entries: Vec<RipEntry>) -> Self {
        Self {
            command: Command::Response,
            version: VERSION,
            entries,
        }
    }

    /// The serialized size of this message.
    pub fn len(&self) -> usize {
        HEADER_OCTETS + self.entries.len() * ENTRY_OCTETS
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Creates a serialized message.
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.push(self.command as u8);
        out.push(self.version);
        out.extend_from_slice(&[0, 0]);
        for entry in self.entries.iter() {
            entry.build(&mut out);
        }
        out
    }

    /// Parses a message from its serialized bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < HEADER_OCTETS {
            Err(ParseError::HeaderTooShort)?
        }
        let body = &bytes[HEADER_OCTETS..];
        if body.len() % ENTRY_OCTETS != 0 {
            Err(ParseError::EntryTooShort)?
        }
        let command = Command::try_from(bytes[0])?;
        let version = bytes[1];
        let mut iter = body.iter().cloned();
        let entries = (0..body.len() / ENTRY_OCTETS)
            .map(|_| RipEntry::from_bytes(&mut iter))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            command,
            version,
            entries,
        })
    }
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("Too few bytes to constitute a RIP header")]
    HeaderTooShort,
    #[error("The RIP message ends partway through a route entry")]
    EntryTooShort,
    #[error("Unrecognized RIP command {0}")]
    UnknownCommand(u8),
    #[error("Route entry carries the non-contiguous mask {0:#010x}")]
    InvalidMask(u32),
}
