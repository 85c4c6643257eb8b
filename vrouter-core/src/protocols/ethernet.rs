//! Ethernet II framing. Frames carry no preamble or frame check sequence;
//! those belong to the transport.

use crate::{network::Mac, protocols::utility::BytesExt};
use thiserror::Error as ThisError;

/// The number of bytes in an Ethernet II header
pub const HEADER_OCTETS: usize = 14;

/// An Ethernet II header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EthernetHeader {
    /// The MAC address the frame is addressed to
    pub destination: Mac,
    /// The MAC address of the sending interface
    pub source: Mac,
    /// The protocol carried in the payload
    pub ether_type: u16,
}

impl EthernetHeader {
    pub const fn new(destination: Mac, source: Mac, ether_type: u16) -> Self {
        Self {
            destination,
            source,
            ether_type,
        }
    }

    /// Parses a header from a byte iterator.
    pub fn from_bytes(mut bytes: impl Iterator<Item = u8>) -> Result<Self, ParseError> {
        const HTS: ParseError = ParseError::HeaderTooShort;
        let destination = bytes.next_u48_be().ok_or(HTS)?;
        let source = bytes.next_u48_be().ok_or(HTS)?;
        let ether_type = bytes.next_u16_be().ok_or(HTS)?;
        Ok(Self {
            destination,
            source,
            ether_type,
        })
    }

    /// Creates a serialized header.
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_OCTETS);
        // MAC addresses are 6 bytes long
        out.extend_from_slice(&self.destination.to_be_bytes()[2..8]);
        out.extend_from_slice(&self.source.to_be_bytes()[2..8]);
        out.extend_from_slice(&self.ether_type.to_be_bytes());
        out
    }
}

/// Overwrites the link-layer addresses of a serialized frame.
pub fn rewrite_addresses(frame: &mut [u8], destination: Mac, source: Mac) {
    frame[0..6].copy_from_slice(&destination.to_be_bytes()[2..8]);
    frame[6..12].copy_from_slice(&source.to_be_bytes()[2..8]);
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("Too few bytes to constitute an Ethernet header")]
    HeaderTooShort,
}
