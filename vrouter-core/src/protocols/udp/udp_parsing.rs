use crate::protocols::{
    ipv4::{Ipv4Address, ProtocolNumber},
    utility::{BytesExt, Checksum},
};
use thiserror::Error as ThisError;

/// The number of bytes in a UDP header
pub const HEADER_OCTETS: u16 = 8;

/// A parsed UDP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    pub source: u16,
    pub destination: u16,
    /// Header and payload, in bytes
    pub length: u16,
    /// Zero when the sender did not compute one
    pub checksum: u16,
}

impl UdpHeader {
    /// Parses the header at the front of a complete UDP packet of
    /// `packet_len` bytes, carried between the two IPv4 addresses. A nonzero
    /// checksum is verified over the pseudo header, header, and payload.
    pub fn from_bytes_ipv4(
        mut packet: impl Iterator<Item = u8>,
        packet_len: usize,
        source_address: Ipv4Address,
        destination_address: Ipv4Address,
    ) -> Result<Self, ParseError> {
        let mut field = || packet.next_u16_be().ok_or(ParseError::HeaderTooShort);
        let header = Self {
            source: field()?,
            destination: field()?,
            length: field()?,
            checksum: field()?,
        };
        if header.length as usize != packet_len {
            Err(ParseError::LengthMismatch)?
        }
        if header.checksum == 0 {
            return Ok(header);
        }

        let mut checksum = pseudo_header(source_address, destination_address, header.length);
        checksum.add_word(header.source);
        checksum.add_word(header.destination);
        checksum.add_word(header.length);
        checksum.add_word(header.checksum);
        checksum.add_iter(packet);
        // Everything including the transmitted checksum sums to all ones
        match checksum.finish() {
            0 => Ok(header),
            residue => Err(ParseError::Checksum {
                expected: header.checksum,
                residue,
            }),
        }
    }
}

/// The sum over the IPv4 pseudo header that prefixes UDP checksums.
fn pseudo_header(source: Ipv4Address, destination: Ipv4Address, length: u16) -> Checksum {
    let mut checksum = Checksum::new();
    checksum.add_address(source);
    checksum.add_address(destination);
    checksum.add_word(ProtocolNumber::Udp as u16);
    checksum.add_word(length);
    checksum
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("Too few bytes to constitute a UDP header")]
    HeaderTooShort,
    #[error("Checksum {expected:#06x} does not cover the packet (residue {residue:#06x})")]
    Checksum { expected: u16, residue: u16 },
    #[error("The number of message bytes differs from the header")]
    LengthMismatch,
}

/// Serializes the UDP header for `text`, sent between the given addresses
/// and ports.
pub fn build_udp_header(
    source_address: Ipv4Address,
    source_port: u16,
    destination_address: Ipv4Address,
    destination_port: u16,
    text: impl Iterator<Item = u8>,
    text_len: usize,
) -> Result<Vec<u8>, BuildHeaderError> {
    let length = u16::try_from(text_len + HEADER_OCTETS as usize)
        .map_err(|_| BuildHeaderError::OverlyLongPayload)?;

    let mut checksum = pseudo_header(source_address, destination_address, length);
    checksum.add_word(source_port);
    checksum.add_word(destination_port);
    checksum.add_word(length);
    checksum.add_iter(text);
    // Zero on the wire means "no checksum", so a computed zero is sent as
    // its one's complement twin
    let checksum = match checksum.finish() {
        0 => 0xffff,
        sum => sum,
    };

    let mut out = Vec::with_capacity(HEADER_OCTETS as usize);
    for field in [source_port, destination_port, length, checksum] {
        out.extend_from_slice(&field.to_be_bytes());
    }
    Ok(out)
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum BuildHeaderError {
    #[error("The UDP payload is longer than can fit into a single packet")]
    OverlyLongPayload,
}
