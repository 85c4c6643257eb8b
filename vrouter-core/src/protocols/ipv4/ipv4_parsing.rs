use super::Ipv4Address;
use crate::protocols::utility::Checksum;
use std::fmt::{self, Debug, Formatter};
use thiserror::Error as ThisError;

/// The length in bytes of a header without options
pub const BASE_OCTETS: u16 = 20;
const BASE_WORDS: u8 = (BASE_OCTETS / 4) as u8;

mod offset {
    pub const TIME_TO_LIVE: usize = 8;
    pub const CHECKSUM: usize = 10;
}

/// An IPv4 header (RFC 791 section 3.1). Options are not kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Header {
    /// Header length in 32 bit words
    pub ihl: u8,
    pub type_of_service: u8,
    /// Header and payload, in bytes
    pub total_length: u16,
    pub identification: u16,
    /// In units of 8 bytes
    pub fragment_offset: u16,
    pub flags: ControlFlags,
    pub time_to_live: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub source: Ipv4Address,
    pub destination: Ipv4Address,
}

impl Ipv4Header {
    /// Parses the header at the front of `bytes`. The header checksum is
    /// verified over the whole header, options included.
    pub fn from_bytes(mut bytes: impl Iterator<Item = u8>) -> Result<Self, ParseError> {
        let mut base = [0u8; BASE_OCTETS as usize];
        for byte in base.iter_mut() {
            *byte = bytes.next().ok_or(ParseError::HeaderTooShort)?;
        }

        if base[0] >> 4 != 4 {
            Err(ParseError::IncorrectIpv4Version)?
        }
        let ihl = base[0] & 0x0f;
        if ihl < BASE_WORDS {
            Err(ParseError::InvalidHeaderLength)?
        }

        let word = |at: usize| u16::from_be_bytes([base[at], base[at + 1]]);
        let address =
            |at: usize| Ipv4Address::new([base[at], base[at + 1], base[at + 2], base[at + 3]]);
        let flags_and_offset = word(6);
        let header = Self {
            ihl,
            type_of_service: base[1],
            total_length: word(2),
            identification: word(4),
            fragment_offset: flags_and_offset & 0x1fff,
            flags: ControlFlags((flags_and_offset >> 13) as u8),
            time_to_live: base[offset::TIME_TO_LIVE],
            protocol: base[9],
            checksum: word(offset::CHECKSUM),
            source: address(12),
            destination: address(16),
        };
        if (header.total_length as usize) < header.header_len() {
            Err(ParseError::InvalidTotalLength)?
        }

        let mut checksum = Checksum::new();
        checksum.add_bytes(&base);
        let options = header.header_len() - BASE_OCTETS as usize;
        let mut taken = 0;
        checksum.add_iter(bytes.take(options).inspect(|_| taken += 1));
        if taken < options {
            Err(ParseError::HeaderTooShort)?
        }
        match checksum.finish() {
            0 => Ok(header),
            residue => Err(ParseError::Checksum {
                expected: header.checksum,
                residue,
            }),
        }
    }

    /// Bytes taken by the header, options included.
    pub fn header_len(&self) -> usize {
        self.ihl as usize * 4
    }

    pub fn payload_len(&self) -> usize {
        self.total_length as usize - self.header_len()
    }
}

/// Stores a new time to live into a serialized header and fixes up the
/// header checksum. `header` must hold at least the full header.
pub fn rewrite_time_to_live(header: &mut [u8], time_to_live: u8) {
    let len = ((header[0] & 0x0f) as usize * 4).min(header.len());
    header[offset::TIME_TO_LIVE] = time_to_live;
    header[offset::CHECKSUM..offset::CHECKSUM + 2].fill(0);
    let checksum = Checksum::of(&header[..len]);
    header[offset::CHECKSUM..offset::CHECKSUM + 2].copy_from_slice(&checksum.to_be_bytes());
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("The IPv4 header is incomplete")]
    HeaderTooShort,
    #[error("Expected version 4 in IPv4 header")]
    IncorrectIpv4Version,
    #[error("Expected at least 5 words for IPv4 header")]
    InvalidHeaderLength,
    #[error("The total length is shorter than the header")]
    InvalidTotalLength,
    #[error("Header checksum {expected:#06x} does not cover the header (residue {residue:#06x})")]
    Checksum { expected: u16, residue: u16 },
}

/// Builds option-free IPv4 headers.
pub struct Ipv4HeaderBuilder {
    source: Ipv4Address,
    destination: Ipv4Address,
    protocol: u8,
    payload_length: u16,
    time_to_live: u8,
    identification: u16,
    flags: ControlFlags,
}

impl Ipv4HeaderBuilder {
    pub fn new(
        source: Ipv4Address,
        destination: Ipv4Address,
        protocol: u8,
        payload_length: u16,
    ) -> Self {
        Self {
            source,
            destination,
            protocol,
            payload_length,
            time_to_live: 30,
            identification: 0,
            flags: ControlFlags::DEFAULT,
        }
    }

    pub fn time_to_live(mut self, time_to_live: u8) -> Self {
        self.time_to_live = time_to_live;
        self
    }

    pub fn identification(mut self, identification: u16) -> Self {
        self.identification = identification;
        self
    }

    pub fn flags(mut self, flags: ControlFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn build(self) -> Result<Vec<u8>, HeaderBuildError> {
        let total_length = self
            .payload_length
            .checked_add(BASE_OCTETS)
            .ok_or(HeaderBuildError::OverlyLongPayload)?;

        let mut out = Vec::with_capacity(BASE_OCTETS as usize);
        out.extend_from_slice(&[(4 << 4) | BASE_WORDS, 0]);
        out.extend_from_slice(&total_length.to_be_bytes());
        out.extend_from_slice(&self.identification.to_be_bytes());
        out.extend_from_slice(&((self.flags.as_u8() as u16) << 13).to_be_bytes());
        out.extend_from_slice(&[self.time_to_live, self.protocol, 0, 0]);
        out.extend_from_slice(&self.source.to_bytes());
        out.extend_from_slice(&self.destination.to_bytes());

        let checksum = Checksum::of(&out);
        out[offset::CHECKSUM..offset::CHECKSUM + 2].copy_from_slice(&checksum.to_be_bytes());
        Ok(out)
    }
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum HeaderBuildError {
    #[error("The payload is longer than is allowed")]
    OverlyLongPayload,
}

/// The three flag bits: reserved, don't fragment, more fragments. Stored
/// inverted from the names so the zero value is the common case.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlFlags(u8);

impl ControlFlags {
    pub const DEFAULT: Self = Self::new(true, true);

    pub const fn new(may_fragment: bool, is_last_fragment: bool) -> Self {
        Self(((!may_fragment as u8) << 1) | !is_last_fragment as u8)
    }

    pub const fn may_fragment(&self) -> bool {
        self.0 & 0b10 == 0
    }

    pub const fn is_last_fragment(&self) -> bool {
        self.0 & 0b01 == 0
    }

    pub const fn as_u8(self) -> u8 {
        self.0
    }
}

impl Debug for ControlFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ControlFlags(df={}, mf={})",
            !self.may_fragment(),
            !self.is_last_fragment()
        )
    }
}

impl Default for ControlFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u8> for ControlFlags {
    fn from(bits: u8) -> Self {
        Self(bits & 0b111)
    }
}
