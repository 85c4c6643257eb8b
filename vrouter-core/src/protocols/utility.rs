//! Byte-level helpers shared by the packet codecs.

use super::ipv4::Ipv4Address;

/// The Internet checksum (RFC 1071): the one's complement of the one's
/// complement sum of 16 bit words.
///
/// Words are summed into a wide accumulator and the carries are folded back
/// in when the checksum is read, so words can be added in any order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum {
    sum: u32,
}

impl Checksum {
    pub fn new() -> Self {
        Self::default()
    }

    /// The checksum of `bytes`, whose own checksum field (if any) must be
    /// zero.
    pub fn of(bytes: &[u8]) -> u16 {
        let mut checksum = Self::new();
        checksum.add_bytes(bytes);
        checksum.finish()
    }

    pub fn add_word(&mut self, word: u16) {
        self.sum += word as u32;
        self.fold();
    }

    pub fn add_address(&mut self, address: Ipv4Address) {
        let [a, b, c, d] = address.to_bytes();
        self.add_word(u16::from_be_bytes([a, b]));
        self.add_word(u16::from_be_bytes([c, d]));
    }

    /// Adds a run of bytes as big-endian words. A trailing odd byte is
    /// padded with zero, so only the last run added may have odd length.
    pub fn add_bytes(&mut self, bytes: &[u8]) {
        let mut words = bytes.chunks_exact(2);
        for word in words.by_ref() {
            self.add_word(u16::from_be_bytes([word[0], word[1]]));
        }
        if let [last] = words.remainder() {
            self.add_word(u16::from_be_bytes([*last, 0]));
        }
    }

    /// Like [`Checksum::add_bytes`], for bytes that are not in a slice.
    pub fn add_iter(&mut self, mut bytes: impl Iterator<Item = u8>) {
        while let Some(high) = bytes.next() {
            self.add_word(u16::from_be_bytes([high, bytes.next().unwrap_or(0)]));
        }
    }

    pub fn finish(&self) -> u16 {
        !(self.sum as u16)
    }

    fn fold(&mut self) {
        while self.sum > 0xffff {
            self.sum = (self.sum & 0xffff) + (self.sum >> 16);
        }
    }
}

/// Big-endian reads from a byte iterator. Each returns `None` when the
/// iterator runs out partway.
pub trait BytesExt: Iterator<Item = u8> {
    fn next_u16_be(&mut self) -> Option<u16> {
        Some(u16::from_be_bytes([self.next()?, self.next()?]))
    }

    fn next_u32_be(&mut self) -> Option<u32> {
        Some(u32::from_be_bytes([
            self.next()?,
            self.next()?,
            self.next()?,
            self.next()?,
        ]))
    }

    /// Reads six bytes into the low bits of a `u64`, the layout of a MAC
    /// address.
    fn next_u48_be(&mut self) -> Option<u64> {
        let mut bytes = [0u8; 8];
        for byte in bytes[2..].iter_mut() {
            *byte = self.next()?;
        }
        Some(u64::from_be_bytes(bytes))
    }

    fn next_ipv4addr(&mut self) -> Option<Ipv4Address> {
        self.next_u32_be().map(Ipv4Address::from)
    }
}

impl<T: Iterator<Item = u8>> BytesExt for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian() {
        let bytes = [0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0, 0x0a];
        let mut iter = bytes.iter().cloned();
        assert_eq!(iter.next_u16_be(), Some(0x1234));
        assert_eq!(iter.next_u48_be(), Some(0x5678_9abc_def0));
        assert_eq!(iter.next_u16_be(), None);

        let mut iter = [10u8, 0, 0, 1].into_iter();
        assert_eq!(iter.next_ipv4addr(), Some(Ipv4Address::new([10, 0, 0, 1])));
    }

    #[test]
    fn checksum_of_known_header() {
        // The header from RFC 1071's worked example, checksum field zeroed
        let header = [
            0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];
        assert_eq!(Checksum::of(&header), 0xb861);

        // Summing a header with its checksum in place yields zero
        let mut with_checksum = header;
        with_checksum[10..12].copy_from_slice(&0xb861u16.to_be_bytes());
        assert_eq!(Checksum::of(&with_checksum), 0);
    }

    #[test]
    fn odd_length_is_zero_padded() {
        let mut slice = Checksum::new();
        slice.add_bytes(&[0x01, 0x02, 0x03]);
        let mut iter = Checksum::new();
        iter.add_iter([0x01u8, 0x02, 0x03].into_iter());
        let mut words = Checksum::new();
        words.add_word(0x0102);
        words.add_word(0x0300);
        assert_eq!(slice, words);
        assert_eq!(iter, words);
    }

    #[test]
    fn carries_wrap_around() {
        let mut checksum = Checksum::new();
        checksum.add_word(0xffff);
        checksum.add_word(0x0002);
        // 0xffff + 0x0002 = 0x1_0001, folded to 0x0002
        assert_eq!(checksum.finish(), !0x0002);
    }
}
