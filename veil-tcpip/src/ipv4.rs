//! IPv4 header view

use std::net::Ipv4Addr;

use crate::checksum;
use crate::error::{Error, Result};
use crate::IPV4_VERSION;

/// Minimum IPv4 header length (no options)
pub const IPV4_HEADER_MIN_LEN: usize = 20;

/// View over a raw IPv4 packet
///
/// The view is generic over the buffer type: read access needs
/// `AsRef<[u8]>`, mutation additionally needs `AsMut<[u8]>`. Callers must
/// call [`fill_checksum`](Ipv4Packet::fill_checksum) after mutating any
/// header field.
#[derive(Debug)]
pub struct Ipv4Packet<B> {
    buf: B,
}

impl<B: AsRef<[u8]>> Ipv4Packet<B> {
    /// Wrap a buffer, validating the minimum header length and version nibble
    pub fn new(buf: B) -> Result<Self> {
        let len = buf.as_ref().len();
        if len < IPV4_HEADER_MIN_LEN {
            return Err(Error::Truncated {
                expected: IPV4_HEADER_MIN_LEN,
                actual: len,
            });
        }
        let version = buf.as_ref()[0] >> 4;
        if version != IPV4_VERSION {
            return Err(Error::Version(version));
        }
        let packet = Self { buf };
        if len < packet.header_len() {
            return Err(Error::Truncated {
                expected: packet.header_len(),
                actual: len,
            });
        }
        Ok(packet)
    }

    /// Wrap a buffer without validation
    ///
    /// The buffer must be at least [`IPV4_HEADER_MIN_LEN`] bytes.
    pub fn new_unchecked(buf: B) -> Self {
        Self { buf }
    }

    /// Header length in bytes (IHL × 4)
    pub fn header_len(&self) -> usize {
        usize::from(self.buf.as_ref()[0] & 0x0f) * 4
    }

    /// Total packet length from the header
    pub fn total_length(&self) -> u16 {
        u16::from_be_bytes([self.buf.as_ref()[2], self.buf.as_ref()[3]])
    }

    /// IP protocol number of the payload
    pub fn protocol(&self) -> u8 {
        self.buf.as_ref()[9]
    }

    /// Header checksum field
    pub fn header_checksum(&self) -> u16 {
        u16::from_be_bytes([self.buf.as_ref()[10], self.buf.as_ref()[11]])
    }

    /// Source address
    pub fn source_ip(&self) -> Ipv4Addr {
        let b = self.buf.as_ref();
        Ipv4Addr::new(b[12], b[13], b[14], b[15])
    }

    /// Destination address
    pub fn destination_ip(&self) -> Ipv4Addr {
        let b = self.buf.as_ref();
        Ipv4Addr::new(b[16], b[17], b[18], b[19])
    }

    /// Payload bytes after the header, bounded by the total length
    pub fn payload(&self) -> &[u8] {
        let b = self.buf.as_ref();
        let end = usize::from(self.total_length()).min(b.len());
        &b[self.header_len().min(end)..end]
    }

    /// Length of the payload in bytes
    pub fn payload_len(&self) -> u16 {
        self.total_length().saturating_sub(self.header_len() as u16)
    }

    /// Partial sum of the TCP/UDP pseudo-header for this packet
    ///
    /// Covers source address, destination address, zero + protocol and the
    /// segment length, per RFC 768/793. Pass the result as the seed to the
    /// transport view's `fill_checksum`.
    pub fn pseudo_sum(&self) -> u32 {
        let b = self.buf.as_ref();
        checksum::sum(&b[12..20])
            .wrapping_add(u32::from(self.protocol()))
            .wrapping_add(u32::from(self.payload_len()))
    }

    /// Verify the header checksum
    pub fn verify_checksum(&self) -> bool {
        let header = &self.buf.as_ref()[..self.header_len()];
        checksum::verify(0, header)
    }

    /// Borrow the underlying buffer
    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_ref()
    }

    /// Unwrap the view, returning the buffer
    pub fn into_inner(self) -> B {
        self.buf
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Ipv4Packet<B> {
    /// Set the total packet length
    pub fn set_total_length(&mut self, len: u16) {
        self.buf.as_mut()[2..4].copy_from_slice(&len.to_be_bytes());
    }

    /// Set the source address
    pub fn set_source_ip(&mut self, ip: Ipv4Addr) {
        self.buf.as_mut()[12..16].copy_from_slice(&ip.octets());
    }

    /// Set the destination address
    pub fn set_destination_ip(&mut self, ip: Ipv4Addr) {
        self.buf.as_mut()[16..20].copy_from_slice(&ip.octets());
    }

    /// Mutable payload bytes after the header
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let header_len = self.header_len();
        let end = usize::from(self.total_length()).min(self.buf.as_ref().len());
        &mut self.buf.as_mut()[header_len.min(end)..end]
    }

    /// Recompute and store the header checksum
    pub fn fill_checksum(&mut self) {
        let header_len = self.header_len();
        let buf = self.buf.as_mut();
        buf[10] = 0;
        buf[11] = 0;
        let answer = checksum::checksum(0, &buf[..header_len]);
        buf[10..12].copy_from_slice(&answer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PROTOCOL_UDP;

    // 20-byte header + 8-byte payload, checksum unset
    fn sample_packet() -> Vec<u8> {
        let mut buf = vec![0u8; 28];
        buf[0] = 0x45; // version 4, IHL 5
        buf[2..4].copy_from_slice(&28u16.to_be_bytes());
        buf[8] = 64; // TTL
        buf[9] = PROTOCOL_UDP;
        buf[12..16].copy_from_slice(&[10, 0, 0, 1]);
        buf[16..20].copy_from_slice(&[10, 10, 0, 53]);
        buf
    }

    #[test]
    fn test_accessors() {
        let packet = Ipv4Packet::new(sample_packet()).unwrap();
        assert_eq!(packet.header_len(), 20);
        assert_eq!(packet.total_length(), 28);
        assert_eq!(packet.protocol(), PROTOCOL_UDP);
        assert_eq!(packet.source_ip(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(packet.destination_ip(), Ipv4Addr::new(10, 10, 0, 53));
        assert_eq!(packet.payload().len(), 8);
    }

    #[test]
    fn test_mutators_round_trip() {
        let mut packet = Ipv4Packet::new(sample_packet()).unwrap();
        let (src, dst) = (packet.source_ip(), packet.destination_ip());
        packet.set_source_ip(dst);
        packet.set_destination_ip(src);
        assert_eq!(packet.source_ip(), Ipv4Addr::new(10, 10, 0, 53));
        assert_eq!(packet.destination_ip(), Ipv4Addr::new(10, 0, 0, 1));
    }

    #[test]
    fn test_checksum_fill_and_verify() {
        let mut packet = Ipv4Packet::new(sample_packet()).unwrap();
        packet.fill_checksum();
        assert!(packet.verify_checksum());
        let first = packet.header_checksum();

        // Recomputing with no modification reproduces the checksum
        packet.fill_checksum();
        assert_eq!(packet.header_checksum(), first);

        // Mutating a field and recomputing verifies again
        packet.set_destination_ip(Ipv4Addr::new(192, 168, 1, 1));
        assert!(!packet.verify_checksum());
        packet.fill_checksum();
        assert!(packet.verify_checksum());
        assert_ne!(packet.header_checksum(), first);
    }

    #[test]
    fn test_pseudo_sum_matches_manual() {
        let packet = Ipv4Packet::new(sample_packet()).unwrap();
        let manual = crate::checksum::sum(&[10, 0, 0, 1, 10, 10, 0, 53])
            + u32::from(PROTOCOL_UDP)
            + 8;
        assert_eq!(packet.pseudo_sum(), manual);
    }

    #[test]
    fn test_rejects_truncated() {
        let err = Ipv4Packet::new(&[0x45u8; 8][..]).unwrap_err();
        assert!(matches!(err, Error::Truncated { actual: 8, .. }));
    }

    #[test]
    fn test_rejects_ipv6() {
        let buf = [0x60u8; 40];
        assert_eq!(Ipv4Packet::new(&buf[..]).unwrap_err(), Error::Version(6));
    }
}
