//! UDP header view

use crate::checksum;
use crate::error::{Error, Result};

/// UDP header length
pub const UDP_HEADER_LEN: usize = 8;

/// View over a UDP segment (an IPv4 payload)
#[derive(Debug)]
pub struct UdpPacket<B> {
    buf: B,
}

impl<B: AsRef<[u8]>> UdpPacket<B> {
    /// Wrap a buffer, validating the minimum header length
    pub fn new(buf: B) -> Result<Self> {
        let len = buf.as_ref().len();
        if len < UDP_HEADER_LEN {
            return Err(Error::Truncated {
                expected: UDP_HEADER_LEN,
                actual: len,
            });
        }
        Ok(Self { buf })
    }

    /// Source port
    pub fn source_port(&self) -> u16 {
        u16::from_be_bytes([self.buf.as_ref()[0], self.buf.as_ref()[1]])
    }

    /// Destination port
    pub fn destination_port(&self) -> u16 {
        u16::from_be_bytes([self.buf.as_ref()[2], self.buf.as_ref()[3]])
    }

    /// Length field (header + payload)
    pub fn length(&self) -> u16 {
        u16::from_be_bytes([self.buf.as_ref()[4], self.buf.as_ref()[5]])
    }

    /// Checksum field
    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buf.as_ref()[6], self.buf.as_ref()[7]])
    }

    /// Payload bytes, bounded by the length field
    pub fn payload(&self) -> &[u8] {
        let b = self.buf.as_ref();
        let end = usize::from(self.length()).min(b.len());
        &b[UDP_HEADER_LEN.min(end)..end]
    }

    /// Verify the checksum against the given pseudo-header sum
    pub fn verify_checksum(&self, pseudo_sum: u32) -> bool {
        let b = self.buf.as_ref();
        let end = usize::from(self.length()).min(b.len());
        checksum::verify(pseudo_sum, &b[..end])
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> UdpPacket<B> {
    /// Set the source port
    pub fn set_source_port(&mut self, port: u16) {
        self.buf.as_mut()[0..2].copy_from_slice(&port.to_be_bytes());
    }

    /// Set the destination port
    pub fn set_destination_port(&mut self, port: u16) {
        self.buf.as_mut()[2..4].copy_from_slice(&port.to_be_bytes());
    }

    /// Set the length field (header + payload)
    pub fn set_length(&mut self, len: u16) {
        self.buf.as_mut()[4..6].copy_from_slice(&len.to_be_bytes());
    }

    /// Mutable payload bytes, bounded by the length field
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let end = usize::from(self.length()).min(self.buf.as_ref().len());
        &mut self.buf.as_mut()[UDP_HEADER_LEN.min(end)..end]
    }

    /// Recompute and store the checksum over the pseudo-header and segment
    ///
    /// `pseudo_sum` comes from [`Ipv4Packet::pseudo_sum`](crate::Ipv4Packet::pseudo_sum).
    /// A computed checksum of zero is transmitted as `0xffff` per RFC 768.
    pub fn fill_checksum(&mut self, pseudo_sum: u32) {
        let end = usize::from(self.length()).min(self.buf.as_ref().len());
        let buf = self.buf.as_mut();
        buf[6] = 0;
        buf[7] = 0;
        let mut answer = checksum::checksum(pseudo_sum, &buf[..end]);
        if answer == [0, 0] {
            answer = [0xff, 0xff];
        }
        buf[6..8].copy_from_slice(&answer);
    }
}
