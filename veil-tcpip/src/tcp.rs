//! TCP header view

use crate::checksum;
use crate::error::{Error, Result};

/// Minimum TCP header length (no options)
pub const TCP_HEADER_MIN_LEN: usize = 20;

/// View over a TCP segment (an IPv4 payload)
#[derive(Debug)]
pub struct TcpPacket<B> {
    buf: B,
}

impl<B: AsRef<[u8]>> TcpPacket<B> {
    /// Wrap a buffer, validating the minimum header length
    pub fn new(buf: B) -> Result<Self> {
        let len = buf.as_ref().len();
        if len < TCP_HEADER_MIN_LEN {
            return Err(Error::Truncated {
                expected: TCP_HEADER_MIN_LEN,
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

    /// Header length in bytes (data offset × 4)
    pub fn header_len(&self) -> usize {
        usize::from(self.buf.as_ref()[12] >> 4) * 4
    }

    /// Checksum field
    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buf.as_ref()[16], self.buf.as_ref()[17]])
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> TcpPacket<B> {
    /// Set the source port
    pub fn set_source_port(&mut self, port: u16) {
        self.buf.as_mut()[0..2].copy_from_slice(&port.to_be_bytes());
    }

    /// Set the destination port
    pub fn set_destination_port(&mut self, port: u16) {
        self.buf.as_mut()[2..4].copy_from_slice(&port.to_be_bytes());
    }

    /// Recompute and store the checksum over the pseudo-header and segment
    pub fn fill_checksum(&mut self, pseudo_sum: u32) {
        let buf = self.buf.as_mut();
        buf[16] = 0;
        buf[17] = 0;
        let answer = checksum::checksum(pseudo_sum, buf);
        buf[16..18].copy_from_slice(&answer);
    }
}
