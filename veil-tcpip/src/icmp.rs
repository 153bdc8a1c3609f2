//! ICMP header view

use crate::checksum;
use crate::error::{Error, Result};

/// ICMP header length
pub const ICMP_HEADER_LEN: usize = 8;

/// ICMP echo request type
pub const ICMP_TYPE_ECHO_REQUEST: u8 = 8;

/// View over an ICMP message (an IPv4 payload)
#[derive(Debug)]
pub struct IcmpPacket<B> {
    buf: B,
}

impl<B: AsRef<[u8]>> IcmpPacket<B> {
    /// Wrap a buffer, validating the minimum header length
    pub fn new(buf: B) -> Result<Self> {
        let len = buf.as_ref().len();
        if len < ICMP_HEADER_LEN {
            return Err(Error::Truncated {
                expected: ICMP_HEADER_LEN,
                actual: len,
            });
        }
        Ok(Self { buf })
    }

    /// Message type
    pub fn message_type(&self) -> u8 {
        self.buf.as_ref()[0]
    }

    /// Message code
    pub fn code(&self) -> u8 {
        self.buf.as_ref()[1]
    }

    /// Checksum field
    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buf.as_ref()[2], self.buf.as_ref()[3]])
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> IcmpPacket<B> {
    /// Recompute and store the checksum over the whole message
    ///
    /// ICMP has no pseudo-header; the checksum covers the message only.
    pub fn fill_checksum(&mut self) {
        let buf = self.buf.as_mut();
        buf[2] = 0;
        buf[3] = 0;
        let answer = checksum::checksum(0, buf);
        buf[2..4].copy_from_slice(&answer);
    }
}
