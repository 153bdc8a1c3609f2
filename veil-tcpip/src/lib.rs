//! veil-tcpip - packet primitives for the veil tunnel engine
//!
//! This crate provides zero-copy accessor views over raw IPv4, TCP, UDP and
//! ICMP byte buffers, plus the Internet checksum (RFC 1071) used by all of
//! them. A view never owns or reallocates the buffer it wraps; it only gives
//! named-field access to the header bytes.
//!
//! Mutation follows a two-step discipline: set whatever header fields you
//! need, then call the view's `fill_checksum` method once. Checksums are
//! never updated implicitly, so a half-edited packet is visibly invalid
//! rather than silently carrying a stale checksum.
//!
//! # Example
//!
//! ```
//! use veil_tcpip::{Ipv4Packet, UdpPacket, PROTOCOL_UDP};
//!
//! # fn example(buf: &mut [u8]) -> veil_tcpip::Result<()> {
//! let mut packet = Ipv4Packet::new(buf)?;
//! if packet.protocol() == PROTOCOL_UDP {
//!     let pseudo_sum = packet.pseudo_sum();
//!     let mut udp = UdpPacket::new(packet.payload_mut())?;
//!     udp.set_destination_port(53);
//!     udp.fill_checksum(pseudo_sum);
//!     packet.fill_checksum();
//! }
//! # Ok(())
//! # }
//! ```

pub mod checksum;
mod error;
mod icmp;
mod ipv4;
mod tcp;
mod udp;

pub use error::{Error, Result};
pub use icmp::{IcmpPacket, ICMP_HEADER_LEN, ICMP_TYPE_ECHO_REQUEST};
pub use ipv4::{Ipv4Packet, IPV4_HEADER_MIN_LEN};
pub use tcp::{TcpPacket, TCP_HEADER_MIN_LEN};
pub use udp::{UdpPacket, UDP_HEADER_LEN};

/// IP protocol number for ICMP
pub const PROTOCOL_ICMP: u8 = 1;

/// IP protocol number for TCP
pub const PROTOCOL_TCP: u8 = 6;

/// IP protocol number for UDP
pub const PROTOCOL_UDP: u8 = 17;

/// IP version nibble for IPv4
pub const IPV4_VERSION: u8 = 4;

/// Extract the IP version nibble from the first byte of a packet
///
/// Returns `None` for an empty buffer.
pub fn ip_version(packet: &[u8]) -> Option<u8> {
    packet.first().map(|b| b >> 4)
}
