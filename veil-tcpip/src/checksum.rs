//! Internet checksum (RFC 1071)
//!
//! Shared by the IPv4 header checksum and the TCP/UDP pseudo-header
//! checksums. The sum is carried as a `u32` so partial sums (for example a
//! pseudo-header seed) can be combined before folding.

/// Sum a byte range as 16-bit big-endian words
///
/// An odd trailing byte is treated as the high byte of a final word.
pub fn sum(data: &[u8]) -> u32 {
    let mut acc: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        acc = acc.wrapping_add(u32::from(u16::from_be_bytes([chunk[0], chunk[1]])));
    }
    if let [last] = chunks.remainder() {
        acc = acc.wrapping_add(u32::from(*last) << 8);
    }
    acc
}

/// Finish a checksum over `data` with the given partial sum as seed
///
/// Folds the carries back into the low 16 bits and returns the one's
/// complement as two bytes, high byte first, ready to store into a header.
pub fn checksum(seed: u32, data: &[u8]) -> [u8; 2] {
    let mut acc = seed.wrapping_add(sum(data));
    while acc >> 16 != 0 {
        acc = (acc >> 16) + (acc & 0xffff);
    }
    let folded = !(acc as u16);
    folded.to_be_bytes()
}

/// Verify a checksummed byte range
///
/// The sum of a correctly checksummed range (checksum field included) folds
/// to `0xffff`.
pub fn verify(seed: u32, data: &[u8]) -> bool {
    let mut acc = seed.wrapping_add(sum(data));
    while acc >> 16 != 0 {
        acc = (acc >> 16) + (acc & 0xffff);
    }
    acc as u16 == 0xffff
}
