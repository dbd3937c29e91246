//! Binary codec helpers shared by every protocol layer.
//!
//! All wire formats handled by this stack are big-endian and use the
//! RFC 1071 one's-complement 16-bit checksum, so the helpers live here
//! rather than being re-derived per protocol.

// ============================================================================
// Byte-order Helpers
// ============================================================================

/// Read a big-endian `u16` at `offset`.
///
/// Callers are expected to have length-checked the buffer; this is a
/// plain indexed read.
#[inline]
pub fn get_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

/// Write a big-endian `u16` at `offset`.
#[inline]
pub fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

// ============================================================================
// Internet Checksum (RFC 1071)
// ============================================================================

/// Sum a byte slice as big-endian 16-bit words into a running 32-bit
/// accumulator. An odd trailing byte is padded with zero on the right.
#[inline]
fn sum_words(mut sum: u32, data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum = sum.wrapping_add(u16::from_be_bytes([chunk[0], chunk[1]]) as u32);
    }
    if let Some(&last) = chunks.remainder().first() {
        sum = sum.wrapping_add((last as u32) << 8);
    }
    sum
}

/// Fold a 32-bit accumulator to 16 bits and return the one's complement.
#[inline]
fn fold(mut sum: u32) -> u16 {
    while (sum >> 16) != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// Compute the one's-complement Internet checksum over `data`.
///
/// When computed over a header that already contains its checksum field,
/// the result is 0 iff the checksum is valid.
pub fn internet_checksum(data: &[u8]) -> u16 {
    fold(sum_words(0, data))
}

/// Compute the Internet checksum over an IPv4 pseudo-header plus a
/// transport segment (UDP per RFC 768; the same construction serves TCP).
///
/// The pseudo-header is: source IP, destination IP, a zero byte, the
/// protocol number and the segment length.
pub fn pseudo_checksum(src: [u8; 4], dst: [u8; 4], protocol: u8, segment: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    sum = sum_words(sum, &src);
    sum = sum_words(sum, &dst);
    sum = sum.wrapping_add(protocol as u32);
    sum = sum.wrapping_add(segment.len() as u32);
    fold(sum_words(sum, segment))
}

// ============================================================================
// Tests
// ============================================================================
