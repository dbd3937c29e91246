//! IPv4: addresses, header parse/serialize, protocol numbers.
//!
//! Parsing is strict about structure (version, IHL, length accounting,
//! header checksum) but deliberately neutral about content: this stack
//! is an end host that never routes, so anything well-formed and
//! addressed to us is accepted and handed to the protocol demux.
//!
//! # References
//! - RFC 791: Internet Protocol

use bitflags::bitflags;
use core::fmt;

use crate::codec::{internet_checksum, put_u16};

/// IPv4 header length without options (IHL == 5).
pub const IPV4_HEADER_LEN: usize = 20;

// ============================================================================
// Protocol Numbers
// ============================================================================

/// IPv4 protocol numbers handled by this stack.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ipv4Proto {
    /// ICMP (Internet Control Message Protocol)
    Icmp = 1,
    /// UDP (User Datagram Protocol)
    Udp = 17,
}

impl Ipv4Proto {
    /// Try to convert from a raw protocol number.
    pub fn from_raw(v: u8) -> Option<Self> {
        match v {
            1 => Some(Ipv4Proto::Icmp),
            17 => Some(Ipv4Proto::Udp),
            _ => None,
        }
    }

    /// Get the raw protocol number.
    pub fn to_raw(self) -> u8 {
        self as u8
    }
}

// ============================================================================
// IPv4 Address
// ============================================================================

/// IPv4 address (4 bytes).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ipv4Addr(pub [u8; 4]);

impl Ipv4Addr {
    /// Create from 4 octets.
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Ipv4Addr([a, b, c, d])
    }

    /// All zeros (0.0.0.0).
    pub const UNSPECIFIED: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 0);

    /// Broadcast (255.255.255.255).
    pub const BROADCAST: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 255);

    /// Check for the broadcast address (255.255.255.255).
    #[inline]
    pub fn is_broadcast(&self) -> bool {
        self.0 == [255, 255, 255, 255]
    }

    /// Check for a multicast address (224.0.0.0/4).
    #[inline]
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0xf0 == 0xe0
    }

    /// Check for the unspecified address (0.0.0.0).
    #[inline]
    pub fn is_unspecified(&self) -> bool {
        self.0 == [0, 0, 0, 0]
    }

    /// Get the raw bytes.
    #[inline]
    pub fn octets(&self) -> [u8; 4] {
        self.0
    }
}

impl From<[u8; 4]> for Ipv4Addr {
    fn from(bytes: [u8; 4]) -> Self {
        Ipv4Addr(bytes)
    }
}

impl fmt::Debug for Ipv4Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

impl fmt::Display for Ipv4Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================================================
// Header Flags
// ============================================================================

bitflags! {
    /// IPv4 header flag bits, positioned as in the flags/fragment word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Ipv4Flags: u16 {
        /// Don't Fragment
        const DONT_FRAGMENT = 0x4000;
        /// More Fragments
        const MORE_FRAGMENTS = 0x2000;
    }
}

// ============================================================================
// IPv4 Header
// ============================================================================

/// Parsed IPv4 header.
///
/// Options are not stored here; `parse_ipv4` returns them as a slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    /// IP version (always 4 after a successful parse)
    pub version: u8,
    /// Internet Header Length in 32-bit words (minimum 5)
    pub ihl: u8,
    /// Type of Service / DSCP + ECN
    pub dscp_ecn: u8,
    /// Total length of the IP packet (header + payload)
    pub total_len: u16,
    /// Identification, shared by all fragments of one datagram
    pub identification: u16,
    /// Flags (3 bits) + fragment offset (13 bits, units of 8 bytes)
    pub flags_fragment: u16,
    /// Time to Live
    pub ttl: u8,
    /// Protocol number
    pub protocol: u8,
    /// Header checksum as read from the wire
    pub checksum: u16,
    /// Source address
    pub src: Ipv4Addr,
    /// Destination address
    pub dst: Ipv4Addr,
    /// Options length in bytes (header_len - 20)
    pub options_len: usize,
}

impl Ipv4Header {
    /// Header length in bytes.
    #[inline]
    pub fn header_len(&self) -> usize {
        (self.ihl as usize) * 4
    }

    /// Payload length in bytes.
    #[inline]
    pub fn payload_len(&self) -> usize {
        (self.total_len as usize).saturating_sub(self.header_len())
    }

    /// Flag bits of the flags/fragment word.
    #[inline]
    pub fn flags(&self) -> Ipv4Flags {
        Ipv4Flags::from_bits_truncate(self.flags_fragment)
    }

    /// Check for the More Fragments flag.
    #[inline]
    pub fn more_fragments(&self) -> bool {
        self.flags().contains(Ipv4Flags::MORE_FRAGMENTS)
    }

    /// Fragment offset in 8-byte units.
    #[inline]
    pub fn fragment_offset(&self) -> u16 {
        self.flags_fragment & 0x1fff
    }

    /// Check whether this packet is part of a fragmented datagram.
    #[inline]
    pub fn is_fragment(&self) -> bool {
        self.more_fragments() || self.fragment_offset() != 0
    }

    /// Protocol number as enum, if this stack knows it.
    #[inline]
    pub fn proto(&self) -> Option<Ipv4Proto> {
        Ipv4Proto::from_raw(self.protocol)
    }
}

// ============================================================================
// IPv4 Errors
// ============================================================================

/// Errors from IPv4 header parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ipv4Error {
    /// Packet is shorter than its own length fields claim
    Truncated,
    /// IP version is not 4
    BadVersion,
    /// Internet Header Length is less than 5
    BadIhl,
    /// Total length is smaller than the header length
    BadTotalLen,
    /// Header checksum did not verify
    ChecksumMismatch,
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse and validate an IPv4 packet.
///
/// `verify_checksum` skips the header-checksum check when false, for
/// configurations that trust the link layer (or a test that constructs
/// headers by hand).
///
/// # Returns
/// On success: `(header, options, payload)`.
pub fn parse_ipv4(
    packet: &[u8],
    verify_checksum: bool,
) -> Result<(Ipv4Header, &[u8], &[u8]), Ipv4Error> {
    if packet.len() < IPV4_HEADER_LEN {
        return Err(Ipv4Error::Truncated);
    }

    let version_ihl = packet[0];
    let version = version_ihl >> 4;
    let ihl = version_ihl & 0x0f;

    if version != 4 {
        return Err(Ipv4Error::BadVersion);
    }
    if ihl < 5 {
        return Err(Ipv4Error::BadIhl);
    }

    let header_len = (ihl as usize) * 4;
    if header_len > packet.len() {
        return Err(Ipv4Error::Truncated);
    }

    let total_len = u16::from_be_bytes([packet[2], packet[3]]);
    if (total_len as usize) > packet.len() {
        return Err(Ipv4Error::Truncated);
    }
    if (total_len as usize) < header_len {
        return Err(Ipv4Error::BadTotalLen);
    }

    // A valid header sums to zero with its checksum field included.
    let checksum = u16::from_be_bytes([packet[10], packet[11]]);
    if verify_checksum && internet_checksum(&packet[..header_len]) != 0 {
        return Err(Ipv4Error::ChecksumMismatch);
    }

    let hdr = Ipv4Header {
        version,
        ihl,
        dscp_ecn: packet[1],
        total_len,
        identification: u16::from_be_bytes([packet[4], packet[5]]),
        flags_fragment: u16::from_be_bytes([packet[6], packet[7]]),
        ttl: packet[8],
        protocol: packet[9],
        checksum,
        src: Ipv4Addr([packet[12], packet[13], packet[14], packet[15]]),
        dst: Ipv4Addr([packet[16], packet[17], packet[18], packet[19]]),
        options_len: header_len - IPV4_HEADER_LEN,
    };

    let options = &packet[IPV4_HEADER_LEN..header_len];
    let payload = &packet[header_len..total_len as usize];

    Ok((hdr, options, payload))
}

// ============================================================================
// Building
// ============================================================================

/// Build a 20-byte IPv4 header for transmission, checksum filled in.
///
/// `frag_offset` is in 8-byte units; combined with `flags` it forms the
/// flags/fragment word, so the send path can emit both whole packets
/// and fragments through the same builder.
#[allow(clippy::too_many_arguments)]
pub fn build_ipv4_header(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    proto: Ipv4Proto,
    payload_len: u16,
    ttl: u8,
    identification: u16,
    flags: Ipv4Flags,
    frag_offset: u16,
) -> [u8; IPV4_HEADER_LEN] {
    let total_len = (IPV4_HEADER_LEN as u16) + payload_len;
    let mut hdr = [0u8; IPV4_HEADER_LEN];

    // Version (4) + IHL (5); no options on the send path.
    hdr[0] = 0x45;
    hdr[1] = 0;
    put_u16(&mut hdr, 2, total_len);
    put_u16(&mut hdr, 4, identification);
    put_u16(&mut hdr, 6, flags.bits() | (frag_offset & 0x1fff));
    hdr[8] = ttl;
    hdr[9] = proto.to_raw();
    // Checksum field stays zero while summing.
    hdr[12..16].copy_from_slice(&src.0);
    hdr[16..20].copy_from_slice(&dst.0);

    let checksum = internet_checksum(&hdr);
    put_u16(&mut hdr, 10, checksum);

    hdr
}

// ============================================================================
// Tests
// ============================================================================
