//! ICMP message classification.
//!
//! This stack does not answer pings; it decodes incoming ICMP messages
//! to a human-readable description and logs them, which is what a
//! headless device actually needs from ICMP (visibility into
//! unreachable/TTL-exceeded chatter while debugging in the field).
//!
//! # References
//! - RFC 792: Internet Control Message Protocol
//! - IANA ICMP type/code registry

use log::debug;

use crate::ipv4::Ipv4Addr;

/// Minimum ICMP message size (type, code, checksum).
pub const ICMP_MIN_LEN: usize = 4;

// ============================================================================
// Types
// ============================================================================

/// Leading fields of an ICMP message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpHeader {
    /// Message type
    pub icmp_type: u8,
    /// Message code within the type
    pub code: u8,
}

/// Errors from ICMP parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpError {
    /// Message is shorter than the 4-byte minimum
    Truncated,
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse the leading type/code fields of an ICMP message.
///
/// The rest-of-header and body are returned unexamined; their layout
/// varies per type and this stack only classifies.
pub fn parse_icmp(buf: &[u8]) -> Result<(IcmpHeader, &[u8]), IcmpError> {
    if buf.len() < ICMP_MIN_LEN {
        return Err(IcmpError::Truncated);
    }
    let hdr = IcmpHeader {
        icmp_type: buf[0],
        code: buf[1],
    };
    Ok((hdr, &buf[ICMP_MIN_LEN..]))
}

// ============================================================================
// Classification
// ============================================================================

/// Describe an ICMP message by type and code.
pub fn describe_icmp(icmp_type: u8, code: u8) -> &'static str {
    match (icmp_type, code) {
        (0, _) => "Echo Reply",
        (3, 0) => "Destination network unreachable",
        (3, 1) => "Destination host unreachable",
        (3, 2) => "Destination protocol unreachable",
        (3, 3) => "Destination port unreachable",
        (3, 4) => "Fragmentation required, and DF flag set",
        (3, 5) => "Source route failed",
        (3, 6) => "Destination network unknown",
        (3, 7) => "Destination host unknown",
        (3, 8) => "Source host isolated",
        (3, 9) => "Network administratively prohibited",
        (3, 10) => "Host administratively prohibited",
        (3, 11) => "Network unreachable for ToS",
        (3, 12) => "Host unreachable for ToS",
        (3, 13) => "Communication administratively prohibited",
        (3, 14) => "Host Precedence Violation",
        (3, 15) => "Precedence cutoff in effect",
        (4, _) => "Source quench",
        (5, 0) => "Redirect Datagram for the Network",
        (5, 1) => "Redirect Datagram for the Host",
        (5, 2) => "Redirect Datagram for the ToS & network",
        (5, 3) => "Redirect Datagram for the ToS & host",
        (6, _) => "Alternate Host Address",
        (8, _) => "Echo Request",
        (9, _) => "Router Advertisement",
        (10, _) => "Router discovery/selection/solicitation",
        (11, 0) => "TTL expired in transit",
        (11, 1) => "Fragment reassembly time exceeded",
        (12, 0) => "Pointer indicates the error",
        (12, 1) => "Missing a required option",
        (12, 2) => "Bad length",
        (13, _) => "Timestamp",
        (14, _) => "Timestamp reply",
        (15, _) => "Information request",
        (16, _) => "Information reply",
        (17, _) => "Address Mask Request",
        (18, _) => "Address Mask Reply",
        (30, _) => "Traceroute Information Request",
        (31, _) => "Datagram Conversion Error",
        (32, _) => "mobile Host Redirect",
        (33, _) => "Where-Are-You",
        (34, _) => "Here-I-Am",
        (35, _) => "Mobile Registration Request",
        (36, _) => "Mobile Registration Reply",
        (37, _) => "Domain Name Request",
        (38, _) => "Domain Name Reply",
        (39, _) => "SKIP Algorithm Discovery Protocol",
        (40, _) => "Photuris, Security failures",
        (41, _) => "ICMP for experimental mobility protocols",
        _ => "Unknown ICMP Message",
    }
}

/// Process an incoming ICMP payload: classify and log.
///
/// Returns the classification, or a parse error if the message is too
/// short to carry type and code.
pub fn process_icmp(payload: &[u8], src: Ipv4Addr) -> Result<&'static str, IcmpError> {
    let (hdr, _) = parse_icmp(payload)?;
    let description = describe_icmp(hdr.icmp_type, hdr.code);
    debug!(
        "icmp: {} (type {} code {}) from {}",
        description, hdr.icmp_type, hdr.code, src
    );
    Ok(description)
}

// ============================================================================
// Tests
// ============================================================================
