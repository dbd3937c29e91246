//! Ethernet framing: addresses, EtherType classification, frame
//! parse/build.
//!
//! # Frame layout
//!
//! ```text
//! +----------------+----------------+----------+------------------+
//! | dst MAC (6)    | src MAC (6)    | type (2) | payload          |
//! +----------------+----------------+----------+------------------+
//! ```

use alloc::vec::Vec;
use core::fmt;

use crate::codec::{get_u16, put_u16};

/// Ethernet header size (6 dst + 6 src + 2 ethertype).
pub const ETH_HEADER_LEN: usize = 14;

// ============================================================================
// EtherTypes
// ============================================================================

/// EtherType: IPv4
pub const ETHERTYPE_IPV4: u16 = 0x0800;

/// EtherType: ARP
pub const ETHERTYPE_ARP: u16 = 0x0806;

/// EtherType: Wake-on-LAN magic packet
pub const ETHERTYPE_WOL: u16 = 0x0842;

/// EtherType: Reverse ARP
pub const ETHERTYPE_RARP: u16 = 0x8035;

/// EtherType: IPv6
pub const ETHERTYPE_IPV6: u16 = 0x86DD;

/// Values below this are IEEE 802.3 length fields, not EtherTypes.
const ETHERTYPE_MIN: u16 = 0x0600;

/// Classified EtherType of a received frame.
///
/// The stack only processes [`EtherKind::Ipv4`] and [`EtherKind::Arp`];
/// the remaining variants are recognized so the receive loop can count
/// and drop them deliberately instead of lumping everything unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtherKind {
    /// IPv4 (0x0800)
    Ipv4,
    /// ARP (0x0806)
    Arp,
    /// Wake-on-LAN (0x0842)
    WakeOnLan,
    /// Reverse ARP (0x8035)
    Rarp,
    /// IPv6 (0x86DD)
    Ipv6,
    /// IEEE 802.3 length-form frame (< 0x0600); value is the length field
    Length(u16),
    /// Any other EtherType
    Unknown(u16),
}

impl EtherKind {
    /// Classify a raw EtherType field.
    pub fn classify(raw: u16) -> Self {
        match raw {
            ETHERTYPE_IPV4 => EtherKind::Ipv4,
            ETHERTYPE_ARP => EtherKind::Arp,
            ETHERTYPE_WOL => EtherKind::WakeOnLan,
            ETHERTYPE_RARP => EtherKind::Rarp,
            ETHERTYPE_IPV6 => EtherKind::Ipv6,
            v if v < ETHERTYPE_MIN => EtherKind::Length(v),
            v => EtherKind::Unknown(v),
        }
    }
}

// ============================================================================
// Ethernet Address
// ============================================================================

/// 6-byte Ethernet MAC address.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EthAddr(pub [u8; 6]);

impl EthAddr {
    /// Create from 6 octets.
    pub const fn new(a: u8, b: u8, c: u8, d: u8, e: u8, f: u8) -> Self {
        EthAddr([a, b, c, d, e, f])
    }

    /// All-zero address (unset / "unknown" in ARP requests).
    pub const ZERO: EthAddr = EthAddr([0; 6]);

    /// Broadcast address (ff:ff:ff:ff:ff:ff).
    pub const BROADCAST: EthAddr = EthAddr([0xff; 6]);

    /// Check for the broadcast address.
    #[inline]
    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xff; 6]
    }

    /// Check for a multicast address (low bit of the first octet).
    #[inline]
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Get the raw bytes.
    #[inline]
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl From<[u8; 6]> for EthAddr {
    fn from(bytes: [u8; 6]) -> Self {
        EthAddr(bytes)
    }
}

impl fmt::Debug for EthAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Display for EthAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================================================
// Ethernet Header
// ============================================================================

/// Parsed Ethernet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthHeader {
    /// Destination MAC address
    pub dst: EthAddr,
    /// Source MAC address
    pub src: EthAddr,
    /// Raw EtherType field
    pub ethertype: u16,
}

impl EthHeader {
    /// Classified EtherType.
    #[inline]
    pub fn kind(&self) -> EtherKind {
        EtherKind::classify(self.ethertype)
    }
}

/// Errors from Ethernet frame parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EthError {
    /// Frame is shorter than the 14-byte header
    Truncated,
}

// ============================================================================
// Parse / Build
// ============================================================================

/// Parse an Ethernet frame into its header and payload.
pub fn parse_ethernet(frame: &[u8]) -> Result<(EthHeader, &[u8]), EthError> {
    if frame.len() < ETH_HEADER_LEN {
        return Err(EthError::Truncated);
    }

    let mut dst = [0u8; 6];
    dst.copy_from_slice(&frame[0..6]);
    let mut src = [0u8; 6];
    src.copy_from_slice(&frame[6..12]);

    let hdr = EthHeader {
        dst: EthAddr(dst),
        src: EthAddr(src),
        ethertype: get_u16(frame, 12),
    };

    Ok((hdr, &frame[ETH_HEADER_LEN..]))
}

/// Build a complete Ethernet frame around `payload`.
pub fn build_ethernet_frame(dst: EthAddr, src: EthAddr, ethertype: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(ETH_HEADER_LEN + payload.len());
    frame.extend_from_slice(&dst.0);
    frame.extend_from_slice(&src.0);
    let mut ty = [0u8; 2];
    put_u16(&mut ty, 0, ethertype);
    frame.extend_from_slice(&ty);
    frame.extend_from_slice(payload);
    frame
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        let dst = EthAddr::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff);
        let src = EthAddr::new(0x00, 0x11, 0x22, 0x33, 0x44, 0x55);
        let frame = build_ethernet_frame(dst, src, ETHERTYPE_IPV4, b"payload");

        let (hdr, payload) = parse_ethernet(&frame).expect("should parse");
        assert_eq!(hdr.dst, dst);
        assert_eq!(hdr.src, src);
        assert_eq!(hdr.kind(), EtherKind::Ipv4);
        assert_eq!(payload, b"payload");
    }

    #[test]
    fn test_parse_truncated() {
        let frame = [0u8; 13];
        assert_eq!(parse_ethernet(&frame), Err(EthError::Truncated));
    }

    #[test]
    fn test_classify() {
        assert_eq!(EtherKind::classify(0x0800), EtherKind::Ipv4);
        assert_eq!(EtherKind::classify(0x0806), EtherKind::Arp);
        assert_eq!(EtherKind::classify(0x0842), EtherKind::WakeOnLan);
        assert_eq!(EtherKind::classify(0x8035), EtherKind::Rarp);
        assert_eq!(EtherKind::classify(0x86DD), EtherKind::Ipv6);
        assert_eq!(EtherKind::classify(0x0040), EtherKind::Length(0x0040));
        assert_eq!(EtherKind::classify(0x88CC), EtherKind::Unknown(0x88CC));
    }

    #[test]
    fn test_addr_predicates() {
        assert!(EthAddr::BROADCAST.is_broadcast());
        assert!(EthAddr::BROADCAST.is_multicast());
        assert!(EthAddr::new(0x01, 0x00, 0x5e, 0, 0, 1).is_multicast());
        assert!(!EthAddr::new(0x00, 0x11, 0x22, 0x33, 0x44, 0x55).is_multicast());
    }
}
