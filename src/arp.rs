//! ARP (Address Resolution Protocol) over Ethernet/IPv4.
//!
//! # Packet format (RFC 826, Ethernet/IPv4 profile)
//!
//! ```text
//! +-------+-------+-------+-------+-------+-------+-------+-------+
//! |   Hardware Type (0x0001)      |   Protocol Type (0x0800)      |
//! +-------+-------+-------+-------+-------+-------+-------+-------+
//! | HLen=6| PLen=4|            Operation (1=Req, 2=Reply)         |
//! +-------+-------+-------+-------+-------+-------+-------+-------+
//! |                    Sender Hardware Address (6 bytes)          |
//! +-------+-------+-------+-------+-------+-------+-------+-------+
//! |                    Sender Protocol Address (4 bytes)          |
//! +-------+-------+-------+-------+-------+-------+-------+-------+
//! |                    Target Hardware Address (6 bytes)          |
//! +-------+-------+-------+-------+-------+-------+-------+-------+
//! |                    Target Protocol Address (4 bytes)          |
//! +-------+-------+-------+-------+-------+-------+-------+-------+
//! ```
//!
//! The table is sized for a device that talks to a handful of peers:
//! bounded (default 10 entries), linear scan, and a three-tier
//! replacement policy when full — free slot, then any entry past its
//! TTL, then the globally oldest.
//!
//! # References
//! - RFC 826: Ethernet Address Resolution Protocol

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use log::debug;

use crate::ethernet::{build_ethernet_frame, EthAddr, ETHERTYPE_ARP};
use crate::ipv4::Ipv4Addr;

// ============================================================================
// ARP Constants
// ============================================================================

/// Fixed prefix for the Ethernet/IPv4 profile: hardware type 1,
/// protocol type 0x0800, hardware length 6, protocol length 4.
const ARP_PREFIX: [u8; 6] = [0x00, 0x01, 0x08, 0x00, 0x06, 0x04];

/// ARP operation: Request
pub const OPCODE_REQUEST: u16 = 1;

/// ARP operation: Reply
pub const OPCODE_REPLY: u16 = 2;

/// ARP packet size for Ethernet/IPv4
pub const ARP_PACKET_LEN: usize = 28;

/// Default table capacity.
pub const DEFAULT_TABLE_MAX: usize = 10;

/// Default entry time-to-live (5 minutes).
pub const DEFAULT_TTL_MS: u64 = 300_000;

// ============================================================================
// ARP Operation Code
// ============================================================================

/// ARP operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOp {
    /// ARP Request (who-has)
    Request,
    /// ARP Reply (is-at)
    Reply,
}

impl ArpOp {
    /// Convert from raw opcode.
    pub fn from_raw(op: u16) -> Option<Self> {
        match op {
            OPCODE_REQUEST => Some(ArpOp::Request),
            OPCODE_REPLY => Some(ArpOp::Reply),
            _ => None,
        }
    }

    /// Convert to raw opcode.
    pub fn to_raw(self) -> u16 {
        match self {
            ArpOp::Request => OPCODE_REQUEST,
            ArpOp::Reply => OPCODE_REPLY,
        }
    }
}

// ============================================================================
// ARP Packet
// ============================================================================

/// Parsed ARP packet for Ethernet/IPv4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    /// Sender hardware (MAC) address
    pub sender_hw: EthAddr,
    /// Sender protocol (IP) address
    pub sender_ip: Ipv4Addr,
    /// Target hardware (MAC) address
    pub target_hw: EthAddr,
    /// Target protocol (IP) address
    pub target_ip: Ipv4Addr,
    /// ARP operation
    pub op: ArpOp,
}

// ============================================================================
// ARP Errors
// ============================================================================

/// Errors from ARP processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpError {
    /// Packet is shorter than 28 bytes
    Truncated,
    /// Fixed hardware/protocol-type prefix did not match
    BadHeader,
    /// Operation is neither request nor reply
    BadOpcode,
}

// ============================================================================
// ARP Table
// ============================================================================

/// An entry in the ARP table.
#[derive(Debug, Clone, Copy)]
pub struct ArpEntry {
    /// IP address
    pub ip: Ipv4Addr,
    /// MAC address
    pub mac: EthAddr,
    /// Timestamp of last lookup or insertion (milliseconds)
    pub last_seen: u64,
}

/// Bounded IP → MAC cache.
///
/// The table grows lazily up to `max_entries`, then recycles slots.
/// Entries are never individually removed; they age out by replacement.
pub struct ArpTable {
    entries: Vec<ArpEntry>,
    ttl_ms: u64,
    max_entries: usize,
}

impl ArpTable {
    /// Create a table with the given TTL and capacity.
    pub fn new(ttl_ms: u64, max_entries: usize) -> Self {
        ArpTable {
            entries: Vec::new(),
            ttl_ms,
            max_entries,
        }
    }

    /// Create a table with default settings (5 min TTL, 10 entries).
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_TTL_MS, DEFAULT_TABLE_MAX)
    }

    /// Look up the MAC for `ip`, refreshing the entry's timestamp on a
    /// hit so actively used mappings stay ahead of the eviction policy.
    pub fn lookup(&mut self, ip: Ipv4Addr, now_ms: u64) -> Option<EthAddr> {
        self.entries.iter_mut().find(|e| e.ip == ip).map(|e| {
            e.last_seen = now_ms;
            e.mac
        })
    }

    /// Check whether `ip` is present without touching timestamps.
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.entries.iter().any(|e| e.ip == ip)
    }

    /// Record a mapping if it is not already known.
    ///
    /// Existing entries are left untouched (their TTL accounting is the
    /// business of `lookup`). Returns `true` if a new entry was written.
    pub fn learn(&mut self, ip: Ipv4Addr, mac: EthAddr, now_ms: u64) -> bool {
        if ip.is_unspecified() || self.contains(ip) {
            return false;
        }

        let entry = ArpEntry {
            ip,
            mac,
            last_seen: now_ms,
        };

        // Tier 1: a free slot, while the table is still growing.
        if self.entries.len() < self.max_entries {
            self.entries.push(entry);
            return true;
        }

        // Tier 2: recycle any entry past its TTL.
        if let Some(slot) = self
            .entries
            .iter_mut()
            .find(|e| now_ms.saturating_sub(e.last_seen) > self.ttl_ms)
        {
            *slot = entry;
            return true;
        }

        // Tier 3: evict the globally oldest entry.
        if let Some(slot) = self.entries.iter_mut().min_by_key(|e| e.last_seen) {
            debug!("arp: table full, evicting {} for {}", slot.ip, ip);
            *slot = entry;
            return true;
        }

        // max_entries == 0; nothing can be stored.
        false
    }

    /// Number of entries currently in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured capacity bound.
    pub fn capacity(&self) -> usize {
        self.max_entries
    }
}

// ============================================================================
// ARP Statistics
// ============================================================================

/// ARP protocol statistics.
#[derive(Debug, Default)]
pub struct ArpStats {
    /// ARP packets received
    pub rx_packets: AtomicU64,
    /// ARP requests received
    pub rx_requests: AtomicU64,
    /// ARP replies received
    pub rx_replies: AtomicU64,
    /// ARP replies sent
    pub tx_replies: AtomicU64,
    /// ARP requests sent
    pub tx_requests: AtomicU64,
    /// Packets dropped due to parse errors
    pub rx_errors: AtomicU64,
    /// New table entries learned
    pub learned: AtomicU64,
}

impl ArpStats {
    pub const fn new() -> Self {
        ArpStats {
            rx_packets: AtomicU64::new(0),
            rx_requests: AtomicU64::new(0),
            rx_replies: AtomicU64::new(0),
            tx_replies: AtomicU64::new(0),
            tx_requests: AtomicU64::new(0),
            rx_errors: AtomicU64::new(0),
            learned: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc_rx_packets(&self) {
        self.rx_packets.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_rx_requests(&self) {
        self.rx_requests.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_rx_replies(&self) {
        self.rx_replies.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_tx_replies(&self) {
        self.tx_replies.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_tx_requests(&self) {
        self.tx_requests.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_rx_errors(&self) {
        self.rx_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_learned(&self) {
        self.learned.fetch_add(1, Ordering::Relaxed);
    }
}

// ============================================================================
// Parsing / Serialization
// ============================================================================

/// Parse an ARP packet from an Ethernet payload.
///
/// Only the Ethernet/IPv4 profile is accepted: the 6-byte type prefix
/// must match exactly and the operation must be request or reply.
pub fn parse_arp(buf: &[u8]) -> Result<ArpPacket, ArpError> {
    if buf.len() < ARP_PACKET_LEN {
        return Err(ArpError::Truncated);
    }

    if buf[0..6] != ARP_PREFIX {
        return Err(ArpError::BadHeader);
    }

    let opcode = u16::from_be_bytes([buf[6], buf[7]]);
    let op = ArpOp::from_raw(opcode).ok_or(ArpError::BadOpcode)?;

    let mut sender_hw = [0u8; 6];
    sender_hw.copy_from_slice(&buf[8..14]);
    let sender_ip = Ipv4Addr([buf[14], buf[15], buf[16], buf[17]]);

    let mut target_hw = [0u8; 6];
    target_hw.copy_from_slice(&buf[18..24]);
    let target_ip = Ipv4Addr([buf[24], buf[25], buf[26], buf[27]]);

    Ok(ArpPacket {
        sender_hw: EthAddr(sender_hw),
        sender_ip,
        target_hw: EthAddr(target_hw),
        target_ip,
        op,
    })
}

/// Serialize an ARP packet to its 28-byte wire form.
pub fn serialize_arp(pkt: &ArpPacket) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ARP_PACKET_LEN);
    buf.extend_from_slice(&ARP_PREFIX);
    buf.extend_from_slice(&pkt.op.to_raw().to_be_bytes());
    buf.extend_from_slice(&pkt.sender_hw.0);
    buf.extend_from_slice(&pkt.sender_ip.octets());
    buf.extend_from_slice(&pkt.target_hw.0);
    buf.extend_from_slice(&pkt.target_ip.octets());
    buf
}

/// Build a complete Ethernet frame carrying an ARP reply.
pub fn build_arp_reply(
    our_mac: EthAddr,
    our_ip: Ipv4Addr,
    target_mac: EthAddr,
    target_ip: Ipv4Addr,
) -> Vec<u8> {
    let pkt = ArpPacket {
        sender_hw: our_mac,
        sender_ip: our_ip,
        target_hw: target_mac,
        target_ip,
        op: ArpOp::Reply,
    };
    let payload = serialize_arp(&pkt);
    build_ethernet_frame(target_mac, our_mac, ETHERTYPE_ARP, &payload)
}

/// Build a broadcast Ethernet frame carrying an ARP request for
/// `target_ip`.
pub fn build_arp_request(our_mac: EthAddr, our_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Vec<u8> {
    let pkt = ArpPacket {
        sender_hw: our_mac,
        sender_ip: our_ip,
        target_hw: EthAddr::ZERO,
        target_ip,
        op: ArpOp::Request,
    };
    let payload = serialize_arp(&pkt);
    build_ethernet_frame(EthAddr::BROADCAST, our_mac, ETHERTYPE_ARP, &payload)
}

/// Build a gratuitous ARP announcement (sender IP == target IP),
/// broadcast after link-up so peers refresh their caches.
pub fn build_arp_announce(our_mac: EthAddr, our_ip: Ipv4Addr) -> Vec<u8> {
    let pkt = ArpPacket {
        sender_hw: our_mac,
        sender_ip: our_ip,
        target_hw: EthAddr::ZERO,
        target_ip: our_ip,
        op: ArpOp::Request,
    };
    let payload = serialize_arp(&pkt);
    build_ethernet_frame(EthAddr::BROADCAST, our_mac, ETHERTYPE_ARP, &payload)
}

// ============================================================================
// ARP Processing
// ============================================================================

/// Result of processing an ARP packet.
#[derive(Debug)]
pub enum ArpResult {
    /// Packet was handled, no response needed
    Handled,
    /// Packet requires a reply frame to be transmitted
    Reply(Vec<u8>),
    /// Packet was dropped with reason
    Dropped(ArpError),
}

/// Process an incoming ARP packet (Ethernet payload).
///
/// Requests record the sender's binding (if new) and, when the target
/// IP is ours, produce a reply frame with sender/target swapped and our
/// identity filled in. Replies carry two bindings — sender and target —
/// and both are recorded if absent.
pub fn process_arp(
    payload: &[u8],
    our_mac: EthAddr,
    our_ip: Ipv4Addr,
    table: &mut ArpTable,
    stats: &ArpStats,
    now_ms: u64,
) -> ArpResult {
    stats.inc_rx_packets();

    let pkt = match parse_arp(payload) {
        Ok(p) => p,
        Err(e) => {
            stats.inc_rx_errors();
            return ArpResult::Dropped(e);
        }
    };

    match pkt.op {
        ArpOp::Request => {
            stats.inc_rx_requests();

            if table.learn(pkt.sender_ip, pkt.sender_hw, now_ms) {
                stats.inc_learned();
            }

            if pkt.target_ip != our_ip {
                return ArpResult::Handled;
            }
            // A gratuitous announcement for our own IP is not a question.
            if pkt.sender_ip == pkt.target_ip {
                return ArpResult::Handled;
            }

            debug!("arp: who-has {} from {}", pkt.target_ip, pkt.sender_ip);
            stats.inc_tx_replies();
            ArpResult::Reply(build_arp_reply(
                our_mac,
                our_ip,
                pkt.sender_hw,
                pkt.sender_ip,
            ))
        }
        ArpOp::Reply => {
            stats.inc_rx_replies();

            if table.learn(pkt.sender_ip, pkt.sender_hw, now_ms) {
                stats.inc_learned();
            }
            // A reply names two stations; remember the target too.
            if pkt.target_hw != EthAddr::ZERO
                && table.learn(pkt.target_ip, pkt.target_hw, now_ms)
            {
                stats.inc_learned();
            }

            ArpResult::Handled
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(sender_ip: Ipv4Addr, sender_mac: EthAddr, target_ip: Ipv4Addr) -> Vec<u8> {
        serialize_arp(&ArpPacket {
            sender_hw: sender_mac,
            sender_ip,
            target_hw: EthAddr::ZERO,
            target_ip,
            op: ArpOp::Request,
        })
    }

    const OUR_MAC: EthAddr = EthAddr::new(0x02, 0x00, 0x00, 0x00, 0x00, 0x42);
    const OUR_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 42);

    #[test]
    fn test_parse_valid_request() {
        let data = make_request(
            Ipv4Addr::new(192, 168, 0, 103),
            EthAddr::new(0x00, 0x11, 0x22, 0x33, 0x44, 0x55),
            OUR_IP,
        );
        let pkt = parse_arp(&data).expect("should parse");
        assert_eq!(pkt.op, ArpOp::Request);
        assert_eq!(pkt.sender_ip, Ipv4Addr::new(192, 168, 0, 103));
        assert_eq!(pkt.target_ip, OUR_IP);
    }

    #[test]
    fn test_parse_truncated() {
        assert_eq!(parse_arp(&[0u8; 27]), Err(ArpError::Truncated));
    }

    #[test]
    fn test_parse_bad_prefix() {
        let mut data = make_request(
            Ipv4Addr::new(192, 168, 0, 103),
            EthAddr::new(0x00, 0x11, 0x22, 0x33, 0x44, 0x55),
            OUR_IP,
        );
        data[1] = 0x06; // hardware type no longer Ethernet
        assert_eq!(parse_arp(&data), Err(ArpError::BadHeader));
    }

    #[test]
    fn test_parse_bad_opcode() {
        let mut data = make_request(
            Ipv4Addr::new(192, 168, 0, 103),
            EthAddr::new(0x00, 0x11, 0x22, 0x33, 0x44, 0x55),
            OUR_IP,
        );
        data[7] = 9;
        assert_eq!(parse_arp(&data), Err(ArpError::BadOpcode));
    }

    #[test]
    fn test_request_for_us_produces_swapped_reply() {
        let peer_mac = EthAddr::new(0x00, 0x11, 0x22, 0x33, 0x44, 0x55);
        let peer_ip = Ipv4Addr::new(192, 168, 0, 103);
        let mut table = ArpTable::with_defaults();
        let stats = ArpStats::new();

        let data = make_request(peer_ip, peer_mac, OUR_IP);
        let result = process_arp(&data, OUR_MAC, OUR_IP, &mut table, &stats, 1000);

        let frame = match result {
            ArpResult::Reply(f) => f,
            other => panic!("expected reply, got {:?}", other),
        };
        // Frame is addressed back to the asker, from us.
        assert_eq!(&frame[0..6], &peer_mac.0);
        assert_eq!(&frame[6..12], &OUR_MAC.0);
        let reply = parse_arp(&frame[14..]).expect("reply should parse");
        assert_eq!(reply.op, ArpOp::Reply);
        assert_eq!(reply.sender_hw, OUR_MAC);
        assert_eq!(reply.sender_ip, OUR_IP);
        assert_eq!(reply.target_hw, peer_mac);
        assert_eq!(reply.target_ip, peer_ip);

        // The asker was learned as a side effect.
        assert_eq!(table.lookup(peer_ip, 1000), Some(peer_mac));
        assert_eq!(stats.tx_replies.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_request_for_other_ip_learns_but_stays_quiet() {
        let mut table = ArpTable::with_defaults();
        let stats = ArpStats::new();
        let peer_ip = Ipv4Addr::new(192, 168, 0, 103);
        let peer_mac = EthAddr::new(0x00, 0x11, 0x22, 0x33, 0x44, 0x55);

        let data = make_request(peer_ip, peer_mac, Ipv4Addr::new(192, 168, 0, 99));
        match process_arp(&data, OUR_MAC, OUR_IP, &mut table, &stats, 0) {
            ArpResult::Handled => {}
            other => panic!("expected handled, got {:?}", other),
        }
        assert!(table.contains(peer_ip));
    }

    #[test]
    fn test_reply_learns_both_bindings() {
        let mut table = ArpTable::with_defaults();
        let stats = ArpStats::new();
        let data = serialize_arp(&ArpPacket {
            sender_hw: EthAddr::new(0x00, 0x11, 0x22, 0x33, 0x44, 0x55),
            sender_ip: Ipv4Addr::new(192, 168, 0, 103),
            target_hw: OUR_MAC,
            target_ip: OUR_IP,
            op: ArpOp::Reply,
        });

        match process_arp(&data, OUR_MAC, OUR_IP, &mut table, &stats, 0) {
            ArpResult::Handled => {}
            other => panic!("expected handled, got {:?}", other),
        }
        assert!(table.contains(Ipv4Addr::new(192, 168, 0, 103)));
        assert!(table.contains(OUR_IP));
        assert_eq!(stats.learned.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_learn_does_not_overwrite() {
        let mut table = ArpTable::with_defaults();
        let ip = Ipv4Addr::new(192, 168, 0, 103);
        let mac1 = EthAddr::new(0x00, 0x11, 0x22, 0x33, 0x44, 0x55);
        let mac2 = EthAddr::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff);

        assert!(table.learn(ip, mac1, 1000));
        assert!(!table.learn(ip, mac2, 2000));
        assert_eq!(table.lookup(ip, 2000), Some(mac1));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_lookup_refreshes_timestamp() {
        let mut table = ArpTable::new(DEFAULT_TTL_MS, 2);
        let busy = Ipv4Addr::new(10, 0, 0, 1);
        let idle = Ipv4Addr::new(10, 0, 0, 2);
        let mac = EthAddr::new(0, 0, 0, 0, 0, 1);

        table.learn(busy, mac, 0);
        table.learn(idle, mac, 100);
        // Refreshing the first entry makes the second the oldest.
        assert!(table.lookup(busy, 5000).is_some());

        table.learn(Ipv4Addr::new(10, 0, 0, 3), mac, 6000);
        assert!(table.contains(busy));
        assert!(!table.contains(idle));
    }

    #[test]
    fn test_table_never_exceeds_capacity() {
        let mut table = ArpTable::new(DEFAULT_TTL_MS, 10);
        for i in 0..50u8 {
            table.learn(
                Ipv4Addr::new(10, 0, 0, i),
                EthAddr::new(0, 0, 0, 0, 0, i),
                i as u64,
            );
            assert!(table.len() <= 10);
        }
        assert_eq!(table.len(), 10);
    }

    #[test]
    fn test_stale_slot_recycled_before_oldest() {
        let mut table = ArpTable::new(1000, 2);
        let mac = EthAddr::new(0, 0, 0, 0, 0, 1);
        table.learn(Ipv4Addr::new(10, 0, 0, 1), mac, 0); // stale by t=5000
        table.learn(Ipv4Addr::new(10, 0, 0, 2), mac, 4500);

        table.learn(Ipv4Addr::new(10, 0, 0, 3), mac, 5000);
        assert!(!table.contains(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(table.contains(Ipv4Addr::new(10, 0, 0, 2)));
        assert!(table.contains(Ipv4Addr::new(10, 0, 0, 3)));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let pkt = ArpPacket {
            sender_hw: EthAddr::new(0x00, 0x11, 0x22, 0x33, 0x44, 0x55),
            sender_ip: Ipv4Addr::new(192, 168, 0, 103),
            target_hw: EthAddr::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff),
            target_ip: OUR_IP,
            op: ArpOp::Reply,
        };
        let data = serialize_arp(&pkt);
        assert_eq!(data.len(), ARP_PACKET_LEN);
        let parsed = parse_arp(&data).expect("should parse");
        assert_eq!(parsed.sender_hw, pkt.sender_hw);
        assert_eq!(parsed.sender_ip, pkt.sender_ip);
        assert_eq!(parsed.target_hw, pkt.target_hw);
        assert_eq!(parsed.target_ip, pkt.target_ip);
        assert_eq!(parsed.op, pkt.op);
    }
}
