//! Embedded network stack: Ethernet, ARP, IPv4 (with fragmentation),
//! ICMP and UDP over a byte-oriented link driver.
//!
//! The crate targets resource-constrained devices (an SPI-attached
//! Ethernet controller and a few kilobytes of RAM) but is written
//! host-testable: all state lives in a [`NetStack`] context object, time
//! is injected as a millisecond argument, and the link hardware is
//! abstracted behind the [`LinkDriver`] trait.
//!
//! # Architecture
//!
//! ```text
//!                  +------------------+
//!                  |   LinkDriver     |
//!                  | (ENC28J60, mock) |
//!                  +--------+---------+
//!                           |
//!                  +--------v---------+
//!                  |    Ethernet      |
//!                  |  (parse/build)   |
//!                  +--------+---------+
//!                           |
//!           +---------------+---------------+
//!           |                               |
//!  +--------v---------+           +---------v--------+
//!  |      IPv4        |           |       ARP        |
//!  | (reassemble/send)|           |  (table/reply)   |
//!  +--------+---------+           +------------------+
//!           |
//!  +--------v---------+
//!  |   ICMP  /  UDP   |
//!  | (classify/demux) |
//!  +------------------+
//! ```
//!
//! # Execution model
//!
//! Single-threaded and cooperative: the application calls
//! [`NetStack::poll`] when the driver signals received frames and
//! [`NetStack::on_tick`] periodically for cache maintenance. Handlers
//! must run to completion quickly; nothing in the stack blocks.

#![no_std]

extern crate alloc;

pub mod arp;
pub mod codec;
pub mod driver;
pub mod ethernet;
#[cfg(feature = "fragmentation")]
pub mod fragment;
#[cfg(feature = "icmp")]
pub mod icmp;
pub mod ipv4;
pub mod stack;
#[cfg(feature = "udp")]
pub mod udp;

pub use arp::{
    build_arp_announce, build_arp_reply, build_arp_request, parse_arp, process_arp, serialize_arp,
    ArpEntry, ArpError, ArpOp, ArpPacket, ArpResult, ArpStats, ArpTable,
};
pub use codec::{get_u16, internet_checksum, pseudo_checksum, put_u16};
pub use driver::{DriverError, LinkDriver};
pub use ethernet::{
    build_ethernet_frame, parse_ethernet, EthAddr, EthError, EthHeader, EtherKind, ETHERTYPE_ARP,
    ETHERTYPE_IPV4, ETHERTYPE_IPV6, ETHERTYPE_RARP, ETHERTYPE_WOL, ETH_HEADER_LEN,
};
#[cfg(feature = "fragmentation")]
pub use fragment::{FragmentError, FragmentKey, ReassemblyTable, REASSEMBLY_TIMEOUT_MS};
#[cfg(feature = "icmp")]
pub use icmp::{describe_icmp, parse_icmp, process_icmp, IcmpError, IcmpHeader};
pub use ipv4::{
    build_ipv4_header, parse_ipv4, Ipv4Addr, Ipv4Error, Ipv4Flags, Ipv4Header, Ipv4Proto,
    IPV4_HEADER_LEN,
};
pub use stack::{NetStack, NetStats, PollOutcome, SendStatus, StackConfig};
#[cfg(feature = "udp")]
pub use udp::{
    build_udp_datagram, parse_udp, parse_udp_header, PortHandler, PortRegistry, UdpError,
    UdpHeader, UdpResult, UdpStats, UDP_HEADER_LEN,
};

// ============================================================================
// Stack-wide Constants
// ============================================================================

/// Default Maximum Transmission Unit for Ethernet payloads.
pub const DEFAULT_MTU: usize = 1500;

/// Upper sanity bound on a frame length reported by the driver.
///
/// A frame of zero bytes or more than this is not network weather, it is
/// a driver that can no longer be trusted (see
/// [`PollOutcome::FatalDriverFault`]).
pub const MAX_FRAME_LEN: usize = 1600;

/// Outbound IPv4 payloads larger than this are split into fragments.
///
/// 1280 leaves margin below common MTUs and keeps the per-fragment
/// offset (in 8-byte units) a round 160.
pub const FRAGMENT_THRESHOLD: usize = 1280;
