//! UDP: datagram parse/build, checksum, and the port-handler registry.
//!
//! The checksum covers the RFC 768 pseudo-header (source and destination
//! IP, protocol, UDP length), so verification needs the enclosing IPv4
//! addresses. A wire checksum of zero means the sender did not compute
//! one and verification is skipped.
//!
//! # References
//! - RFC 768: User Datagram Protocol

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use log::{debug, trace};

use crate::codec::{get_u16, pseudo_checksum, put_u16};
use crate::ipv4::Ipv4Addr;

/// UDP header size.
pub const UDP_HEADER_LEN: usize = 8;

/// Largest payload that fits a 16-bit UDP length field.
pub const UDP_MAX_PAYLOAD: usize = u16::MAX as usize - UDP_HEADER_LEN;

const PROTO_UDP: u8 = 17;

// ============================================================================
// UDP Header
// ============================================================================

/// Parsed UDP header.
#[derive(Debug, Clone, Copy)]
pub struct UdpHeader {
    /// Source port
    pub src_port: u16,
    /// Destination port
    pub dst_port: u16,
    /// Length of header + payload
    pub length: u16,
    /// Checksum as read from the wire (0 = not computed)
    pub checksum: u16,
}

// ============================================================================
// UDP Errors
// ============================================================================

/// Errors from UDP processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdpError {
    /// Datagram is shorter than its header or length field
    Truncated,
    /// Length field disagrees with the buffer
    LengthMismatch,
    /// Checksum verification failed
    ChecksumInvalid,
    /// Payload exceeds the 16-bit UDP length field
    PayloadTooLarge,
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse just the 8-byte UDP header.
pub fn parse_udp_header(data: &[u8]) -> Result<UdpHeader, UdpError> {
    if data.len() < UDP_HEADER_LEN {
        return Err(UdpError::Truncated);
    }
    Ok(UdpHeader {
        src_port: get_u16(data, 0),
        dst_port: get_u16(data, 2),
        length: get_u16(data, 4),
        checksum: get_u16(data, 6),
    })
}

/// Parse and validate a UDP datagram.
///
/// `src_ip`/`dst_ip` come from the enclosing IPv4 header and feed the
/// pseudo-header checksum. A zero wire checksum means the sender opted
/// out and the check is skipped; `verify_checksum == false` skips it
/// unconditionally.
pub fn parse_udp(
    data: &[u8],
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    verify_checksum: bool,
) -> Result<(UdpHeader, &[u8]), UdpError> {
    let hdr = parse_udp_header(data)?;

    let length = hdr.length as usize;
    if length < UDP_HEADER_LEN {
        return Err(UdpError::LengthMismatch);
    }
    if length > data.len() {
        return Err(UdpError::Truncated);
    }

    let segment = &data[..length];
    if verify_checksum && hdr.checksum != 0 {
        // A valid segment sums to zero with its checksum field included.
        if pseudo_checksum(src_ip.octets(), dst_ip.octets(), PROTO_UDP, segment) != 0 {
            return Err(UdpError::ChecksumInvalid);
        }
    }

    Ok((hdr, &segment[UDP_HEADER_LEN..]))
}

// ============================================================================
// Building
// ============================================================================

/// Build a UDP datagram (header + payload) with the checksum filled in.
///
/// A computed checksum of zero is transmitted as 0xFFFF, since zero on
/// the wire means "no checksum" (RFC 768).
pub fn build_udp_datagram(
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Result<Vec<u8>, UdpError> {
    if payload.len() > UDP_MAX_PAYLOAD {
        return Err(UdpError::PayloadTooLarge);
    }

    let length = (UDP_HEADER_LEN + payload.len()) as u16;
    let mut datagram = Vec::with_capacity(length as usize);
    datagram.resize(UDP_HEADER_LEN, 0);
    put_u16(&mut datagram, 0, src_port);
    put_u16(&mut datagram, 2, dst_port);
    put_u16(&mut datagram, 4, length);
    // Checksum field stays zero while summing.
    datagram.extend_from_slice(payload);

    let mut checksum = pseudo_checksum(src_ip.octets(), dst_ip.octets(), PROTO_UDP, &datagram);
    if checksum == 0 {
        checksum = 0xFFFF;
    }
    put_u16(&mut datagram, 6, checksum);

    Ok(datagram)
}

// ============================================================================
// Port Handlers
// ============================================================================

/// Receiver for datagrams on a registered port.
pub trait PortHandler {
    /// Called once per delivered datagram.
    fn handle(&mut self, src_ip: Ipv4Addr, src_port: u16, dst_port: u16, payload: &[u8]);
}

impl<F> PortHandler for F
where
    F: FnMut(Ipv4Addr, u16, u16, &[u8]),
{
    fn handle(&mut self, src_ip: Ipv4Addr, src_port: u16, dst_port: u16, payload: &[u8]) {
        self(src_ip, src_port, dst_port, payload)
    }
}

/// Result of dispatching a received datagram.
#[derive(Debug)]
pub enum UdpResult {
    /// Delivered to a registered handler
    Delivered,
    /// No handler registered for the destination port
    NoListener(Ipv4Addr, u16),
    /// Datagram failed validation
    Dropped(UdpError),
}

/// Destination-port → handler map.
///
/// One handler per port; registering again replaces the previous one.
pub struct PortRegistry {
    handlers: BTreeMap<u16, Box<dyn PortHandler>>,
}

impl PortRegistry {
    pub fn new() -> Self {
        PortRegistry {
            handlers: BTreeMap::new(),
        }
    }

    /// Register a handler for `port`, replacing any existing one.
    pub fn register(&mut self, port: u16, handler: Box<dyn PortHandler>) {
        debug!("udp: handler registered on port {}", port);
        self.handlers.insert(port, handler);
    }

    /// Remove the handler for `port`, if any.
    pub fn unregister(&mut self, port: u16) -> bool {
        self.handlers.remove(&port).is_some()
    }

    /// Check whether a port has a handler.
    pub fn is_registered(&self, port: u16) -> bool {
        self.handlers.contains_key(&port)
    }

    /// Validate a UDP datagram and hand its payload to the handler for
    /// the destination port.
    pub fn dispatch(
        &mut self,
        data: &[u8],
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
        verify_checksum: bool,
        stats: &UdpStats,
    ) -> UdpResult {
        stats.inc_rx_datagrams();

        let (hdr, payload) = match parse_udp(data, src_ip, dst_ip, verify_checksum) {
            Ok(v) => v,
            Err(e) => {
                stats.inc_rx_errors();
                return UdpResult::Dropped(e);
            }
        };

        match self.handlers.get_mut(&hdr.dst_port) {
            Some(handler) => {
                trace!(
                    "udp: {}:{} -> port {} ({} bytes)",
                    src_ip,
                    hdr.src_port,
                    hdr.dst_port,
                    payload.len()
                );
                handler.handle(src_ip, hdr.src_port, hdr.dst_port, payload);
                stats.inc_rx_delivered();
                UdpResult::Delivered
            }
            None => {
                stats.inc_rx_no_listener();
                UdpResult::NoListener(src_ip, hdr.dst_port)
            }
        }
    }
}

impl Default for PortRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// UDP Statistics
// ============================================================================

/// UDP protocol statistics.
#[derive(Debug, Default)]
pub struct UdpStats {
    /// Datagrams received
    pub rx_datagrams: AtomicU64,
    /// Datagrams delivered to a handler
    pub rx_delivered: AtomicU64,
    /// Datagrams for ports with no handler
    pub rx_no_listener: AtomicU64,
    /// Datagrams dropped by validation
    pub rx_errors: AtomicU64,
    /// Datagrams sent
    pub tx_datagrams: AtomicU64,
}

impl UdpStats {
    pub const fn new() -> Self {
        UdpStats {
            rx_datagrams: AtomicU64::new(0),
            rx_delivered: AtomicU64::new(0),
            rx_no_listener: AtomicU64::new(0),
            rx_errors: AtomicU64::new(0),
            tx_datagrams: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc_rx_datagrams(&self) {
        self.rx_datagrams.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_rx_delivered(&self) {
        self.rx_delivered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_rx_no_listener(&self) {
        self.rx_no_listener.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_rx_errors(&self) {
        self.rx_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_tx_datagrams(&self) {
        self.tx_datagrams.fetch_add(1, Ordering::Relaxed);
    }
}

// ============================================================================
// Tests
// ============================================================================
