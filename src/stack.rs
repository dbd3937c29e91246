//! The stack controller: receive loop, protocol demux, send path.
//!
//! [`NetStack`] owns every piece of mutable state (ARP table, fragment
//! reassembly, pending transmissions, statistics) and a [`LinkDriver`].
//! The application drives it from two entry points:
//!
//! - [`NetStack::poll`] whenever received frames may be waiting,
//! - [`NetStack::on_tick`] periodically (once a second is plenty) for
//!   cache expiry and retry of transmissions parked on ARP resolution.
//!
//! Time never comes from a clock inside the stack; every entry point
//! takes `now_ms`, so tests and schedulers stay in control.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use log::{debug, error, trace, warn};

use crate::arp::{
    build_arp_announce, build_arp_request, process_arp, ArpResult, ArpStats, ArpTable,
};
use crate::driver::{DriverError, LinkDriver};
use crate::ethernet::{build_ethernet_frame, parse_ethernet, EthAddr, EtherKind, ETHERTYPE_IPV4};
#[cfg(feature = "fragmentation")]
use crate::fragment::ReassemblyTable;
#[cfg(feature = "icmp")]
use crate::icmp::process_icmp;
use crate::ipv4::{build_ipv4_header, parse_ipv4, Ipv4Addr, Ipv4Flags, Ipv4Header, Ipv4Proto};
#[cfg(feature = "udp")]
use crate::udp::{build_udp_datagram, PortHandler, PortRegistry, UdpResult, UdpStats};
use crate::{FRAGMENT_THRESHOLD, MAX_FRAME_LEN};

// ============================================================================
// Configuration
// ============================================================================

/// Static configuration of a stack instance.
#[derive(Debug, Clone, Copy)]
pub struct StackConfig {
    /// Our MAC address
    pub mac: EthAddr,
    /// Our IPv4 address
    pub ip: Ipv4Addr,
    /// ARP table capacity
    pub arp_max_entries: usize,
    /// ARP entry time-to-live in milliseconds
    pub arp_ttl_ms: u64,
    /// TTL written into outgoing IPv4 headers
    pub ip_ttl: u8,
    /// Verify IPv4 and UDP checksums on receive
    pub verify_checksums: bool,
}

impl Default for StackConfig {
    fn default() -> Self {
        StackConfig {
            mac: EthAddr::ZERO,
            ip: Ipv4Addr::UNSPECIFIED,
            arp_max_entries: crate::arp::DEFAULT_TABLE_MAX,
            arp_ttl_ms: crate::arp::DEFAULT_TTL_MS,
            ip_ttl: 64,
            verify_checksums: true,
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Stack-wide statistics.
#[derive(Debug, Default)]
pub struct NetStats {
    /// Frames received
    pub rx_frames: AtomicU64,
    /// Frames/packets dropped by parsing or validation
    pub rx_errors: AtomicU64,
    /// IPv4 packets accepted for us
    pub ipv4_rx: AtomicU64,
    /// ICMP messages classified
    pub icmp_rx: AtomicU64,
    /// Frames dropped for an EtherType we do not process
    pub unsupported_ethertype: AtomicU64,
    /// IPv4 packets dropped for a protocol we do not process
    pub unsupported_proto: AtomicU64,
    /// Fragments received
    pub fragments_rx: AtomicU64,
    /// Datagrams completed by reassembly
    pub fragments_reassembled: AtomicU64,
    /// Reassemblies dropped (orphans, oversize, timeout)
    pub fragments_dropped: AtomicU64,
    /// Frames transmitted
    pub tx_frames: AtomicU64,
    /// Transmissions parked while ARP resolves
    pub tx_deferred: AtomicU64,
    /// ARP statistics
    pub arp: ArpStats,
    /// UDP statistics
    #[cfg(feature = "udp")]
    pub udp: UdpStats,
}

impl NetStats {
    #[inline]
    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ============================================================================
// Results
// ============================================================================

/// Outcome of a [`NetStack::poll`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No frames were waiting
    Idle,
    /// This many frames were processed
    Processed(usize),
    /// The driver reported an impossible frame (empty or oversized);
    /// it has been reset and needs re-initialization
    FatalDriverFault,
}

/// Outcome of a transmit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Frame(s) handed to the driver
    Sent,
    /// Parked until ARP resolves the destination; an ARP request went out
    ArpPending,
    /// Physical link is down
    LinkDown,
    /// Driver rejected the frame
    PhyError,
    /// Payload cannot fit even when fragmented
    TooLarge,
}

/// An IPv4 transmission waiting for ARP resolution.
struct PendingPacket {
    dst: Ipv4Addr,
    proto: Ipv4Proto,
    payload: Vec<u8>,
}

// ============================================================================
// NetStack
// ============================================================================

/// The network stack context: driver, caches, queues and counters.
pub struct NetStack<D: LinkDriver> {
    driver: D,
    config: StackConfig,
    arp: ArpTable,
    #[cfg(feature = "fragmentation")]
    reassembly: ReassemblyTable,
    #[cfg(feature = "udp")]
    udp_ports: PortRegistry,
    pending: VecDeque<PendingPacket>,
    next_ident: u16,
    stats: NetStats,
}

impl<D: LinkDriver> NetStack<D> {
    /// Create a stack around a driver. Call [`NetStack::init`] before
    /// polling.
    pub fn new(driver: D, config: StackConfig) -> Self {
        NetStack {
            driver,
            arp: ArpTable::new(config.arp_ttl_ms, config.arp_max_entries),
            #[cfg(feature = "fragmentation")]
            reassembly: ReassemblyTable::new(),
            #[cfg(feature = "udp")]
            udp_ports: PortRegistry::new(),
            pending: VecDeque::new(),
            next_ident: 0,
            stats: NetStats::default(),
            config,
        }
    }

    /// Bring up the driver and, if the link is already up, announce our
    /// address with a gratuitous ARP.
    pub fn init(&mut self) -> Result<(), DriverError> {
        self.driver.initialize(self.config.mac)?;
        if self.driver.link_is_up() {
            let announce = build_arp_announce(self.config.mac, self.config.ip);
            if self.driver.send_frame(&announce).is_ok() {
                NetStats::inc(&self.stats.tx_frames);
                self.stats.arp.inc_tx_requests();
            }
        }
        Ok(())
    }

    /// Drain and process every frame the driver has queued.
    pub fn poll(&mut self, now_ms: u64) -> PollOutcome {
        if !self.driver.link_is_up() {
            return PollOutcome::Idle;
        }

        let mut processed = 0;
        while self.driver.frames_available() > 0 {
            let frame = match self.driver.next_frame() {
                Some(f) => f,
                None => break,
            };

            if frame.is_empty() || frame.len() > MAX_FRAME_LEN {
                error!(
                    "driver returned impossible frame length {}, resetting",
                    frame.len()
                );
                self.driver.reset();
                return PollOutcome::FatalDriverFault;
            }

            self.handle_frame(&frame, now_ms);
            processed += 1;
        }

        if processed > 0 {
            PollOutcome::Processed(processed)
        } else {
            PollOutcome::Idle
        }
    }

    /// Periodic maintenance: expire stale reassemblies and retry
    /// transmissions parked on ARP. Returns the number of reassemblies
    /// expired.
    pub fn on_tick(&mut self, now_ms: u64) -> usize {
        #[cfg(feature = "fragmentation")]
        let expired = {
            let n = self.reassembly.cleanup_expired(now_ms);
            for _ in 0..n {
                NetStats::inc(&self.stats.fragments_dropped);
            }
            n
        };
        #[cfg(not(feature = "fragmentation"))]
        let expired = 0;

        self.flush_pending(now_ms);
        expired
    }

    /// Resolve `ip` to a MAC address from the ARP table, sending one
    /// request on a miss. Callers retry on a later tick.
    pub fn resolve(&mut self, ip: Ipv4Addr, now_ms: u64) -> Option<EthAddr> {
        if let Some(mac) = self.arp.lookup(ip, now_ms) {
            return Some(mac);
        }
        let request = build_arp_request(self.config.mac, self.config.ip, ip);
        if self.driver.send_frame(&request).is_ok() {
            NetStats::inc(&self.stats.tx_frames);
            self.stats.arp.inc_tx_requests();
        }
        None
    }

    /// Register a handler for UDP datagrams addressed to `port`.
    #[cfg(feature = "udp")]
    pub fn register_udp_handler(&mut self, port: u16, handler: alloc::boxed::Box<dyn PortHandler>) {
        self.udp_ports.register(port, handler);
    }

    /// Send a UDP datagram.
    #[cfg(feature = "udp")]
    pub fn send_udp(
        &mut self,
        dst: Ipv4Addr,
        dst_port: u16,
        src_port: u16,
        payload: &[u8],
        now_ms: u64,
    ) -> SendStatus {
        let datagram = match build_udp_datagram(self.config.ip, dst, src_port, dst_port, payload) {
            Ok(d) => d,
            Err(_) => return SendStatus::TooLarge,
        };
        let status = self.send_ipv4(dst, Ipv4Proto::Udp, &datagram, now_ms);
        if matches!(status, SendStatus::Sent | SendStatus::ArpPending) {
            self.stats.udp.inc_tx_datagrams();
        }
        status
    }

    /// Send an IPv4 packet, fragmenting when the payload exceeds
    /// [`FRAGMENT_THRESHOLD`]. A destination with no ARP entry parks the
    /// packet and returns [`SendStatus::ArpPending`]; it goes out when
    /// the reply arrives (or on a later tick).
    pub fn send_ipv4(
        &mut self,
        dst: Ipv4Addr,
        proto: Ipv4Proto,
        payload: &[u8],
        now_ms: u64,
    ) -> SendStatus {
        if !self.driver.link_is_up() {
            return SendStatus::LinkDown;
        }
        if payload.len() + crate::IPV4_HEADER_LEN > u16::MAX as usize {
            return SendStatus::TooLarge;
        }
        #[cfg(not(feature = "fragmentation"))]
        if payload.len() > FRAGMENT_THRESHOLD {
            return SendStatus::TooLarge;
        }

        if dst.is_broadcast() {
            return self.transmit(EthAddr::BROADCAST, dst, proto, payload);
        }

        match self.resolve(dst, now_ms) {
            Some(mac) => self.transmit(mac, dst, proto, payload),
            None => {
                debug!("ipv4: parking {} bytes for {} until ARP resolves", payload.len(), dst);
                self.pending.push_back(PendingPacket {
                    dst,
                    proto,
                    payload: payload.to_vec(),
                });
                NetStats::inc(&self.stats.tx_deferred);
                SendStatus::ArpPending
            }
        }
    }

    /// Stack statistics.
    pub fn stats(&self) -> &NetStats {
        &self.stats
    }

    /// Stack configuration.
    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Borrow the driver (for tests and driver-specific control).
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    // ------------------------------------------------------------------------
    // Receive path
    // ------------------------------------------------------------------------

    fn handle_frame(&mut self, frame: &[u8], now_ms: u64) {
        NetStats::inc(&self.stats.rx_frames);

        let (eth, payload) = match parse_ethernet(frame) {
            Ok(v) => v,
            Err(_) => {
                NetStats::inc(&self.stats.rx_errors);
                return;
            }
        };

        // Promiscuous traffic is not ours to parse.
        if eth.dst != self.config.mac && !eth.dst.is_broadcast() {
            return;
        }

        match eth.kind() {
            EtherKind::Ipv4 => self.handle_ipv4(payload, now_ms),
            EtherKind::Arp => {
                match process_arp(
                    payload,
                    self.config.mac,
                    self.config.ip,
                    &mut self.arp,
                    &self.stats.arp,
                    now_ms,
                ) {
                    ArpResult::Reply(reply) => {
                        // One retransmission attempt; beyond that the
                        // peer will simply ask again.
                        let sent = self.driver.send_frame(&reply).is_ok()
                            || self.driver.send_frame(&reply).is_ok();
                        if sent {
                            NetStats::inc(&self.stats.tx_frames);
                        }
                    }
                    ArpResult::Handled => {}
                    ArpResult::Dropped(e) => {
                        trace!("arp: dropped packet: {:?}", e);
                        NetStats::inc(&self.stats.rx_errors);
                    }
                }
                // A new binding may unblock parked transmissions.
                self.flush_pending(now_ms);
            }
            other => {
                trace!("eth: ignoring {:?} frame", other);
                NetStats::inc(&self.stats.unsupported_ethertype);
            }
        }
    }

    fn handle_ipv4(&mut self, packet: &[u8], now_ms: u64) {
        let (hdr, _options, payload) = match parse_ipv4(packet, self.config.verify_checksums) {
            Ok(v) => v,
            Err(e) => {
                trace!("ipv4: dropped packet: {:?}", e);
                NetStats::inc(&self.stats.rx_errors);
                return;
            }
        };

        if hdr.dst != self.config.ip && !hdr.dst.is_broadcast() {
            return;
        }
        NetStats::inc(&self.stats.ipv4_rx);

        if hdr.is_fragment() {
            #[cfg(feature = "fragmentation")]
            {
                NetStats::inc(&self.stats.fragments_rx);
                match self.reassembly.process(&hdr, payload, now_ms) {
                    Ok(Some((assembled, data))) => {
                        NetStats::inc(&self.stats.fragments_reassembled);
                        self.demux_ipv4(&assembled, &data);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        trace!("frag: dropped fragment: {:?}", e);
                        NetStats::inc(&self.stats.fragments_dropped);
                    }
                }
            }
            #[cfg(not(feature = "fragmentation"))]
            {
                NetStats::inc(&self.stats.rx_errors);
            }
            return;
        }

        #[cfg(not(feature = "fragmentation"))]
        let _ = now_ms;
        self.demux_ipv4(&hdr, payload);
    }

    fn demux_ipv4(&mut self, hdr: &Ipv4Header, payload: &[u8]) {
        match hdr.proto() {
            #[cfg(feature = "icmp")]
            Some(Ipv4Proto::Icmp) => {
                NetStats::inc(&self.stats.icmp_rx);
                if process_icmp(payload, hdr.src).is_err() {
                    NetStats::inc(&self.stats.rx_errors);
                }
            }
            #[cfg(feature = "udp")]
            Some(Ipv4Proto::Udp) => {
                match self.udp_ports.dispatch(
                    payload,
                    hdr.src,
                    hdr.dst,
                    self.config.verify_checksums,
                    &self.stats.udp,
                ) {
                    UdpResult::NoListener(src, port) => {
                        trace!("udp: no listener on port {} (from {})", port, src);
                    }
                    UdpResult::Dropped(e) => {
                        trace!("udp: dropped datagram: {:?}", e);
                    }
                    UdpResult::Delivered => {}
                }
            }
            _ => {
                trace!("ipv4: unsupported protocol {}", hdr.protocol);
                NetStats::inc(&self.stats.unsupported_proto);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Send path
    // ------------------------------------------------------------------------

    fn transmit(
        &mut self,
        dst_mac: EthAddr,
        dst_ip: Ipv4Addr,
        proto: Ipv4Proto,
        payload: &[u8],
    ) -> SendStatus {
        let ident = self.next_ident;
        self.next_ident = self.next_ident.wrapping_add(1);

        #[cfg(feature = "fragmentation")]
        if payload.len() > FRAGMENT_THRESHOLD {
            let mut offset = 0usize;
            while offset < payload.len() {
                let end = core::cmp::min(offset + FRAGMENT_THRESHOLD, payload.len());
                let last = end == payload.len();
                let flags = if last {
                    Ipv4Flags::empty()
                } else {
                    Ipv4Flags::MORE_FRAGMENTS
                };
                let status = self.transmit_one(
                    dst_mac,
                    dst_ip,
                    proto,
                    &payload[offset..end],
                    ident,
                    flags,
                    (offset / 8) as u16,
                );
                if status != SendStatus::Sent {
                    return status;
                }
                offset = end;
            }
            return SendStatus::Sent;
        }

        self.transmit_one(dst_mac, dst_ip, proto, payload, ident, Ipv4Flags::empty(), 0)
    }

    #[allow(clippy::too_many_arguments)]
    fn transmit_one(
        &mut self,
        dst_mac: EthAddr,
        dst_ip: Ipv4Addr,
        proto: Ipv4Proto,
        payload: &[u8],
        ident: u16,
        flags: Ipv4Flags,
        frag_offset: u16,
    ) -> SendStatus {
        let hdr = build_ipv4_header(
            self.config.ip,
            dst_ip,
            proto,
            payload.len() as u16,
            self.config.ip_ttl,
            ident,
            flags,
            frag_offset,
        );

        let mut packet = Vec::with_capacity(hdr.len() + payload.len());
        packet.extend_from_slice(&hdr);
        packet.extend_from_slice(payload);

        let frame =
            build_ethernet_frame(dst_mac, self.config.mac, ETHERTYPE_IPV4, &packet);
        match self.driver.send_frame(&frame) {
            Ok(()) => {
                NetStats::inc(&self.stats.tx_frames);
                SendStatus::Sent
            }
            Err(e) => {
                warn!("driver refused frame ({:?})", e);
                SendStatus::PhyError
            }
        }
    }

    /// Retry every parked transmission whose destination now resolves.
    fn flush_pending(&mut self, now_ms: u64) {
        if self.pending.is_empty() {
            return;
        }

        let parked = core::mem::take(&mut self.pending);
        for pkt in parked {
            match self.arp.lookup(pkt.dst, now_ms) {
                Some(mac) => {
                    trace!("ipv4: releasing parked packet for {}", pkt.dst);
                    self.transmit(mac, pkt.dst, pkt.proto, &pkt.payload);
                }
                None => self.pending.push_back(pkt),
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arp::{build_arp_reply, parse_arp, ArpOp};
    use crate::ethernet::{EthHeader, ETHERTYPE_ARP};
    use alloc::boxed::Box;
    use alloc::rc::Rc;
    use alloc::vec;
    use core::cell::RefCell;

    const OUR_MAC: EthAddr = EthAddr::new(0x02, 0x00, 0x00, 0x00, 0x00, 0x42);
    const OUR_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 42);
    const PEER_MAC: EthAddr = EthAddr::new(0x00, 0x11, 0x22, 0x33, 0x44, 0x55);
    const PEER_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 103);

    #[derive(Default)]
    struct MockDriver {
        link_up: bool,
        rx: VecDeque<Vec<u8>>,
        tx: Vec<Vec<u8>>,
        fail_sends: usize,
    }

    impl LinkDriver for MockDriver {
        fn initialize(&mut self, _mac: EthAddr) -> Result<(), DriverError> {
            Ok(())
        }
        fn reset(&mut self) {
            self.rx.clear();
        }
        fn link_is_up(&mut self) -> bool {
            self.link_up
        }
        fn send_frame(&mut self, frame: &[u8]) -> Result<(), DriverError> {
            if self.fail_sends > 0 {
                self.fail_sends -= 1;
                return Err(DriverError::PhyError);
            }
            self.tx.push(frame.to_vec());
            Ok(())
        }
        fn frames_available(&mut self) -> usize {
            self.rx.len()
        }
        fn next_frame(&mut self) -> Option<Vec<u8>> {
            self.rx.pop_front()
        }
    }

    fn make_stack() -> NetStack<MockDriver> {
        let driver = MockDriver {
            link_up: true,
            ..MockDriver::default()
        };
        NetStack::new(
            driver,
            StackConfig {
                mac: OUR_MAC,
                ip: OUR_IP,
                ..StackConfig::default()
            },
        )
    }

    fn arp_request_frame(sender_mac: EthAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Vec<u8> {
        let pkt = crate::arp::ArpPacket {
            sender_hw: sender_mac,
            sender_ip,
            target_hw: EthAddr::ZERO,
            target_ip,
            op: ArpOp::Request,
        };
        build_ethernet_frame(
            EthAddr::BROADCAST,
            sender_mac,
            ETHERTYPE_ARP,
            &crate::arp::serialize_arp(&pkt),
        )
    }

    fn ipv4_frame(proto: Ipv4Proto, payload: &[u8], flags: Ipv4Flags, offset: u16, id: u16) -> Vec<u8> {
        let hdr = build_ipv4_header(
            PEER_IP,
            OUR_IP,
            proto,
            payload.len() as u16,
            64,
            id,
            flags,
            offset,
        );
        let mut packet = hdr.to_vec();
        packet.extend_from_slice(payload);
        build_ethernet_frame(OUR_MAC, PEER_MAC, ETHERTYPE_IPV4, &packet)
    }

    fn sent_ipv4(frame: &[u8]) -> (EthHeader, Ipv4Header, Vec<u8>) {
        let (eth, packet) = parse_ethernet(frame).expect("ethernet");
        let (hdr, _, payload) = parse_ipv4(packet, true).expect("ipv4");
        (eth, hdr, payload.to_vec())
    }

    #[test]
    fn test_arp_request_gets_one_swapped_reply() {
        let mut stack = make_stack();
        stack
            .driver_mut()
            .rx
            .push_back(arp_request_frame(PEER_MAC, PEER_IP, OUR_IP));

        assert_eq!(stack.poll(1000), PollOutcome::Processed(1));
        assert_eq!(stack.driver_mut().tx.len(), 1);

        let frame = stack.driver_mut().tx.remove(0);
        let (eth, payload) = parse_ethernet(&frame).expect("ethernet");
        assert_eq!(eth.dst, PEER_MAC);
        assert_eq!(eth.src, OUR_MAC);
        let reply = parse_arp(payload).expect("arp");
        assert_eq!(reply.op, ArpOp::Reply);
        assert_eq!(reply.sender_ip, OUR_IP);
        assert_eq!(reply.target_ip, PEER_IP);

        // The asker was learned; resolving it sends no request.
        assert_eq!(stack.resolve(PEER_IP, 1000), Some(PEER_MAC));
        assert!(stack.driver_mut().tx.is_empty());
    }

    #[test]
    fn test_arp_reply_retransmitted_once_on_failure() {
        let mut stack = make_stack();
        stack.driver_mut().fail_sends = 1;
        stack
            .driver_mut()
            .rx
            .push_back(arp_request_frame(PEER_MAC, PEER_IP, OUR_IP));

        stack.poll(0);
        // First attempt failed, the retry landed.
        assert_eq!(stack.driver_mut().tx.len(), 1);
    }

    #[test]
    fn test_send_parks_until_arp_resolves() {
        let mut stack = make_stack();
        assert_eq!(
            stack.send_ipv4(PEER_IP, Ipv4Proto::Udp, b"parked", 0),
            SendStatus::ArpPending
        );
        // Only the ARP request went out so far.
        assert_eq!(stack.driver_mut().tx.len(), 1);
        let request = parse_arp(&stack.driver_mut().tx[0][14..]).expect("arp");
        assert_eq!(request.op, ArpOp::Request);
        assert_eq!(request.target_ip, PEER_IP);

        // The peer answers; the parked packet is released by the poll.
        let reply = build_arp_reply(PEER_MAC, PEER_IP, OUR_MAC, OUR_IP);
        stack.driver_mut().rx.push_back(reply);
        stack.poll(100);

        assert_eq!(stack.driver_mut().tx.len(), 2);
        let frame = stack.driver_mut().tx[1].clone();
        let (eth, hdr, payload) = sent_ipv4(&frame);
        assert_eq!(eth.dst, PEER_MAC);
        assert_eq!(hdr.dst, PEER_IP);
        assert_eq!(payload, b"parked");
        assert_eq!(stack.stats().tx_deferred.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_broadcast_send_needs_no_arp() {
        let mut stack = make_stack();
        assert_eq!(
            stack.send_ipv4(Ipv4Addr::BROADCAST, Ipv4Proto::Udp, b"hi", 0),
            SendStatus::Sent
        );
        let (eth, hdr, _) = sent_ipv4(&stack.driver_mut().tx[0]);
        assert!(eth.dst.is_broadcast());
        assert!(hdr.dst.is_broadcast());
    }

    #[test]
    fn test_link_down_refuses_send() {
        let mut stack = make_stack();
        stack.driver_mut().link_up = false;
        assert_eq!(
            stack.send_ipv4(PEER_IP, Ipv4Proto::Udp, b"x", 0),
            SendStatus::LinkDown
        );
        assert_eq!(stack.poll(0), PollOutcome::Idle);
    }

    #[cfg(feature = "fragmentation")]
    #[test]
    fn test_large_payload_fragments_at_threshold() {
        let mut stack = make_stack();
        stack.arp_learn_for_test(PEER_IP, PEER_MAC);

        let payload = vec![0x5A; 2 * FRAGMENT_THRESHOLD + 37];
        assert_eq!(
            stack.send_ipv4(PEER_IP, Ipv4Proto::Udp, &payload, 0),
            SendStatus::Sent
        );

        let frames: Vec<_> = stack.driver_mut().tx.clone();
        assert_eq!(frames.len(), 3);

        let parsed: Vec<_> = frames.iter().map(|f| sent_ipv4(f)).collect();
        let ident = parsed[0].1.identification;
        let offsets: Vec<u16> = parsed.iter().map(|(_, h, _)| h.fragment_offset()).collect();
        let more: Vec<bool> = parsed.iter().map(|(_, h, _)| h.more_fragments()).collect();
        assert_eq!(offsets, [0, 160, 320]);
        assert_eq!(more, [true, true, false]);
        for (_, h, _) in &parsed {
            assert_eq!(h.identification, ident);
        }
        assert_eq!(parsed[0].2.len(), FRAGMENT_THRESHOLD);
        assert_eq!(parsed[2].2.len(), 37);
    }

    #[cfg(all(feature = "fragmentation", feature = "udp"))]
    #[test]
    fn test_fragmented_udp_reassembles_to_handler() {
        let mut stack = make_stack();
        let seen: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        stack.register_udp_handler(
            8080,
            Box::new(move |_src: Ipv4Addr, _sp: u16, _dp: u16, payload: &[u8]| {
                sink.borrow_mut().extend_from_slice(payload);
            }),
        );

        let body = vec![0xC3u8; 1500];
        let datagram =
            build_udp_datagram(PEER_IP, OUR_IP, 5000, 8080, &body).expect("datagram");

        stack.driver_mut().rx.push_back(ipv4_frame(
            Ipv4Proto::Udp,
            &datagram[..1280],
            Ipv4Flags::MORE_FRAGMENTS,
            0,
            9,
        ));
        stack.driver_mut().rx.push_back(ipv4_frame(
            Ipv4Proto::Udp,
            &datagram[1280..],
            Ipv4Flags::empty(),
            160,
            9,
        ));

        assert_eq!(stack.poll(0), PollOutcome::Processed(2));
        assert_eq!(&*seen.borrow(), &body);
        assert_eq!(stack.stats().fragments_reassembled.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_empty_frame_is_fatal() {
        let mut stack = make_stack();
        stack.driver_mut().rx.push_back(Vec::new());
        assert_eq!(stack.poll(0), PollOutcome::FatalDriverFault);
    }

    #[test]
    fn test_oversized_frame_is_fatal() {
        let mut stack = make_stack();
        stack.driver_mut().rx.push_back(vec![0u8; MAX_FRAME_LEN + 1]);
        assert_eq!(stack.poll(0), PollOutcome::FatalDriverFault);
    }

    #[test]
    fn test_unsupported_ethertype_counted() {
        let mut stack = make_stack();
        let frame = build_ethernet_frame(OUR_MAC, PEER_MAC, 0x86DD, &[0u8; 40]);
        stack.driver_mut().rx.push_back(frame);
        stack.poll(0);
        assert_eq!(
            stack.stats().unsupported_ethertype.load(Ordering::Relaxed),
            1
        );
    }

    #[test]
    fn test_foreign_unicast_ignored() {
        let mut stack = make_stack();
        let other = EthAddr::new(0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa);
        let frame = build_ethernet_frame(other, PEER_MAC, ETHERTYPE_IPV4, &[0u8; 20]);
        stack.driver_mut().rx.push_back(frame);
        stack.poll(0);
        assert_eq!(stack.stats().ipv4_rx.load(Ordering::Relaxed), 0);
        assert_eq!(stack.stats().rx_frames.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_ipv4_for_other_host_dropped() {
        let mut stack = make_stack();
        let hdr = build_ipv4_header(
            PEER_IP,
            Ipv4Addr::new(192, 168, 0, 99),
            Ipv4Proto::Icmp,
            0,
            64,
            1,
            Ipv4Flags::empty(),
            0,
        );
        let frame = build_ethernet_frame(OUR_MAC, PEER_MAC, ETHERTYPE_IPV4, &hdr);
        stack.driver_mut().rx.push_back(frame);
        stack.poll(0);
        assert_eq!(stack.stats().ipv4_rx.load(Ordering::Relaxed), 0);
    }

    #[cfg(feature = "icmp")]
    #[test]
    fn test_icmp_classified_and_counted() {
        let mut stack = make_stack();
        stack.driver_mut().rx.push_back(ipv4_frame(
            Ipv4Proto::Icmp,
            &[8, 0, 0, 0, 0, 1, 0, 1],
            Ipv4Flags::empty(),
            0,
            3,
        ));
        stack.poll(0);
        assert_eq!(stack.stats().icmp_rx.load(Ordering::Relaxed), 1);
    }

    #[cfg(feature = "udp")]
    #[test]
    fn test_udp_without_listener_counted() {
        let mut stack = make_stack();
        let datagram =
            build_udp_datagram(PEER_IP, OUR_IP, 5000, 9999, b"x").expect("datagram");
        stack.driver_mut().rx.push_back(ipv4_frame(
            Ipv4Proto::Udp,
            &datagram,
            Ipv4Flags::empty(),
            0,
            4,
        ));
        stack.poll(0);
        assert_eq!(stack.stats().udp.rx_no_listener.load(Ordering::Relaxed), 1);
    }

    #[cfg(feature = "udp")]
    #[test]
    fn test_send_udp_end_to_end_bytes() {
        let mut stack = make_stack();
        stack.arp_learn_for_test(PEER_IP, PEER_MAC);

        assert_eq!(
            stack.send_udp(PEER_IP, 8080, 5000, b"telemetry", 0),
            SendStatus::Sent
        );
        let (eth, hdr, payload) = sent_ipv4(&stack.driver_mut().tx[0]);
        assert_eq!(eth.dst, PEER_MAC);
        assert_eq!(hdr.proto(), Some(Ipv4Proto::Udp));
        let (udp_hdr, body) =
            crate::udp::parse_udp(&payload, OUR_IP, PEER_IP, true).expect("udp");
        assert_eq!(udp_hdr.dst_port, 8080);
        assert_eq!(body, b"telemetry");
    }

    #[cfg(feature = "fragmentation")]
    #[test]
    fn test_tick_expires_stale_reassembly() {
        let mut stack = make_stack();
        stack.driver_mut().rx.push_back(ipv4_frame(
            Ipv4Proto::Udp,
            &[0u8; 16],
            Ipv4Flags::MORE_FRAGMENTS,
            0,
            11,
        ));
        stack.poll(0);

        assert_eq!(stack.on_tick(1000), 0);
        assert_eq!(stack.on_tick(crate::fragment::REASSEMBLY_TIMEOUT_MS + 1), 1);
        assert_eq!(stack.stats().fragments_dropped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_init_announces_when_link_up() {
        let mut stack = make_stack();
        stack.init().expect("init");
        assert_eq!(stack.driver_mut().tx.len(), 1);
        let announce = parse_arp(&stack.driver_mut().tx[0][14..]).expect("arp");
        assert_eq!(announce.op, ArpOp::Request);
        assert_eq!(announce.sender_ip, announce.target_ip);
    }

    impl NetStack<MockDriver> {
        fn arp_learn_for_test(&mut self, ip: Ipv4Addr, mac: EthAddr) {
            self.arp.learn(ip, mac, 0);
        }
    }
}
