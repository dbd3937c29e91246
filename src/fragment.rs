//! IPv4 fragment reassembly.
//!
//! Datagrams are keyed by (identification, destination address). The
//! first fragment (offset 0, More Fragments set) opens an entry; later
//! fragments are copied in at `offset * 8`; the fragment with More
//! Fragments clear completes the datagram and releases the entry.
//!
//! Fragments are assumed to fill the buffer contiguously once the
//! terminal fragment arrives. This is the behavior of every sender that
//! fragments sequentially; a hole left by a lost middle fragment shows
//! up as zero bytes and is caught by the transport checksum.
//!
//! Entries that never complete are reaped by
//! [`ReassemblyTable::cleanup_expired`], which the stack calls from its
//! timer tick.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use log::{debug, trace};

use crate::ipv4::{Ipv4Addr, Ipv4Header, IPV4_HEADER_LEN};

/// Incomplete reassemblies older than this are discarded.
pub const REASSEMBLY_TIMEOUT_MS: u64 = 30_000;

/// Hard cap on a reassembled datagram (IPv4 total-length limit).
pub const MAX_REASSEMBLED_SIZE: usize = 65_535;

// ============================================================================
// Types
// ============================================================================

/// Identity of one in-flight fragmented datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FragmentKey {
    /// IPv4 identification field, shared by all fragments
    pub identification: u16,
    /// Destination address
    pub dst: Ipv4Addr,
}

/// A datagram being reassembled.
struct Reassembly {
    proto: u8,
    src: Ipv4Addr,
    ttl: u8,
    data: Vec<u8>,
    created_ms: u64,
}

/// Errors from fragment processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentError {
    /// A non-first fragment arrived with no matching first fragment
    UnknownFragment,
    /// Reassembled size would exceed the IPv4 total-length limit
    TooLarge,
}

// ============================================================================
// Reassembly Table
// ============================================================================

/// Table of in-flight fragment reassemblies.
pub struct ReassemblyTable {
    entries: BTreeMap<FragmentKey, Reassembly>,
}

impl ReassemblyTable {
    pub fn new() -> Self {
        ReassemblyTable {
            entries: BTreeMap::new(),
        }
    }

    /// Feed one fragment into the table.
    ///
    /// Returns `Ok(Some((header, payload)))` when this fragment completed
    /// a datagram: the header is synthesized (offset 0, no flags, no
    /// options) so the caller can demux it like an unfragmented packet.
    /// Returns `Ok(None)` when more fragments are still expected.
    pub fn process(
        &mut self,
        hdr: &Ipv4Header,
        payload: &[u8],
        now_ms: u64,
    ) -> Result<Option<(Ipv4Header, Vec<u8>)>, FragmentError> {
        let key = FragmentKey {
            identification: hdr.identification,
            dst: hdr.dst,
        };

        if hdr.fragment_offset() == 0 && hdr.more_fragments() {
            // First fragment opens (or restarts) the entry. Options are
            // meaningful only on the first fragment and we carry none
            // into the reassembled header.
            trace!(
                "frag: new datagram id={} from {} ({} bytes)",
                hdr.identification,
                hdr.src,
                payload.len()
            );
            self.entries.insert(
                key,
                Reassembly {
                    proto: hdr.protocol,
                    src: hdr.src,
                    ttl: hdr.ttl,
                    data: payload.to_vec(),
                    created_ms: now_ms,
                },
            );
            return Ok(None);
        }

        let entry = self
            .entries
            .get_mut(&key)
            .ok_or(FragmentError::UnknownFragment)?;

        let start = hdr.fragment_offset() as usize * 8;
        let end = start + payload.len();
        if end + IPV4_HEADER_LEN > MAX_REASSEMBLED_SIZE {
            self.entries.remove(&key);
            return Err(FragmentError::TooLarge);
        }

        if entry.data.len() < end {
            entry.data.resize(end, 0);
        }
        entry.data[start..end].copy_from_slice(payload);

        if hdr.more_fragments() {
            return Ok(None);
        }

        // Terminal fragment: the datagram is complete.
        let done = match self.entries.remove(&key) {
            Some(r) => r,
            None => return Err(FragmentError::UnknownFragment),
        };
        debug!(
            "frag: reassembled id={} from {} ({} bytes)",
            hdr.identification,
            done.src,
            done.data.len()
        );

        let assembled = Ipv4Header {
            version: 4,
            ihl: 5,
            dscp_ecn: hdr.dscp_ecn,
            total_len: (IPV4_HEADER_LEN + done.data.len()) as u16,
            identification: hdr.identification,
            flags_fragment: 0,
            ttl: done.ttl,
            protocol: done.proto,
            checksum: 0,
            src: done.src,
            dst: hdr.dst,
            options_len: 0,
        };
        Ok(Some((assembled, done.data)))
    }

    /// Discard incomplete reassemblies older than
    /// [`REASSEMBLY_TIMEOUT_MS`]. Returns the number removed.
    pub fn cleanup_expired(&mut self, now_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, r| now_ms.saturating_sub(r.created_ms) <= REASSEMBLY_TIMEOUT_MS);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("frag: expired {} incomplete reassemblies", removed);
        }
        removed
    }

    /// Number of in-flight reassemblies.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether any reassembly is in flight.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ReassemblyTable {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
