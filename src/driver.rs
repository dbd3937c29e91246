//! Link-layer driver abstraction.
//!
//! The stack talks to the network hardware exclusively through the
//! [`LinkDriver`] trait, keeping the protocol core portable across
//! controllers (SPI-attached parts like the ENC28J60, memory-mapped
//! MACs, or an in-memory mock for tests).
//!
//! # Design principles
//!
//! 1. **Non-blocking I/O**: `send_frame` and `next_frame` return
//!    immediately; drivers queue internally.
//!
//! 2. **Owned receive buffers**: `next_frame` hands the caller an owned
//!    buffer, so the frame's lifetime is decoupled from driver
//!    internals and freeing is automatic.
//!
//! 3. **Polling**: the stack polls `frames_available` from its receive
//!    loop; interrupt wiring (if any) stays inside the driver.

use alloc::vec::Vec;

use crate::ethernet::EthAddr;

// ============================================================================
// Error Types
// ============================================================================

/// Errors reported by a link driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// Controller initialization failed (bad wiring, unsupported chip).
    InitFailed,
    /// Transmission failed at the PHY level.
    PhyError,
}

// ============================================================================
// LinkDriver Trait
// ============================================================================

/// Capability set required of a link-layer driver.
pub trait LinkDriver {
    /// Bring up the controller with the given station MAC address.
    fn initialize(&mut self, mac: EthAddr) -> Result<(), DriverError>;

    /// Reset the controller to its power-on state.
    fn reset(&mut self);

    /// Check whether the physical link is up.
    fn link_is_up(&mut self) -> bool;

    /// Transmit a complete Ethernet frame.
    ///
    /// The driver copies or consumes the bytes before returning; the
    /// caller keeps ownership of the slice either way.
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), DriverError>;

    /// Number of received frames waiting to be collected.
    fn frames_available(&mut self) -> usize;

    /// Pop the next received frame, if any.
    ///
    /// The returned buffer is owned by the caller. A well-behaved driver
    /// never returns an empty buffer; the stack treats one as a fatal
    /// driver fault.
    fn next_frame(&mut self) -> Option<Vec<u8>>;
}
