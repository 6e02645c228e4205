//! Shared transfer substrate.
//!
//! Both engines track a transfer the same way: a region (`start_addr`,
//! `length`), a cursor (`offset`), and a state. The derived quantities
//! (`remaining`, `chunk_len`, `expected_addr`) encode the block-paging
//! arithmetic once so master and slave cannot disagree on it.

use promlink_proto::BLOCK;

/// Phase of an engine's current (or last) transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// No transfer in progress; commands are accepted.
    Idle,
    /// Master only: upload announced, waiting for the slave's first ACK.
    Erasing,
    /// Payload is flowing host → device.
    Uploading,
    /// Payload is flowing device → host.
    Downloading,
    /// Master only: device blocks are being compared against the local
    /// image.
    Verifying,
    /// The transfer aborted; sticky until externally reset.
    Error,
}

/// Region, cursor, and state of one transfer.
///
/// # Invariants
///
/// `0 <= offset <= length` at all times; [`Transfer::advance`] clamps so
/// the fixed block-size advance on ACK cannot overshoot the tail.
#[derive(Debug, Clone, Copy)]
pub struct Transfer {
    pub(crate) state: TransferState,
    pub(crate) start_addr: u32,
    pub(crate) offset: u32,
    pub(crate) length: u32,
}

impl Transfer {
    pub(crate) fn new() -> Self {
        Self { state: TransferState::Idle, start_addr: 0, offset: 0, length: 0 }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Base device address of the transfer region.
    #[must_use]
    pub fn start_addr(&self) -> u32 {
        self.start_addr
    }

    /// Bytes successfully transferred so far.
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Total bytes the transfer was armed for.
    #[must_use]
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Whether a transfer is in progress.
    ///
    /// Idle and Error are the only not-busy states: both mean no further
    /// frames are expected without external action.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        !matches!(self.state, TransferState::Idle | TransferState::Error)
    }

    /// Bytes still to transfer.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.length - self.offset
    }

    /// Meaningful bytes in the next block: `min(BLOCK, remaining)`.
    #[must_use]
    pub fn chunk_len(&self) -> usize {
        (self.remaining() as usize).min(BLOCK)
    }

    /// Device address the next data block must carry.
    ///
    /// Address arithmetic is modular in the device's 32-bit space.
    #[must_use]
    pub fn expected_addr(&self) -> u32 {
        self.start_addr.wrapping_add(self.offset)
    }

    /// Record region and reset the cursor for a new transfer.
    pub(crate) fn arm(&mut self, start_addr: u32, length: u32) {
        self.start_addr = start_addr;
        self.length = length;
        self.offset = 0;
    }

    /// Move the cursor forward by up to `n` bytes, clamped at `length`.
    pub(crate) fn advance(&mut self, n: u32) {
        self.offset = self.offset.saturating_add(n).min(self.length);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_len_caps_at_block() {
        let mut t = Transfer::new();
        t.arm(0x1000, 150);
        assert_eq!(t.chunk_len(), BLOCK);

        t.advance(128);
        assert_eq!(t.chunk_len(), 22);

        t.advance(64);
        assert_eq!(t.offset(), 150);
        assert_eq!(t.chunk_len(), 0);
    }

    #[test]
    fn advance_clamps_at_length() {
        let mut t = Transfer::new();
        t.arm(0x1000, 100);
        t.advance(64);
        t.advance(64);
        assert_eq!(t.offset(), 100);
        assert_eq!(t.remaining(), 0);
    }

    #[test]
    fn expected_addr_wraps() {
        let mut t = Transfer::new();
        t.arm(u32::MAX - 10, 64);
        t.advance(32);
        assert_eq!(t.expected_addr(), 21);
    }

    #[test]
    fn busy_states() {
        let mut t = Transfer::new();
        assert!(!t.is_busy());
        for state in [
            TransferState::Erasing,
            TransferState::Uploading,
            TransferState::Downloading,
            TransferState::Verifying,
        ] {
            t.state = state;
            assert!(t.is_busy());
        }
        t.state = TransferState::Error;
        assert!(!t.is_busy());
    }
}
