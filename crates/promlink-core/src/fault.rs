//! Fault taxonomy for failed transfers.
//!
//! Engines never return errors from dispatch. A fatal condition moves the
//! engine to [`TransferState::Error`](crate::TransferState::Error) and
//! records one of these values; the embedding observes it through
//! `fault()` after noticing the engine is no longer busy.

use thiserror::Error;

/// Why a transfer ended in the error state.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// A data block arrived for an address past the expected cursor.
    ///
    /// Blocks *behind* the cursor are duplicates and tolerated; a block
    /// ahead of it means payload was lost and the transfer cannot continue.
    #[error("data block at {received:#010x} does not match expected address {expected:#010x}")]
    AddressGap {
        /// Address the engine expected next (`start_addr + offset`).
        expected: u32,
        /// Address the offending block carried.
        received: u32,
    },

    /// During verify, a device byte differed from the local image.
    ///
    /// `offset` is the transfer offset of the first mismatching byte and is
    /// preserved for reporting.
    #[error("device contents differ from local image at transfer offset {offset:#x}")]
    Mismatch {
        /// Transfer offset of the first mismatching byte.
        offset: u32,
    },

    /// The master's image source ran dry before `length` bytes were sent.
    #[error("image source exhausted at offset {offset} before reaching length {length}")]
    SourceExhausted {
        /// Bytes transferred when the source stopped producing.
        offset: u32,
        /// Bytes the transfer was armed for.
        length: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_locator() {
        let fault = Fault::Mismatch { offset: 0x41 };
        assert_eq!(fault.to_string(), "device contents differ from local image at transfer offset 0x41");
    }
}
