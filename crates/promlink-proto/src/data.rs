//! Data frame: one fixed-size payload block.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    errors::{Result, WireError},
    frame::DATA_REPR_ID,
};

/// Payload bytes per data frame.
///
/// A compile-time protocol constant: every data frame carries exactly this
/// many payload bytes on the wire, and master and slave must agree on it.
/// At the tail of a transfer only the first `length - offset` bytes of the
/// block are meaningful; the rest is padding the receiver ignores.
pub const BLOCK: usize = 64;

/// Fixed-size data frame (little-endian address, [`BLOCK`]-byte payload).
///
/// Layout on the wire:
/// `[repr_id: 1][address: 4, LE][data: BLOCK]`
///
/// The frame always carries the full block. Senders built via [`Self::new`]
/// zero-fill the payload, so partial tail blocks pad with zeros rather than
/// leaking stale buffer contents.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct DataFrame {
    repr_id: u8,
    address: [u8; 4],
    data: [u8; BLOCK],
}

impl DataFrame {
    /// Size of the serialized frame.
    pub const SIZE: usize = 1 + 4 + BLOCK;

    /// Build an empty (zero-filled) data frame for the given address.
    #[must_use]
    pub fn new(address: u32) -> Self {
        Self { repr_id: DATA_REPR_ID, address: address.to_le_bytes(), data: [0u8; BLOCK] }
    }

    /// Parse a data frame from bus payload bytes (zero-copy).
    ///
    /// Trailing bytes are tolerated; the bus may pad frames.
    ///
    /// # Errors
    ///
    /// - [`WireError::FrameTooShort`] if fewer than [`Self::SIZE`] bytes
    /// - [`WireError::UnknownRepresentation`] if the tag byte is wrong
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let frame = Self::ref_from_prefix(bytes)
            .map_err(|_| WireError::FrameTooShort { expected: Self::SIZE, actual: bytes.len() })?
            .0;

        if frame.repr_id != DATA_REPR_ID {
            return Err(WireError::UnknownRepresentation(frame.repr_id));
        }

        Ok(frame)
    }

    /// Serialize to the wire representation.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(IntoBytes::as_bytes(self));
        arr
    }

    /// Device address of the first payload byte.
    #[must_use]
    pub fn address(&self) -> u32 {
        u32::from_le_bytes(self.address)
    }

    /// The full payload block.
    #[must_use]
    pub fn payload(&self) -> &[u8; BLOCK] {
        &self.data
    }

    /// Mutable payload block, for filling before transmission.
    pub fn payload_mut(&mut self) -> &mut [u8; BLOCK] {
        &mut self.data
    }
}

// Manual Debug/PartialEq implementations (can't derive due to packed repr)
impl std::fmt::Debug for DataFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFrame")
            .field("address", &format!("{:#010x}", self.address()))
            .field("data", &format!("[u8; {BLOCK}]"))
            .finish()
    }
}

impl PartialEq for DataFrame {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for DataFrame {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_pinned() {
        assert_eq!(std::mem::size_of::<DataFrame>(), DataFrame::SIZE);
        assert_eq!(DataFrame::SIZE, 69);
    }

    #[test]
    fn new_frame_is_zero_filled() {
        let frame = DataFrame::new(0x2000);
        assert_eq!(frame.address(), 0x2000);
        assert!(frame.payload().iter().all(|&b| b == 0));
    }

    #[test]
    fn frame_round_trip() {
        let mut frame = DataFrame::new(0xDEAD_0040);
        for (i, byte) in frame.payload_mut().iter_mut().enumerate() {
            *byte = i as u8;
        }

        let bytes = frame.to_bytes();
        let parsed = DataFrame::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.address(), 0xDEAD_0040);
        assert_eq!(parsed.payload()[63], 63);
        assert_eq!(parsed, &frame);
    }

    #[test]
    fn reject_short_buffer() {
        let bytes = [DATA_REPR_ID; 20];
        assert_eq!(
            DataFrame::from_bytes(&bytes).unwrap_err(),
            WireError::FrameTooShort { expected: 69, actual: 20 }
        );
    }
}
