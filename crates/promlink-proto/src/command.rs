//! Command frame: the protocol's five-word vocabulary.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    errors::{Result, WireError},
    frame::COMMAND_REPR_ID,
};

/// Command carried by a [`CommandFrame`].
///
/// The discriminants are the on-wire byte values; both ends of the bus must
/// agree on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Master announces a host-to-device transfer of `length` bytes at
    /// `address`; the slave erases and prepares the region.
    Upload = 0x01,
    /// Master requests one data block of `length` bytes from `address`.
    Download = 0x02,
    /// Master asks the slave to jump to the image at the armed address.
    Execute = 0x03,
    /// Master cancels whatever the slave is doing.
    Abort = 0x04,
    /// Slave acknowledges an accepted command or data block.
    Ack = 0x05,
}

impl Command {
    /// Decode a wire byte. `None` if the byte is not a known command.
    #[must_use]
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(Self::Upload),
            0x02 => Some(Self::Download),
            0x03 => Some(Self::Execute),
            0x04 => Some(Self::Abort),
            0x05 => Some(Self::Ack),
            _ => None,
        }
    }

    /// Wire byte for this command.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Fixed 10-byte command frame (little-endian integer fields).
///
/// Layout on the wire:
/// `[repr_id: 1][command: 1][address: 4, LE][length: 4, LE]`
///
/// Fields are raw byte arrays to avoid alignment issues; accessors decode
/// them. `address` and `length` are interpreted per command: the transfer
/// region for Upload/Download/Execute, and `(acked address, remaining
/// bytes)` for Ack.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct CommandFrame {
    repr_id: u8,
    command: u8,
    address: [u8; 4],
    length: [u8; 4],
}

impl CommandFrame {
    /// Size of the serialized frame.
    pub const SIZE: usize = 10;

    /// Build a command frame ready for transmission.
    #[must_use]
    pub fn new(command: Command, address: u32, length: u32) -> Self {
        Self {
            repr_id: COMMAND_REPR_ID,
            command: command.to_u8(),
            address: address.to_le_bytes(),
            length: length.to_le_bytes(),
        }
    }

    /// Parse a command frame from bus payload bytes (zero-copy).
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

        if frame.repr_id != COMMAND_REPR_ID {
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

    /// Command as enum. `None` if the wire byte is unrecognized.
    #[must_use]
    pub fn command(&self) -> Option<Command> {
        Command::from_u8(self.command)
    }

    /// Command as raw wire byte.
    #[must_use]
    pub fn command_raw(&self) -> u8 {
        self.command
    }

    /// Address field.
    #[must_use]
    pub fn address(&self) -> u32 {
        u32::from_le_bytes(self.address)
    }

    /// Length field.
    #[must_use]
    pub fn length(&self) -> u32 {
        u32::from_le_bytes(self.length)
    }
}

// Manual Debug/PartialEq implementations (can't derive due to packed repr)
impl std::fmt::Debug for CommandFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandFrame")
            .field("command", &self.command())
            .field("address", &format!("{:#010x}", self.address()))
            .field("length", &self.length())
            .finish()
    }
}

impl PartialEq for CommandFrame {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for CommandFrame {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_pinned() {
        assert_eq!(std::mem::size_of::<CommandFrame>(), CommandFrame::SIZE);
        assert_eq!(CommandFrame::SIZE, 10);
    }

    #[test]
    fn command_round_trip() {
        for raw in 0x01..=0x05u8 {
            let cmd = Command::from_u8(raw).unwrap();
            assert_eq!(cmd.to_u8(), raw);
        }
        assert_eq!(Command::from_u8(0x00), None);
        assert_eq!(Command::from_u8(0x06), None);
    }

    #[test]
    fn frame_round_trip() {
        let frame = CommandFrame::new(Command::Upload, 0x0800_4000, 1536);
        let bytes = frame.to_bytes();

        let parsed = CommandFrame::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.command(), Some(Command::Upload));
        assert_eq!(parsed.address(), 0x0800_4000);
        assert_eq!(parsed.length(), 1536);
        assert_eq!(parsed, &frame);
    }

    #[test]
    fn integers_are_little_endian() {
        let frame = CommandFrame::new(Command::Ack, 0x1122_3344, 0x0102_0304);
        let bytes = frame.to_bytes();
        assert_eq!(&bytes[2..6], &[0x44, 0x33, 0x22, 0x11]);
        assert_eq!(&bytes[6..10], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn reject_short_buffer() {
        let err = CommandFrame::from_bytes(&[COMMAND_REPR_ID, 0x01]).unwrap_err();
        assert_eq!(err, WireError::FrameTooShort { expected: 10, actual: 2 });
    }

    #[test]
    fn reject_wrong_tag() {
        let mut bytes = CommandFrame::new(Command::Abort, 0, 0).to_bytes();
        bytes[0] = 0x7F;
        assert_eq!(
            CommandFrame::from_bytes(&bytes).unwrap_err(),
            WireError::UnknownRepresentation(0x7F)
        );
    }

    #[test]
    fn unknown_command_byte_decodes_as_none() {
        let mut bytes = CommandFrame::new(Command::Upload, 0, 0).to_bytes();
        bytes[1] = 0xEE;
        let parsed = CommandFrame::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.command(), None);
        assert_eq!(parsed.command_raw(), 0xEE);
    }
}
