//! Tagged-union view over the two frame kinds.
//!
//! The first payload byte of every bus frame is a representation id drawn
//! from the bus-wide registry; the two ids below are the slice assigned to
//! the programming protocol. [`Frame::parse`] routes on that byte and hands
//! back a typed borrow of the underlying bytes.

use bytes::BufMut;

use crate::{
    command::CommandFrame,
    data::DataFrame,
    errors::{Result, WireError},
};

/// Representation id tagging a [`CommandFrame`].
pub const COMMAND_REPR_ID: u8 = 0x30;

/// Representation id tagging a [`DataFrame`].
pub const DATA_REPR_ID: u8 = 0x31;

/// A parsed inbound frame, borrowing the receive buffer.
///
/// Frames whose representation id is neither [`COMMAND_REPR_ID`] nor
/// [`DATA_REPR_ID`] belong to other protocols sharing the bus; parsing
/// reports them as [`WireError::UnknownRepresentation`] and the engines
/// ignore them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// A command frame.
    Command(&'a CommandFrame),
    /// A data frame.
    Data(&'a DataFrame),
}

impl<'a> Frame<'a> {
    /// Parse bus payload bytes into a typed frame view.
    ///
    /// # Errors
    ///
    /// - [`WireError::Empty`] on a zero-length buffer
    /// - [`WireError::UnknownRepresentation`] for foreign representation ids
    /// - [`WireError::FrameTooShort`] if the tagged layout doesn't fit
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        match bytes.first() {
            None => Err(WireError::Empty),
            Some(&COMMAND_REPR_ID) => Ok(Self::Command(CommandFrame::from_bytes(bytes)?)),
            Some(&DATA_REPR_ID) => Ok(Self::Data(DataFrame::from_bytes(bytes)?)),
            Some(&other) => Err(WireError::UnknownRepresentation(other)),
        }
    }

    /// Representation id of this frame.
    #[must_use]
    pub fn repr_id(&self) -> u8 {
        match self {
            Self::Command(_) => COMMAND_REPR_ID,
            Self::Data(_) => DATA_REPR_ID,
        }
    }

    /// Append the wire representation to a buffer.
    pub fn encode(&self, dst: &mut impl BufMut) {
        match self {
            Self::Command(cmd) => dst.put_slice(&cmd.to_bytes()),
            Self::Data(data) => dst.put_slice(&data.to_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;

    #[test]
    fn routes_by_representation_id() {
        let cmd = CommandFrame::new(Command::Download, 0x3000, 64).to_bytes();
        assert!(matches!(Frame::parse(&cmd), Ok(Frame::Command(_))));

        let data = DataFrame::new(0x3000).to_bytes();
        assert!(matches!(Frame::parse(&data), Ok(Frame::Data(_))));
    }

    #[test]
    fn rejects_foreign_and_empty() {
        assert_eq!(Frame::parse(&[]), Err(WireError::Empty));
        assert_eq!(Frame::parse(&[0x10, 0, 0]), Err(WireError::UnknownRepresentation(0x10)));
    }

    #[test]
    fn encode_matches_to_bytes() {
        let cmd = CommandFrame::new(Command::Ack, 0x40, 128);
        let mut wire = Vec::new();
        Frame::Command(&cmd).encode(&mut wire);
        assert_eq!(wire, cmd.to_bytes());
    }
}
