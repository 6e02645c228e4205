//! Fuzz target for frame parsing
//!
//! # Strategy
//!
//! - Completely arbitrary byte buffers through `Frame::parse`
//! - Valid tag bytes with truncated bodies
//!
//! # Invariants
//!
//! - Parsing is total: typed frame or typed error, NEVER a panic
//! - A successfully parsed frame re-encodes to a prefix of the input
//! - Error classification matches the input shape

#![no_main]

use libfuzzer_sys::fuzz_target;
use promlink_proto::{COMMAND_REPR_ID, CommandFrame, DATA_REPR_ID, DataFrame, Frame, WireError};

fuzz_target!(|data: &[u8]| {
    match Frame::parse(data) {
        Ok(Frame::Command(cmd)) => {
            assert_eq!(data[0], COMMAND_REPR_ID);
            assert_eq!(&cmd.to_bytes()[..], &data[..CommandFrame::SIZE]);
        }
        Ok(Frame::Data(block)) => {
            assert_eq!(data[0], DATA_REPR_ID);
            assert_eq!(&block.to_bytes()[..], &data[..DataFrame::SIZE]);
        }
        Err(WireError::Empty) => assert!(data.is_empty()),
        Err(WireError::UnknownRepresentation(id)) => assert_eq!(id, data[0]),
        Err(WireError::FrameTooShort { expected, actual }) => {
            assert_eq!(actual, data.len());
            assert!(actual < expected);
        }
    }
});
