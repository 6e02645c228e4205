//! Fuzz target for slave frame dispatch
//!
//! # Strategy
//!
//! - Structured sequences: valid-ish commands and data blocks from
//!   arbitrary senders in arbitrary order
//! - Raw bytes: completely arbitrary payloads through the same handler
//!
//! # Invariants
//!
//! - Dispatch NEVER panics, whatever arrives in whatever state
//! - The transfer cursor stays within the armed length
//! - Only idle/error states are not busy (the busy lock has no third kind)

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use promlink_core::{BusHeader, NodeId, Slave, TransferState};
use promlink_harness::MemFlash;
use promlink_proto::{Command, CommandFrame, DataFrame};

#[derive(Debug, Arbitrary)]
enum Step {
    Command { sender: u8, command: u8, address: u32, length: u32 },
    Data { sender: u8, address: u32, fill: u8 },
    Raw { sender: u8, bytes: Vec<u8> },
}

#[derive(Default)]
struct NullLink;

impl promlink_core::BusSender for NullLink {
    fn send(&mut self, _dest: NodeId, _frame: &[u8]) {}
}

fuzz_target!(|steps: Vec<Step>| {
    let mut slave = Slave::new(NodeId(0x21), NullLink, MemFlash::new(0, 4096));

    for step in steps {
        let (sender, bytes) = match step {
            Step::Command { sender, command, address, length } => {
                let command = Command::from_u8(command % 8).unwrap_or(Command::Upload);
                // Keep regions small enough to exercise completion paths.
                (sender, CommandFrame::new(command, address % 8192, length % 8192).to_bytes().to_vec())
            }
            Step::Data { sender, address, fill } => {
                let mut frame = DataFrame::new(address % 8192);
                frame.payload_mut().fill(fill);
                (sender, frame.to_bytes().to_vec())
            }
            Step::Raw { sender, bytes } => (sender, bytes),
        };

        let header = BusHeader { sender: NodeId(sender), receiver: NodeId(0x21) };
        slave.handle_frame(&header, &bytes);

        assert!(slave.offset() <= slave.length());
        match slave.state() {
            TransferState::Idle | TransferState::Error => assert!(!slave.is_busy()),
            _ => assert!(slave.is_busy()),
        }
    }
});
