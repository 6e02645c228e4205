//! Frame emission shared by both engines.

use promlink_proto::{Command, CommandFrame, DataFrame, NodeId};

use crate::{io::Storage, link::BusSender, transfer::Transfer};

/// Encode and transmit one command frame.
pub(crate) fn send_command<L: BusSender>(
    link: &mut L,
    dest: NodeId,
    command: Command,
    address: u32,
    length: u32,
) {
    tracing::trace!(%dest, ?command, address = format_args!("{address:#x}"), length, "command out");
    let frame = CommandFrame::new(command, address, length);
    link.send(dest, &frame.to_bytes());
}

/// Read the next block at the transfer cursor and transmit it.
///
/// The frame always goes out full-size: the storage fills the meaningful
/// prefix (`chunk_len` bytes at most) and the remainder stays zero. Returns
/// the count the storage actually produced, which is the caller's EOF
/// signal.
pub(crate) fn send_data_block<S: Storage, L: BusSender>(
    transfer: &Transfer,
    storage: &mut S,
    link: &mut L,
    dest: NodeId,
) -> usize {
    let n = transfer.chunk_len();
    let address = transfer.expected_addr();

    let mut frame = DataFrame::new(address);
    let produced = storage.read(address, &mut frame.payload_mut()[..n]);

    tracing::trace!(%dest, address = format_args!("{address:#x}"), n, produced, "data block out");
    link.send(dest, &frame.to_bytes());

    produced
}
