//! Slave engine.
//!
//! The slave is the device side: it accepts one master at a time, erases
//! and rewrites its memory through the injected [`Storage`] backend, serves
//! memory blocks on request, and jumps into a programmed image on EXECUTE.
//! Every accepted command and data block is acknowledged; the ACK carries
//! the acked address and the bytes still outstanding.

use promlink_proto::{BusHeader, Command, CommandFrame, DataFrame, Frame, NodeId};

use crate::{
    fault::Fault,
    io::{Execute, Storage},
    link::BusSender,
    transfer::{Transfer, TransferState},
    wire,
};

/// Device side of a programming session.
///
/// Generic over the flash backend `F` and the outbound bus capability `L`.
/// While not busy the peer is the broadcast sentinel and the first command
/// from any node is accepted; once a transfer starts, only frames from the
/// initiating master are processed until the transfer terminates.
#[derive(Debug)]
pub struct Slave<F, L> {
    own_id: NodeId,
    peer: NodeId,
    transfer: Transfer,
    flash: F,
    link: L,
    fault: Option<Fault>,
}

impl<F: Storage + Execute, L: BusSender> Slave<F, L> {
    /// Create an idle slave engine listening for any master.
    pub fn new(own_id: NodeId, link: L, flash: F) -> Self {
        Self {
            own_id,
            peer: NodeId::BROADCAST,
            transfer: Transfer::new(),
            flash,
            link,
            fault: None,
        }
    }

    /// True unless the engine is in a terminal (Idle/Error) state.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.transfer.is_busy()
    }

    /// Current transfer state.
    #[must_use]
    pub fn state(&self) -> TransferState {
        self.transfer.state()
    }

    /// Bytes written so far in the current upload.
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.transfer.offset()
    }

    /// Bytes the current transfer was armed for.
    #[must_use]
    pub fn length(&self) -> u32 {
        self.transfer.length()
    }

    /// This node's address on the bus.
    #[must_use]
    pub fn own_id(&self) -> NodeId {
        self.own_id
    }

    /// The master currently engaged, or broadcast when free.
    #[must_use]
    pub fn peer(&self) -> NodeId {
        self.peer
    }

    /// Why the last transfer failed. `None` unless in the error state.
    #[must_use]
    pub fn fault(&self) -> Option<Fault> {
        self.fault
    }

    /// The injected flash backend.
    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// Mutable access to the injected flash backend.
    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    /// Return to idle without emitting anything, clearing any fault.
    pub fn reset(&mut self) {
        self.transfer.state = TransferState::Idle;
        self.fault = None;
    }

    /// Feed one inbound bus frame to the engine.
    ///
    /// While busy, frames from nodes other than the engaged master are
    /// discarded; otherwise the sender is latched as the peer so replies
    /// and the busy lock target it.
    pub fn handle_frame(&mut self, header: &BusHeader, payload: &[u8]) {
        if self.is_busy() && header.sender != self.peer {
            tracing::trace!(
                sender = %header.sender,
                peer = %self.peer,
                "dropping frame from non-engaged master"
            );
            return;
        }

        self.peer = header.sender;

        match Frame::parse(payload) {
            Ok(Frame::Command(cmd)) => self.on_command(cmd),
            Ok(Frame::Data(data)) => self.on_data(data),
            Err(err) => tracing::trace!(%err, "ignoring unparseable frame"),
        }
    }

    fn on_command(&mut self, cmd: &CommandFrame) {
        let Some(command) = cmd.command() else {
            tracing::trace!(raw = cmd.command_raw(), "ignoring unknown command byte");
            return;
        };

        match command {
            // A master announces a host-to-device transfer. Accepting it
            // arms the region; the ACK tells the master payload may flow.
            Command::Upload => {
                if self.transfer.state() != TransferState::Idle {
                    tracing::trace!(state = ?self.transfer.state(), "ignoring UPLOAD while not idle");
                    return;
                }

                self.transfer.arm(cmd.address(), cmd.length());
                tracing::debug!(
                    own = %self.own_id,
                    master = %self.peer,
                    addr = format_args!("{:#x}", cmd.address()),
                    len = cmd.length(),
                    "upload accepted"
                );
                self.send_ack(cmd.address());
                self.transfer.state = TransferState::Uploading;
            },

            // One block out per DOWNLOAD command; the slave keeps no state
            // between blocks, the master's next command drives the next
            // block.
            Command::Download => {
                if self.transfer.state() != TransferState::Idle {
                    tracing::trace!(state = ?self.transfer.state(), "ignoring DOWNLOAD while not idle");
                    return;
                }

                self.transfer.arm(cmd.address(), cmd.length());
                wire::send_data_block(&self.transfer, &mut self.flash, &mut self.link, self.peer);
            },

            Command::Execute => {
                if self.transfer.state() != TransferState::Idle {
                    tracing::trace!(state = ?self.transfer.state(), "ignoring EXECUTE while not idle");
                    return;
                }

                tracing::debug!(addr = format_args!("{:#x}", cmd.address()), "executing image");
                // The ACK must be on the wire before control jumps away; on
                // real hardware exec does not return.
                self.send_ack(cmd.address());
                self.flash.exec();
            },

            Command::Abort => {
                tracing::debug!(master = %self.peer, "transfer aborted by master");
                self.send_ack(cmd.address());
                self.transfer.state = TransferState::Idle;
                self.fault = None;
            },

            Command::Ack => {},
        }
    }

    fn on_data(&mut self, data: &DataFrame) {
        if self.transfer.state() != TransferState::Uploading {
            tracing::trace!(state = ?self.transfer.state(), "ignoring data block");
            return;
        }

        let expected = self.transfer.expected_addr();
        let received = data.address();

        // A block behind the cursor was already written; the original ACK
        // was lost or the bus duplicated the frame. Re-ACK, don't rewrite.
        if received < expected {
            tracing::trace!(
                received = format_args!("{received:#x}"),
                expected = format_args!("{expected:#x}"),
                "re-acknowledging duplicate block"
            );
            self.send_ack(received);
            return;
        }

        // A block ahead of the cursor means payload was lost.
        if received > expected {
            self.fail(Fault::AddressGap { expected, received });
            return;
        }

        let n = self.transfer.chunk_len();
        self.flash.write(expected, &data.payload()[..n]);
        self.transfer.advance(n as u32);

        if self.transfer.offset() >= self.transfer.length() {
            tracing::debug!(len = self.transfer.length(), "upload complete");
            self.transfer.state = TransferState::Idle;
        }

        self.send_ack(received);
    }

    /// ACK carries the acked address and the bytes still outstanding; the
    /// master currently ignores both fields but they are populated for
    /// diagnostics.
    fn send_ack(&mut self, address: u32) {
        wire::send_command(
            &mut self.link,
            self.peer,
            Command::Ack,
            address,
            self.transfer.remaining(),
        );
    }

    fn fail(&mut self, fault: Fault) {
        tracing::warn!(%fault, "transfer failed");
        self.fault = Some(fault);
        self.transfer.state = TransferState::Error;
    }
}
