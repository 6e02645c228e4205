//! Master engine.
//!
//! The master owns the transfer: it announces the operation, paces data
//! blocks against the slave's acknowledgements, and classifies every echo.
//! All outcomes are recorded as state; the embedding polls [`Master::is_busy`]
//! and inspects [`Master::state`]/[`Master::fault`] when the engine goes
//! quiet.

use promlink_proto::{BLOCK, BusHeader, Command, CommandFrame, DataFrame, Frame, NodeId};

use crate::{
    fault::Fault,
    io::Storage,
    link::BusSender,
    transfer::{Transfer, TransferState},
    wire,
};

/// Driving side of a programming session.
///
/// Generic over the image backend `I` (file, buffer) and the outbound bus
/// capability `L`. The engine is single-threaded: it is driven by the same
/// loop that polls the bus, and every call completes synchronously.
#[derive(Debug)]
pub struct Master<I, L> {
    own_id: NodeId,
    peer: NodeId,
    transfer: Transfer,
    image: I,
    link: L,
    fault: Option<Fault>,
}

impl<I: Storage, L: BusSender> Master<I, L> {
    /// Create an idle master engine.
    ///
    /// The peer starts as the broadcast sentinel; [`Master::set_target`]
    /// must select a slave before a transfer is started.
    pub fn new(own_id: NodeId, link: L, image: I) -> Self {
        Self {
            own_id,
            peer: NodeId::BROADCAST,
            transfer: Transfer::new(),
            image,
            link,
            fault: None,
        }
    }

    /// Record the slave and region for the upcoming operation.
    ///
    /// Ignored while a transfer is running.
    pub fn set_target(&mut self, peer: NodeId, start_addr: u32, length: u32) {
        if self.is_busy() {
            tracing::debug!(%peer, "set_target ignored: transfer in progress");
            return;
        }

        self.peer = peer;
        self.transfer.arm(start_addr, length);
    }

    /// Announce an upload of the armed region and wait for the slave's ACK.
    ///
    /// Ignored while busy. The slave's ACK signals the region is erased and
    /// payload may flow; see [`Master::handle_frame`].
    pub fn start_upload(&mut self) {
        if self.is_busy() {
            return;
        }

        tracing::debug!(
            own = %self.own_id,
            peer = %self.peer,
            addr = format_args!("{:#x}", self.transfer.start_addr()),
            len = self.transfer.length(),
            "starting upload"
        );
        self.fault = None;
        wire::send_command(
            &mut self.link,
            self.peer,
            Command::Upload,
            self.transfer.start_addr(),
            self.transfer.length(),
        );
        self.transfer.state = TransferState::Erasing;
    }

    /// Request the first block of the armed region from the slave.
    ///
    /// Ignored while busy. Each received block triggers the request for the
    /// next one until `length` bytes have been written to the image sink.
    pub fn start_download(&mut self) {
        if self.is_busy() {
            return;
        }

        tracing::debug!(
            own = %self.own_id,
            peer = %self.peer,
            addr = format_args!("{:#x}", self.transfer.start_addr()),
            len = self.transfer.length(),
            "starting download"
        );
        self.fault = None;
        self.request_block(self.transfer.start_addr());
        self.transfer.state = TransferState::Downloading;
    }

    /// Request device blocks and compare them against the local image.
    ///
    /// Ignored while busy. On the wire this is a download; the difference
    /// is that received blocks are compared instead of written. A mismatch
    /// leaves [`Master::offset`] at the first differing byte.
    pub fn start_verify(&mut self) {
        if self.is_busy() {
            return;
        }

        tracing::debug!(
            own = %self.own_id,
            peer = %self.peer,
            addr = format_args!("{:#x}", self.transfer.start_addr()),
            len = self.transfer.length(),
            "starting verify"
        );
        self.fault = None;
        self.request_block(self.transfer.start_addr());
        self.transfer.state = TransferState::Verifying;
    }

    /// Ask the slave to jump into its bootloader image.
    ///
    /// Identical on the wire to [`Master::execute_firmware`]: both emit
    /// EXECUTE for the armed region, and the device decides what lives at
    /// that address. No state change; fire-and-forget.
    pub fn execute_bootloader(&mut self) {
        self.send_execute();
    }

    /// Ask the slave to jump into its firmware image.
    ///
    /// See [`Master::execute_bootloader`]; the two differ only in which
    /// region the caller armed.
    pub fn execute_firmware(&mut self) {
        self.send_execute();
    }

    /// Cancel the current operation.
    ///
    /// Emits ABORT to the peer (returning it to idle regardless of what it
    /// was doing) and resets this engine to idle. Usable from any state;
    /// this is the remediation for a transfer the embedding has judged
    /// stuck.
    pub fn abort(&mut self) {
        tracing::debug!(peer = %self.peer, "aborting");
        wire::send_command(
            &mut self.link,
            self.peer,
            Command::Abort,
            self.transfer.start_addr(),
            self.transfer.length(),
        );
        self.transfer.state = TransferState::Idle;
        self.fault = None;
    }

    /// Return to idle without emitting anything, clearing any fault.
    pub fn reset(&mut self) {
        self.transfer.state = TransferState::Idle;
        self.fault = None;
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

    /// Bytes transferred so far; after a verify mismatch, the offset of the
    /// first differing byte.
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.transfer.offset()
    }

    /// Bytes the current transfer was armed for.
    #[must_use]
    pub fn length(&self) -> u32 {
        self.transfer.length()
    }

    /// Base address of the armed region.
    #[must_use]
    pub fn start_addr(&self) -> u32 {
        self.transfer.start_addr()
    }

    /// This node's address on the bus.
    #[must_use]
    pub fn own_id(&self) -> NodeId {
        self.own_id
    }

    /// The slave this master is targeting.
    #[must_use]
    pub fn peer(&self) -> NodeId {
        self.peer
    }

    /// Why the last transfer failed. `None` unless in the error state.
    #[must_use]
    pub fn fault(&self) -> Option<Fault> {
        self.fault
    }

    /// The injected image backend.
    pub fn image(&self) -> &I {
        &self.image
    }

    /// Mutable access to the injected image backend.
    pub fn image_mut(&mut self) -> &mut I {
        &mut self.image
    }

    /// Feed one inbound bus frame to the engine.
    ///
    /// Frames from nodes other than the configured peer are discarded, as
    /// are frames of foreign representations and commands the master has no
    /// use for; only ACK and DATA advance the state machine.
    pub fn handle_frame(&mut self, header: &BusHeader, payload: &[u8]) {
        if header.sender != self.peer {
            tracing::trace!(sender = %header.sender, peer = %self.peer, "dropping frame from non-peer");
            return;
        }

        match Frame::parse(payload) {
            Ok(Frame::Command(cmd)) => self.on_command(cmd),
            Ok(Frame::Data(data)) => self.on_data(data),
            Err(err) => tracing::trace!(%err, "ignoring unparseable frame"),
        }
    }

    fn on_command(&mut self, cmd: &CommandFrame) {
        match cmd.command() {
            Some(Command::Ack) => self.on_ack(),
            other => tracing::trace!(?other, "ignoring command on master"),
        }
    }

    /// ACK semantics depend on phase: the first ACK (Erasing) is permission
    /// to start sending payload, later ACKs (Uploading) confirm one block
    /// and trigger the next. The slave writes exactly BLOCK bytes per
    /// acknowledged block except at the final tail, so the cursor advances
    /// by a full block, clamped at `length`.
    fn on_ack(&mut self) {
        match self.transfer.state() {
            TransferState::Uploading => {
                self.transfer.advance(BLOCK as u32);
                self.pump_upload();
            },
            TransferState::Erasing => self.pump_upload(),
            state => tracing::trace!(?state, "ignoring ACK"),
        }
    }

    /// Attempt to send the next block and classify the outcome.
    ///
    /// Shared tail of both ACK arms: bytes produced means the upload is
    /// (still) rolling, a dry source with bytes outstanding is fatal, and a
    /// dry source at the end is completion.
    fn pump_upload(&mut self) {
        let produced =
            wire::send_data_block(&self.transfer, &mut self.image, &mut self.link, self.peer);

        if produced > 0 {
            self.transfer.state = TransferState::Uploading;
        } else if self.transfer.offset() < self.transfer.length() {
            self.fail(Fault::SourceExhausted {
                offset: self.transfer.offset(),
                length: self.transfer.length(),
            });
        } else {
            tracing::debug!(len = self.transfer.length(), "upload complete");
            self.transfer.state = TransferState::Idle;
        }
    }

    fn on_data(&mut self, data: &DataFrame) {
        match self.transfer.state() {
            TransferState::Downloading => self.on_download_block(data),
            TransferState::Verifying => self.on_verify_block(data),
            state => tracing::trace!(?state, "ignoring data block"),
        }
    }

    fn on_download_block(&mut self, data: &DataFrame) {
        let expected = self.transfer.expected_addr();
        if data.address() != expected {
            self.fail(Fault::AddressGap { expected, received: data.address() });
            return;
        }

        let n = self.transfer.chunk_len();
        self.image.write(expected, &data.payload()[..n]);
        self.transfer.advance(n as u32);

        if self.transfer.offset() >= self.transfer.length() {
            tracing::debug!(len = self.transfer.length(), "download complete");
            self.transfer.state = TransferState::Idle;
        } else {
            self.request_block(self.transfer.expected_addr());
        }
    }

    fn on_verify_block(&mut self, data: &DataFrame) {
        let expected = self.transfer.expected_addr();
        if data.address() != expected {
            self.fail(Fault::AddressGap { expected, received: data.address() });
            return;
        }

        let n = self.transfer.chunk_len();
        let mut local = [0u8; BLOCK];
        let produced = self.image.read(expected, &mut local[..n]);

        // The cursor advances per matched byte so a mismatch leaves it
        // pointing at the first differing index.
        for i in 0..produced {
            if data.payload()[i] != local[i] {
                self.transfer.advance(i as u32);
                self.fail(Fault::Mismatch { offset: self.transfer.offset() });
                return;
            }
        }
        self.transfer.advance(produced as u32);

        if self.transfer.offset() >= self.transfer.length() || produced < n {
            tracing::debug!(verified = self.transfer.offset(), "verify complete");
            self.transfer.state = TransferState::Idle;
        } else {
            self.request_block(self.transfer.expected_addr());
        }
    }

    /// Emit one DOWNLOAD request. The requested length is always a full
    /// block; at the tail the slave replies with a full block whose excess
    /// bytes are meaningless and ignored by the chunk arithmetic.
    fn request_block(&mut self, address: u32) {
        wire::send_command(&mut self.link, self.peer, Command::Download, address, BLOCK as u32);
    }

    fn send_execute(&mut self) {
        tracing::debug!(
            peer = %self.peer,
            addr = format_args!("{:#x}", self.transfer.start_addr()),
            "requesting execute"
        );
        wire::send_command(
            &mut self.link,
            self.peer,
            Command::Execute,
            self.transfer.start_addr(),
            self.transfer.length(),
        );
    }

    fn fail(&mut self, fault: Fault) {
        tracing::warn!(%fault, "transfer failed");
        self.fault = Some(fault);
        self.transfer.state = TransferState::Error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: NodeId = NodeId(0x01);
    const SLAVE: NodeId = NodeId(0x21);

    #[derive(Default)]
    struct RecordingLink {
        sent: Vec<(NodeId, Vec<u8>)>,
    }

    impl BusSender for RecordingLink {
        fn send(&mut self, dest: NodeId, frame: &[u8]) {
            self.sent.push((dest, frame.to_vec()));
        }
    }

    /// Sequential image backend: reads drain `source`, writes land in
    /// `written`.
    #[derive(Default)]
    struct VecImage {
        source: Vec<u8>,
        pos: usize,
        written: Vec<u8>,
    }

    impl VecImage {
        fn with_source(source: Vec<u8>) -> Self {
            Self { source, ..Self::default() }
        }
    }

    impl Storage for VecImage {
        fn read(&mut self, _addr: u32, buf: &mut [u8]) -> usize {
            let n = buf.len().min(self.source.len() - self.pos);
            buf[..n].copy_from_slice(&self.source[self.pos..self.pos + n]);
            self.pos += n;
            n
        }

        fn write(&mut self, _addr: u32, buf: &[u8]) {
            self.written.extend_from_slice(buf);
        }
    }

    fn armed_master(source: Vec<u8>, length: u32) -> Master<VecImage, RecordingLink> {
        let mut master = Master::new(MASTER, RecordingLink::default(), VecImage::with_source(source));
        master.set_target(SLAVE, 0x1000, length);
        master
    }

    fn ack_from_slave() -> (BusHeader, Vec<u8>) {
        let header = BusHeader { sender: SLAVE, receiver: MASTER };
        (header, CommandFrame::new(Command::Ack, 0x1000, 0).to_bytes().to_vec())
    }

    fn last_sent(master: &Master<VecImage, RecordingLink>) -> Frame<'_> {
        let (dest, bytes) = master.link.sent.last().expect("nothing was sent");
        assert_eq!(*dest, SLAVE);
        Frame::parse(bytes).expect("sent frame must parse")
    }

    #[test]
    fn start_upload_emits_upload_command() {
        let mut master = armed_master(vec![0xAB; 64], 64);
        master.start_upload();

        assert_eq!(master.state(), TransferState::Erasing);
        match last_sent(&master) {
            Frame::Command(cmd) => {
                assert_eq!(cmd.command(), Some(Command::Upload));
                assert_eq!(cmd.address(), 0x1000);
                assert_eq!(cmd.length(), 64);
            },
            Frame::Data(_) => panic!("expected a command frame"),
        }
    }

    #[test]
    fn empty_image_completes_on_first_ack() {
        let mut master = armed_master(Vec::new(), 0);
        master.start_upload();

        let (header, ack) = ack_from_slave();
        master.handle_frame(&header, &ack);

        assert_eq!(master.state(), TransferState::Idle);
        assert_eq!(master.offset(), 0);
        assert!(master.fault().is_none());
    }

    #[test]
    fn truncated_source_is_fatal() {
        // Armed for 128 bytes but the image holds only 64.
        let mut master = armed_master(vec![0x55; 64], 128);
        master.start_upload();

        let (header, ack) = ack_from_slave();
        master.handle_frame(&header, &ack); // first block flows
        assert_eq!(master.state(), TransferState::Uploading);

        master.handle_frame(&header, &ack); // source is dry, 64 outstanding
        assert_eq!(master.state(), TransferState::Error);
        assert_eq!(master.fault(), Some(Fault::SourceExhausted { offset: 64, length: 128 }));
    }

    #[test]
    fn set_target_refused_while_busy() {
        let mut master = armed_master(vec![0; 128], 128);
        master.start_upload();

        master.set_target(NodeId(0x33), 0x9000, 4);
        assert_eq!(master.peer(), SLAVE);
        assert_eq!(master.start_addr(), 0x1000);
        assert_eq!(master.length(), 128);
    }

    #[test]
    fn start_refused_while_busy() {
        let mut master = armed_master(vec![0; 128], 128);
        master.start_upload();
        let frames_before = master.link.sent.len();

        master.start_download();
        master.start_verify();
        assert_eq!(master.state(), TransferState::Erasing);
        assert_eq!(master.link.sent.len(), frames_before);
    }

    #[test]
    fn frames_from_non_peer_are_dropped() {
        let mut master = armed_master(vec![0xEE; 64], 64);
        master.start_upload();

        let intruder = BusHeader { sender: NodeId(0x7E), receiver: MASTER };
        let ack = CommandFrame::new(Command::Ack, 0x1000, 64).to_bytes();
        master.handle_frame(&intruder, &ack);

        assert_eq!(master.state(), TransferState::Erasing);
    }

    #[test]
    fn ack_outside_upload_phases_is_ignored() {
        let mut master = armed_master(vec![0; 64], 64);
        let (header, ack) = ack_from_slave();

        master.handle_frame(&header, &ack);
        assert_eq!(master.state(), TransferState::Idle);
        assert!(master.link.sent.is_empty());
    }

    #[test]
    fn download_address_mismatch_is_fatal() {
        let mut master = armed_master(Vec::new(), 256);
        master.start_download();

        let header = BusHeader { sender: SLAVE, receiver: MASTER };
        let stray = DataFrame::new(0x1040).to_bytes();
        master.handle_frame(&header, &stray);

        assert_eq!(master.state(), TransferState::Error);
        assert_eq!(
            master.fault(),
            Some(Fault::AddressGap { expected: 0x1000, received: 0x1040 })
        );
    }

    #[test]
    fn execute_variants_are_identical_on_the_wire() {
        let mut master = armed_master(Vec::new(), 512);
        master.execute_bootloader();
        master.execute_firmware();

        assert_eq!(master.link.sent.len(), 2);
        assert_eq!(master.link.sent[0], master.link.sent[1]);
        assert_eq!(master.state(), TransferState::Idle);
    }

    #[test]
    fn abort_recovers_from_error() {
        let mut master = armed_master(vec![0; 32], 128);
        master.start_upload();
        let (header, ack) = ack_from_slave();
        master.handle_frame(&header, &ack);
        master.handle_frame(&header, &ack);
        assert_eq!(master.state(), TransferState::Error);

        master.abort();
        assert_eq!(master.state(), TransferState::Idle);
        assert!(master.fault().is_none());
        match last_sent(&master) {
            Frame::Command(cmd) => assert_eq!(cmd.command(), Some(Command::Abort)),
            Frame::Data(_) => panic!("expected a command frame"),
        }
    }
}
