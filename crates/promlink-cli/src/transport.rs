//! UDP datagram transport to the bus.
//!
//! One datagram carries one bus frame behind a two-byte envelope
//! `[sender, receiver]`. Datagram boundaries give the framing for free and
//! delivery is best-effort, which is exactly the link the protocol is
//! written for; a bus gateway on the far side unwraps the envelope onto the
//! real device bus.

use std::{
    io::ErrorKind,
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
    time::Duration,
};

use anyhow::Context;
use bytes::{BufMut, BytesMut};
use promlink_core::BusSender;
use promlink_proto::{BusHeader, NodeId};

/// Largest datagram we accept: envelope plus a generously padded frame.
const MAX_DATAGRAM: usize = 512;

/// Sending half of the UDP transport, injected into the master.
#[derive(Debug)]
pub struct UdpTx {
    socket: UdpSocket,
    own_id: NodeId,
}

/// Receiving half of the UDP transport, polled by the drive loop.
#[derive(Debug)]
pub struct UdpRx {
    socket: UdpSocket,
    own_id: NodeId,
}

/// Connect to the bus gateway named by `uri` (`udp://host:port`).
///
/// The local socket binds ephemerally; the gateway replies to the datagram
/// source address.
pub fn open(uri: &str, own_id: NodeId) -> anyhow::Result<(UdpTx, UdpRx)> {
    let peer = parse_uri(uri)?;

    let socket = UdpSocket::bind(("0.0.0.0", 0))
        .with_context(|| format!("binding local socket for {uri}"))?;
    socket.connect(peer).with_context(|| format!("connecting to {peer}"))?;

    let rx_socket = socket.try_clone().context("cloning transport socket")?;
    tracing::debug!(%peer, local = ?socket.local_addr().ok(), "transport up");

    Ok((UdpTx { socket, own_id }, UdpRx { socket: rx_socket, own_id }))
}

fn parse_uri(uri: &str) -> anyhow::Result<SocketAddr> {
    let rest = uri
        .strip_prefix("udp://")
        .with_context(|| format!("unsupported URI '{uri}': only udp://host:port is available"))?;

    rest.to_socket_addrs()
        .with_context(|| format!("resolving '{rest}'"))?
        .next()
        .with_context(|| format!("'{rest}' resolves to no address"))
}

impl BusSender for UdpTx {
    fn send(&mut self, dest: NodeId, frame: &[u8]) {
        let mut datagram = BytesMut::with_capacity(2 + frame.len());
        datagram.put_u8(self.own_id.0);
        datagram.put_u8(dest.0);
        datagram.put_slice(frame);

        // Best-effort: a lost frame surfaces as a missing ACK, not here.
        if let Err(err) = self.socket.send(&datagram) {
            tracing::warn!(%err, %dest, "dropping outbound frame");
        }
    }
}

impl UdpRx {
    /// Wait up to `timeout` for one frame addressed to this node (or
    /// broadcast). `None` means nothing usable arrived in time.
    pub fn poll(&mut self, timeout: Duration) -> anyhow::Result<Option<(BusHeader, Vec<u8>)>> {
        self.socket.set_read_timeout(Some(timeout)).context("arming receive timeout")?;

        let mut buf = [0u8; MAX_DATAGRAM];
        match self.socket.recv(&mut buf) {
            Ok(n) if n >= 2 => {
                let header = BusHeader { sender: NodeId(buf[0]), receiver: NodeId(buf[1]) };
                if header.receiver != self.own_id && !header.receiver.is_broadcast() {
                    tracing::trace!(receiver = %header.receiver, "datagram for another node");
                    return Ok(None);
                }
                Ok(Some((header, buf[2..n].to_vec())))
            },
            Ok(n) => {
                tracing::trace!(n, "runt datagram");
                Ok(None)
            },
            Err(err)
                if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
            {
                Ok(None)
            },
            Err(err) => Err(err).context("receiving from transport"),
        }
    }
}

#[cfg(test)]
mod tests {
    use promlink_proto::{Command, CommandFrame};

    use super::*;

    #[test]
    fn rejects_foreign_uri_schemes() {
        assert!(parse_uri("serial:///dev/ttyUSB0").is_err());
        assert!(parse_uri("127.0.0.1:4000").is_err());
        assert!(parse_uri("udp://127.0.0.1:4000").is_ok());
    }

    #[test]
    fn frames_round_trip_through_the_envelope() {
        let gateway = UdpSocket::bind("127.0.0.1:0").unwrap();
        let uri = format!("udp://{}", gateway.local_addr().unwrap());

        let (mut tx, mut rx) = open(&uri, NodeId(0x01)).unwrap();

        // Host -> gateway: envelope carries [sender, receiver] + frame.
        let cmd = CommandFrame::new(Command::Upload, 0x1000, 64);
        tx.send(NodeId(0x21), &cmd.to_bytes());

        let mut buf = [0u8; MAX_DATAGRAM];
        let (n, host_addr) = gateway.recv_from(&mut buf).unwrap();
        assert_eq!(n, 2 + CommandFrame::SIZE);
        assert_eq!(&buf[..2], &[0x01, 0x21]);

        // Gateway -> host: reply lands in poll with the envelope stripped.
        let mut reply = vec![0x21, 0x01];
        reply.extend_from_slice(&CommandFrame::new(Command::Ack, 0x1000, 64).to_bytes());
        gateway.send_to(&reply, host_addr).unwrap();

        let (header, payload) = rx
            .poll(Duration::from_secs(1))
            .unwrap()
            .expect("reply should arrive");
        assert_eq!(header.sender, NodeId(0x21));
        assert_eq!(header.receiver, NodeId(0x01));
        let parsed = CommandFrame::from_bytes(&payload).unwrap();
        assert_eq!(parsed.command(), Some(Command::Ack));
    }

    #[test]
    fn datagrams_for_other_nodes_are_filtered() {
        let gateway = UdpSocket::bind("127.0.0.1:0").unwrap();
        let uri = format!("udp://{}", gateway.local_addr().unwrap());

        let (mut tx, mut rx) = open(&uri, NodeId(0x01)).unwrap();
        tx.send(NodeId(0x21), &[0u8; 4]); // teach the gateway our address
        let mut buf = [0u8; MAX_DATAGRAM];
        let (_, host_addr) = gateway.recv_from(&mut buf).unwrap();

        gateway.send_to(&[0x21, 0x55, 0x00], host_addr).unwrap();
        assert!(rx.poll(Duration::from_millis(200)).unwrap().is_none());
    }
}
