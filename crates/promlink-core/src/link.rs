//! Outbound bus capability.

use promlink_proto::NodeId;

/// Best-effort transmission of one encoded frame to one bus node.
///
/// Injected into an engine at construction; the engine encodes frames to
/// fixed-size byte blobs and hands them over. Delivery is not confirmed at
/// this layer: the protocol's acknowledgements are the only feedback.
pub trait BusSender {
    /// Transmit `frame` to `dest`.
    fn send(&mut self, dest: NodeId, frame: &[u8]);
}
