//! Master and slave engines for in-system programming over a packet bus.
//!
//! A master drives one operation against one slave: **upload** (host image
//! into device memory), **download** (device memory into a host sink),
//! **verify** (bit-compare device memory against a host image), and
//! **execute** (jump into a programmed image). The payload moves in
//! fixed-size blocks; the slave acknowledges every accepted command and
//! block, and exactly one master owns a slave while a transfer is running.
//!
//! # Architecture
//!
//! Both engines are synchronous state machines driven by inbound frame
//! delivery ([`Master::handle_frame`] / [`Slave::handle_frame`]) and by user
//! calls on the master. They never block and never schedule timers; a stuck
//! transfer is detected by the embedding (wall-clock budget on `is_busy()`)
//! and remediated with [`Master::abort`].
//!
//! I/O is injected as capabilities at construction: [`Storage`] supplies
//! and consumes image/flash bytes, [`Execute`] jumps into a programmed
//! image, and [`BusSender`] transmits encoded frames. The engines never
//! allocate per-frame and never interpret the backends beyond these traits.
//!
//! # Components
//!
//! - [`Master`]: issues commands, paces data blocks, verifies echoes
//! - [`Slave`]: accepts one master at a time, mutates/serves device memory
//! - [`Transfer`]: the substrate both engines share (state, region, cursor)
//! - [`Fault`]: the recorded reason a transfer ended in `Error`

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod fault;
mod io;
mod link;
mod master;
mod slave;
mod transfer;
mod wire;

pub use fault::Fault;
pub use io::{Execute, Storage};
pub use link::BusSender;
pub use master::Master;
pub use promlink_proto::{BLOCK, BusHeader, NodeId};
pub use slave::Slave;
pub use transfer::{Transfer, TransferState};
