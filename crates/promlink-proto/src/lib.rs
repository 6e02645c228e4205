//! Wire schema for the promlink in-system programming protocol.
//!
//! Two fixed-layout frame kinds travel over the device bus, tagged by a
//! one-byte representation id: [`CommandFrame`] carries the command
//! vocabulary (upload, download, execute, abort, ack) and [`DataFrame`]
//! carries one payload block of [`BLOCK`] bytes. Both are
//! `#[repr(C, packed)]` structs with little-endian integer fields, so a
//! frame is sent and parsed as an opaque byte blob without a serialization
//! step.
//!
//! The bus envelope itself (addressing, checksums, escaping) belongs to the
//! bus driver; this crate only defines the [`NodeId`]/[`BusHeader`] view the
//! engines need and the payload layouts both ends must agree on.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod command;
mod data;
mod errors;
mod frame;
mod node;

pub use command::{Command, CommandFrame};
pub use data::{BLOCK, DataFrame};
pub use errors::{Result, WireError};
pub use frame::{COMMAND_REPR_ID, DATA_REPR_ID, Frame};
pub use node::{BusHeader, NodeId};
