//! Deterministic simulation harness for promlink testing.
//!
//! The engines are synchronous, so the harness is too: [`SimBus`] is a
//! single FIFO of datagrams shared by every port, [`run_exchange`] pumps it
//! until traffic stops, and the memory fixtures ([`MemImage`],
//! [`MemFlash`]) stand in for host files and device flash. Everything is
//! single-threaded with no clocks, sockets, or randomness involved, so
//! scenario and property tests replay exactly.
//!
//! Frames can also be [injected](SimBus::inject) with a forged source
//! address, which is how loss, duplication, and interference scenarios are
//! built.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod bus;
mod driver;
mod memory;

pub use bus::{Datagram, SimBus, SimPort};
pub use driver::{SimMaster, SimSlave, run_exchange};
pub use memory::{MemFlash, MemImage};
