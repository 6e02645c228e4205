//! Frame pump for one master/slave pair.

use promlink_core::{BusHeader, Master, Slave};

use crate::{
    bus::{Datagram, SimBus},
    memory::{MemFlash, MemImage},
};

/// Master engine wired to the simulated bus and memory image.
pub type SimMaster = Master<MemImage, crate::SimPort>;

/// Slave engine wired to the simulated bus and memory flash.
pub type SimSlave = Slave<MemFlash, crate::SimPort>;

/// Deliver in-flight frames until the bus drains or `budget` is spent.
///
/// Each step pops one datagram and hands it to every engine it is addressed
/// to (broadcast reaches both, nothing loops back to its source). Engines
/// usually answer within the same step, so a healthy transfer runs to
/// completion; the budget bounds runaway exchanges so a livelocked pair
/// fails a test instead of hanging it. Returns the number of frames
/// delivered.
pub fn run_exchange(
    bus: &SimBus,
    master: &mut SimMaster,
    slave: &mut SimSlave,
    budget: usize,
) -> usize {
    let mut steps = 0;

    while steps < budget {
        let Some(Datagram { source, dest, bytes }) = bus.pop() else {
            break;
        };
        steps += 1;

        let header = BusHeader { sender: source, receiver: dest };

        if source != master.own_id() && (dest == master.own_id() || dest.is_broadcast()) {
            master.handle_frame(&header, &bytes);
        }
        if source != slave.own_id() && (dest == slave.own_id() || dest.is_broadcast()) {
            slave.handle_frame(&header, &bytes);
        }
    }

    steps
}

#[cfg(test)]
mod tests {
    use promlink_core::NodeId;

    use super::*;

    #[test]
    fn budget_bounds_delivery() {
        let bus = SimBus::new();
        let master_id = NodeId(1);
        let slave_id = NodeId(2);

        let mut master = SimMaster::new(master_id, bus.port(master_id), MemImage::empty());
        let mut slave = SimSlave::new(slave_id, bus.port(slave_id), MemFlash::new(0, 16));

        for _ in 0..5 {
            bus.inject(Datagram { source: NodeId(9), dest: slave_id, bytes: vec![0] });
        }

        assert_eq!(run_exchange(&bus, &mut master, &mut slave, 3), 3);
        assert_eq!(bus.pending(), 2);
    }
}
