//! I/O adapter contract.
//!
//! The same two-method contract serves both ends of the bus: on the master
//! it reaches image files (or buffers) on the host, on the slave it reaches
//! the device's PROM/flash. `addr` is the device address of the first byte
//! touched, so addressed backends can seek while sequential backends (an
//! open file already positioned at the image start) may ignore it.

/// Byte source/sink backing one side of a transfer.
pub trait Storage {
    /// Fill `buf` starting at device address `addr`; return the count
    /// actually produced.
    ///
    /// May produce fewer bytes than requested; zero signals exhaustion.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> usize;

    /// Consume all of `buf` at device address `addr`.
    ///
    /// There is no back-channel for partial writes: an implementation that
    /// cannot take every byte must abort the process.
    fn write(&mut self, addr: u32, buf: &[u8]);
}

/// Jump into a programmed image (slave backends only).
pub trait Execute {
    /// Transfer control to the image, as if the device had been reset.
    ///
    /// On real hardware this does not return. Stub implementations for
    /// testing may return, in which case the engine simply keeps running.
    fn exec(&mut self);
}
