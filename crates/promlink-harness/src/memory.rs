//! Memory-backed storage fixtures.

use promlink_core::{Execute, Storage};

/// Host-side image fixture: a sequential source plus a capture sink.
///
/// Mirrors how the CLI wires an open file into the master: reads drain the
/// source in order (the device address is informational), writes append to
/// the sink. Reads past the end come up short, which is the truncated-image
/// signal the master reacts to.
#[derive(Debug, Clone, Default)]
pub struct MemImage {
    source: Vec<u8>,
    cursor: usize,
    sink: Vec<u8>,
}

impl MemImage {
    /// Image that reads the given bytes.
    #[must_use]
    pub fn from_bytes(source: impl Into<Vec<u8>>) -> Self {
        Self { source: source.into(), cursor: 0, sink: Vec::new() }
    }

    /// Image with nothing to read (download sink only).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Bytes the source was built from.
    #[must_use]
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// Everything written so far.
    #[must_use]
    pub fn sink(&self) -> &[u8] {
        &self.sink
    }

    /// Reset the read cursor to the start of the source.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

impl Storage for MemImage {
    fn read(&mut self, _addr: u32, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.source.len() - self.cursor);
        buf[..n].copy_from_slice(&self.source[self.cursor..self.cursor + n]);
        self.cursor += n;
        n
    }

    fn write(&mut self, _addr: u32, buf: &[u8]) {
        self.sink.extend_from_slice(buf);
    }
}

/// Device-side flash fixture: a flat region at a base address.
///
/// Erased cells read as `0xFF`. Accesses outside the region are clamped and
/// logged rather than honoured, and out-of-range reads come up short, which
/// is what a real region boundary produces.
#[derive(Debug, Clone)]
pub struct MemFlash {
    base: u32,
    cells: Vec<u8>,
    exec_requests: usize,
}

impl MemFlash {
    /// Erased flash region of `size` bytes starting at `base`.
    #[must_use]
    pub fn new(base: u32, size: usize) -> Self {
        Self { base, cells: vec![0xFF; size], exec_requests: 0 }
    }

    /// Flash region pre-programmed with the given contents.
    #[must_use]
    pub fn with_contents(base: u32, contents: impl Into<Vec<u8>>) -> Self {
        Self { base, cells: contents.into(), exec_requests: 0 }
    }

    /// Base address of the region.
    #[must_use]
    pub fn base(&self) -> u32 {
        self.base
    }

    /// The whole region.
    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.cells
    }

    /// How many times the execute hook fired.
    #[must_use]
    pub fn exec_requests(&self) -> usize {
        self.exec_requests
    }

    fn region_offset(&self, addr: u32) -> Option<usize> {
        let offset = addr.checked_sub(self.base)? as usize;
        (offset <= self.cells.len()).then_some(offset)
    }
}

impl Storage for MemFlash {
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> usize {
        let Some(offset) = self.region_offset(addr) else {
            tracing::warn!(addr = format_args!("{addr:#x}"), "read outside flash region");
            return 0;
        };

        let n = buf.len().min(self.cells.len() - offset);
        buf[..n].copy_from_slice(&self.cells[offset..offset + n]);
        n
    }

    fn write(&mut self, addr: u32, buf: &[u8]) {
        let Some(offset) = self.region_offset(addr) else {
            tracing::warn!(addr = format_args!("{addr:#x}"), "write outside flash region");
            return;
        };

        let n = buf.len().min(self.cells.len() - offset);
        if n < buf.len() {
            tracing::warn!(
                addr = format_args!("{addr:#x}"),
                dropped = buf.len() - n,
                "write clipped at flash region end"
            );
        }
        self.cells[offset..offset + n].copy_from_slice(&buf[..n]);
    }
}

impl Execute for MemFlash {
    fn exec(&mut self) {
        self.exec_requests += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_reads_sequentially_and_comes_up_short() {
        let mut image = MemImage::from_bytes(vec![1, 2, 3, 4, 5]);
        let mut buf = [0u8; 4];

        assert_eq!(image.read(0x1000, &mut buf), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(image.read(0x1004, &mut buf), 1);
        assert_eq!(buf[0], 5);
        assert_eq!(image.read(0x1005, &mut buf), 0);

        image.rewind();
        assert_eq!(image.read(0x1000, &mut buf), 4);
    }

    #[test]
    fn flash_is_addressed_and_clamped() {
        let mut flash = MemFlash::new(0x2000, 16);
        flash.write(0x2008, &[0xAB; 4]);

        let mut buf = [0u8; 16];
        assert_eq!(flash.read(0x2008, &mut buf[..4]), 4);
        assert_eq!(&buf[..4], &[0xAB; 4]);

        // Reads straddling the region end come up short.
        assert_eq!(flash.read(0x200C, &mut buf), 4);
        // Accesses outside the region produce nothing.
        assert_eq!(flash.read(0x1FFF, &mut buf), 0);
        assert_eq!(flash.read(0x2020, &mut buf), 0);
    }

    #[test]
    fn exec_hook_counts() {
        let mut flash = MemFlash::new(0, 4);
        flash.exec();
        flash.exec();
        assert_eq!(flash.exec_requests(), 2);
    }
}
