//! File-backed image storage for the master engine.

use std::{
    fs::File,
    io::{ErrorKind, Read, Write},
    path::Path,
};

use promlink_core::Storage;

/// An open image file wired into the master.
///
/// Reads are sequential from the current file position (the device address
/// is informational; transfers walk the file front to back), writes append
/// in arrival order. A failed write aborts the process: the engine has no
/// back-channel for partial writes and a torn download file must not look
/// like success.
#[derive(Debug)]
pub struct FileImage {
    file: File,
}

impl FileImage {
    /// Open an existing image for reading (upload, verify).
    pub fn open_source(path: &Path) -> std::io::Result<Self> {
        Ok(Self { file: File::open(path)? })
    }

    /// Create or truncate an image for writing (download).
    pub fn create_sink(path: &Path) -> std::io::Result<Self> {
        Ok(Self { file: File::create(path)? })
    }

    /// Size of the underlying file in bytes.
    pub fn len(&self) -> std::io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

impl Storage for FileImage {
    fn read(&mut self, _addr: u32, buf: &mut [u8]) -> usize {
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => {},
                Err(err) => {
                    tracing::error!(%err, "image read failed");
                    break;
                },
            }
        }
        filled
    }

    fn write(&mut self, _addr: u32, buf: &[u8]) {
        if let Err(err) = self.file.write_all(buf) {
            tracing::error!(%err, "image write failed, aborting");
            std::process::exit(1);
        }
    }
}

/// Image backend for operations that move no payload (execute).
#[derive(Debug, Default)]
pub struct NoImage;

impl Storage for NoImage {
    fn read(&mut self, _addr: u32, _buf: &mut [u8]) -> usize {
        0
    }

    fn write(&mut self, _addr: u32, _buf: &[u8]) {}
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn source_reads_sequentially() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[1, 2, 3, 4, 5]).unwrap();

        let mut image = FileImage::open_source(tmp.path()).unwrap();
        assert_eq!(image.len().unwrap(), 5);

        let mut buf = [0u8; 4];
        assert_eq!(image.read(0x1000, &mut buf), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(image.read(0x1004, &mut buf), 1);
        assert_eq!(image.read(0x1005, &mut buf), 0);
    }

    #[test]
    fn sink_appends_in_order() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut image = FileImage::create_sink(tmp.path()).unwrap();

        image.write(0x2000, &[0xAA; 3]);
        image.write(0x2003, &[0xBB; 2]);
        drop(image);

        assert_eq!(std::fs::read(tmp.path()).unwrap(), vec![0xAA, 0xAA, 0xAA, 0xBB, 0xBB]);
    }
}
