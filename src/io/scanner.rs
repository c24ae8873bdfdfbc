//! Shared random-access reader over one index file.
//!
//! A scanner has exactly one cursor. Readers that share a scanner take the
//! lock for one positioned read sequence (seek plus reads) and release it
//! afterwards, so concurrent queries interleave at that granularity.

use parking_lot::{Mutex, MutexGuard};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use varint_rs::VarintReader;

#[cfg(feature = "mmap")]
use memmap2::Mmap;

use super::FileOffset;
use crate::error::{MapscoutError, Result};

enum Source {
    #[cfg(feature = "mmap")]
    Mapped(Cursor<Mmap>),
    Buffered(BufReader<File>),
    #[allow(dead_code)]
    Memory(Cursor<Vec<u8>>),
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            #[cfg(feature = "mmap")]
            Source::Mapped(cursor) => Read::read(cursor, buf),
            Source::Buffered(reader) => Read::read(reader, buf),
            Source::Memory(cursor) => Read::read(cursor, buf),
        }
    }
}

impl Seek for Source {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        match self {
            #[cfg(feature = "mmap")]
            Source::Mapped(cursor) => cursor.seek(pos),
            Source::Buffered(reader) => reader.seek(pos),
            Source::Memory(cursor) => cursor.seek(pos),
        }
    }
}

/// Read-only view of one file, memory mapped or buffered.
pub struct FileScanner {
    path: PathBuf,
    size: u64,
    memory_mapped: bool,
    source: Mutex<Source>,
}

impl FileScanner {
    /// Open `path`. With `memory_mapped` the whole file is mapped, otherwise
    /// reads go through a `BufReader`. Without the `mmap` feature mapping
    /// silently falls back to buffered access.
    pub fn open<P: AsRef<Path>>(path: P, memory_mapped: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let size = file.metadata()?.len();

        let (source, memory_mapped) = Self::make_source(file, memory_mapped)?;

        log::debug!(
            "Opened '{}' ({} bytes, {})",
            path.display(),
            size,
            if memory_mapped { "mapped" } else { "buffered" }
        );

        Ok(Self {
            path,
            size,
            memory_mapped,
            source: Mutex::new(source),
        })
    }

    #[cfg(feature = "mmap")]
    fn make_source(file: File, memory_mapped: bool) -> Result<(Source, bool)> {
        if memory_mapped {
            // The index files are write-once; nothing truncates them while mapped.
            let map = unsafe { Mmap::map(&file) }?;
            return Ok((Source::Mapped(Cursor::new(map)), true));
        }
        Ok((Source::Buffered(BufReader::new(file)), false))
    }

    #[cfg(not(feature = "mmap"))]
    fn make_source(file: File, _memory_mapped: bool) -> Result<(Source, bool)> {
        Ok((Source::Buffered(BufReader::new(file)), false))
    }

    /// Scanner over an in-memory buffer, for tests.
    #[cfg(test)]
    pub(crate) fn from_bytes(name: &str, data: Vec<u8>) -> Self {
        Self {
            path: PathBuf::from(name),
            size: data.len() as u64,
            memory_mapped: false,
            source: Mutex::new(Source::Memory(Cursor::new(data))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_memory_mapped(&self) -> bool {
        self.memory_mapped
    }

    /// Take the cursor for one positioned read sequence.
    pub fn lock(&self) -> ScannerGuard<'_> {
        ScannerGuard {
            source: self.source.lock(),
            path: &self.path,
            size: self.size,
        }
    }
}

/// Exclusive access to a scanner's cursor.
pub struct ScannerGuard<'a> {
    source: MutexGuard<'a, Source>,
    path: &'a Path,
    size: u64,
}

impl ScannerGuard<'_> {
    pub fn path(&self) -> &Path {
        self.path
    }

    pub fn seek(&mut self, pos: FileOffset) -> Result<()> {
        self.source.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    pub fn position(&mut self) -> Result<FileOffset> {
        Ok(self.source.stream_position()?)
    }

    /// Bytes between the cursor and the end of the file.
    pub fn remaining(&mut self) -> Result<u64> {
        Ok(self.size.saturating_sub(self.position()?))
    }

    /// Read a varint element count and check that `count` elements of at
    /// least `min_entry_bytes` each still fit into the file.
    pub fn read_count(&mut self, min_entry_bytes: u64) -> Result<u32> {
        let pos = self.position()?;
        let count = self.read_varint_u32()?;
        let remaining = self.remaining()?;
        if count as u64 * min_entry_bytes.max(1) > remaining {
            return Err(MapscoutError::corrupt(
                self.path,
                pos,
                format!("a count of at most {} entries", remaining / min_entry_bytes.max(1)),
                count.to_string(),
            ));
        }
        Ok(count)
    }

    /// Read a varint delta and add it to `previous`.
    pub fn read_delta(&mut self, previous: u64) -> Result<u64> {
        let pos = self.position()?;
        let delta = self.read_varint_u64()?;
        previous.checked_add(delta).ok_or_else(|| {
            MapscoutError::corrupt(self.path, pos, "an offset delta within 64 bits", delta.to_string())
        })
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.source.read_exact(buf)?;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.source.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.source.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.source.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.source.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub fn read_file_offset(&mut self) -> Result<FileOffset> {
        self.read_u64()
    }

    /// Read an unsigned little endian value of `bytes` width (1..=8).
    pub fn read_sized_offset(&mut self, bytes: u8) -> Result<u64> {
        if !(1..=8).contains(&bytes) {
            return Err(MapscoutError::InvalidInput(format!(
                "Unsupported value width {}",
                bytes
            )));
        }
        let mut buf = [0u8; 8];
        self.source.read_exact(&mut buf[..bytes as usize])?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_varint_u32(&mut self) -> Result<u32> {
        Ok(self.source.read_u32_varint()?)
    }

    pub fn read_varint_u64(&mut self) -> Result<u64> {
        Ok(self.source.read_u64_varint()?)
    }

    /// Check the magic and version at the current position.
    pub fn read_magic(&mut self, magic: &[u8], version: u8) -> Result<()> {
        let mut buf = vec![0u8; magic.len()];
        self.source.read_exact(&mut buf)?;
        if buf != magic {
            return Err(MapscoutError::InvalidFormat(format!(
                "'{}' is not a {} file",
                self.path.display(),
                String::from_utf8_lossy(magic)
            )));
        }
        let found = self.read_u8()?;
        if found != version {
            return Err(MapscoutError::InvalidFormat(format!(
                "'{}' has version {}, expected {}",
                self.path.display(),
                found,
                version
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample_bytes() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"TESTFILE");
        data.push(3);
        data.extend_from_slice(&0x1234u16.to_le_bytes());
        data.extend_from_slice(&[0xAC, 0x02]); // varint 300
        data.extend_from_slice(&[0x01, 0x02, 0x03]);
        data
    }

    #[test]
    fn test_reads_in_both_modes() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&sample_bytes()).unwrap();
        temp.flush().unwrap();

        for mapped in [false, true] {
            let scanner = FileScanner::open(temp.path(), mapped).unwrap();
            assert_eq!(scanner.size(), 16);

            let mut guard = scanner.lock();
            guard.read_magic(b"TESTFILE", 3).unwrap();
            assert_eq!(guard.read_u16().unwrap(), 0x1234);
            assert_eq!(guard.read_varint_u32().unwrap(), 300);
            assert_eq!(guard.read_sized_offset(3).unwrap(), 0x030201);
            assert!(guard.read_u8().is_err());

            guard.seek(9).unwrap();
            assert_eq!(guard.read_u8().unwrap(), 0x34);
        }
    }

    #[test]
    fn test_header_mismatch() {
        let scanner = FileScanner::from_bytes("mem", sample_bytes());
        let mut guard = scanner.lock();
        assert!(matches!(
            guard.read_magic(b"OTHERFIL", 3),
            Err(MapscoutError::InvalidFormat(_))
        ));

        guard.seek(0).unwrap();
        assert!(guard.read_magic(b"TESTFILE", 4).is_err());
    }

    #[test]
    fn test_sized_width_checked() {
        let scanner = FileScanner::from_bytes("mem", vec![0u8; 16]);
        let mut guard = scanner.lock();
        assert!(guard.read_sized_offset(0).is_err());
        assert!(guard.read_sized_offset(9).is_err());
        assert_eq!(guard.read_sized_offset(8).unwrap(), 0);
    }

    #[test]
    fn test_open_missing_file() {
        assert!(matches!(
            FileScanner::open("/nonexistent/mapscout/file.idx", false),
            Err(MapscoutError::Io(_))
        ));
    }

    #[test]
    fn test_count_must_fit_into_file() {
        // varint 3 followed by 6 bytes
        let scanner = FileScanner::from_bytes("mem", vec![0x03, 1, 2, 3, 4, 5, 6]);
        let mut guard = scanner.lock();
        assert_eq!(guard.read_count(2).unwrap(), 3);

        guard.seek(0).unwrap();
        assert!(matches!(
            guard.read_count(4),
            Err(MapscoutError::CorruptIndex { offset: 0, .. })
        ));

        // u32::MAX entries in a 6 byte file
        let scanner = FileScanner::from_bytes("mem", vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F, 0x00]);
        assert!(matches!(
            scanner.lock().read_count(1),
            Err(MapscoutError::CorruptIndex { .. })
        ));
    }

    #[test]
    fn test_delta_overflow_is_corrupt() {
        let mut data = vec![0x05];
        data.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]);
        let scanner = FileScanner::from_bytes("mem", data);
        let mut guard = scanner.lock();

        assert_eq!(guard.read_delta(10).unwrap(), 15);
        assert!(matches!(
            guard.read_delta(15),
            Err(MapscoutError::CorruptIndex { offset: 1, .. })
        ));
    }
}
