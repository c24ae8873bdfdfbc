//! Write-once output for index files.
//!
//! Data goes to `<path>.tmp` first and is renamed into place by
//! [`FileWriter::commit`], so readers never observe a half written index.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use varint_rs::VarintWriter;

use super::FileOffset;
use crate::error::{MapscoutError, Result};

pub struct FileWriter {
    path: PathBuf,
    temp_path: PathBuf,
    writer: BufWriter<File>,
    position: FileOffset,
}

impl FileWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let temp_path = temp_path(&path);

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;

        Ok(Self {
            path,
            temp_path,
            writer: BufWriter::new(file),
            position: 0,
        })
    }

    /// Final location of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn position(&self) -> FileOffset {
        self.position
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.position += data.len() as u64;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_all(&[value])
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(value as u8)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.write_u64(value.to_bits())
    }

    pub fn write_file_offset(&mut self, offset: FileOffset) -> Result<()> {
        self.write_u64(offset)
    }

    /// Write `value` as a little endian integer of `bytes` width (1..=8).
    pub fn write_sized_offset(&mut self, value: u64, bytes: u8) -> Result<()> {
        if !(1..=8).contains(&bytes) || (bytes < 8 && value >> (bytes as u32 * 8) != 0) {
            return Err(MapscoutError::InvalidInput(format!(
                "Value {} does not fit into {} bytes",
                value, bytes
            )));
        }
        let buf = value.to_le_bytes();
        self.write_all(&buf[..bytes as usize])
    }

    pub fn write_varint_u32(&mut self, value: u32) -> Result<()> {
        let mut buf = Vec::with_capacity(5);
        buf.write_u32_varint(value)?;
        self.write_all(&buf)
    }

    pub fn write_varint_u64(&mut self, value: u64) -> Result<()> {
        let mut buf = Vec::with_capacity(10);
        buf.write_u64_varint(value)?;
        self.write_all(&buf)
    }

    pub fn write_magic(&mut self, magic: &[u8], version: u8) -> Result<()> {
        self.write_all(magic)?;
        self.write_u8(version)
    }

    /// Overwrite the 8 byte offset at `at` and return to the end of the file.
    pub fn patch_file_offset(&mut self, at: FileOffset, value: FileOffset) -> Result<()> {
        if at + 8 > self.position {
            return Err(MapscoutError::InvalidInput(format!(
                "Cannot patch offset at {} beyond written data ({})",
                at, self.position
            )));
        }
        self.writer.seek(SeekFrom::Start(at))?;
        self.writer.write_all(&value.to_le_bytes())?;
        self.writer.seek(SeekFrom::Start(self.position))?;
        Ok(())
    }

    /// Flush, sync and move the file to its final location.
    pub fn commit(self) -> Result<()> {
        let FileWriter {
            path,
            temp_path,
            mut writer,
            position,
        } = self;

        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&temp_path, &path)?;
        sync_parent_dir(&path)?;

        log::debug!("Wrote '{}' ({} bytes)", path.display(), position);
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut temp = path.to_path_buf();
    if let Some(name) = temp.file_name() {
        let mut new_name = name.to_string_lossy().into_owned();
        new_name.push_str(".tmp");
        temp.set_file_name(new_name);
    }
    temp
}

fn sync_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        let dir = File::open(parent)?;
        dir.sync_all()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::FileScanner;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_scan() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.idx");

        let mut writer = FileWriter::create(&path).unwrap();
        writer.write_magic(b"TESTFILE", 1).unwrap();
        let patch_at = writer.position();
        writer.write_file_offset(0).unwrap();
        writer.write_varint_u64(1_000_000).unwrap();
        writer.write_sized_offset(0x0102, 2).unwrap();
        writer.write_u16(7).unwrap();
        let end = writer.position();
        writer.patch_file_offset(patch_at, end).unwrap();
        assert!(!path.exists());
        writer.commit().unwrap();

        assert!(path.exists());
        assert!(!dir.path().join("sample.idx.tmp").exists());

        let scanner = FileScanner::open(&path, false).unwrap();
        assert_eq!(scanner.size(), end);
        let mut guard = scanner.lock();
        guard.read_magic(b"TESTFILE", 1).unwrap();
        assert_eq!(guard.read_file_offset().unwrap(), end);
        assert_eq!(guard.read_varint_u64().unwrap(), 1_000_000);
        assert_eq!(guard.read_sized_offset(2).unwrap(), 0x0102);
        assert_eq!(guard.read_u16().unwrap(), 7);
    }

    #[test]
    fn test_sized_offset_overflow() {
        let dir = TempDir::new().unwrap();
        let mut writer = FileWriter::create(dir.path().join("x.idx")).unwrap();
        assert!(writer.write_sized_offset(256, 1).is_err());
        assert!(writer.write_sized_offset(255, 1).is_ok());
        assert!(writer.write_sized_offset(u64::MAX, 8).is_ok());
    }

    #[test]
    fn test_patch_beyond_end_rejected() {
        let dir = TempDir::new().unwrap();
        let mut writer = FileWriter::create(dir.path().join("x.idx")).unwrap();
        writer.write_u32(0).unwrap();
        assert!(writer.patch_file_offset(0, 1).is_err());
    }
}
