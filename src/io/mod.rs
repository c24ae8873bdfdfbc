//! Random-access binary I/O for the index files.
//!
//! Fixed-width values are little endian. Variable-length integers use the
//! LEB128 encoding of `varint-rs`.

mod scanner;
mod writer;

pub use scanner::{FileScanner, ScannerGuard};
pub use writer::FileWriter;

/// A byte position inside a data or index file.
pub type FileOffset = u64;

/// Size of a fixed-width file offset on disk.
pub const FILE_OFFSET_BYTES: u64 = 8;

/// Bytes needed to store `value` as an unsigned little endian integer, at least one.
pub fn bytes_needed(value: u64) -> u8 {
    let bits = 64 - value.leading_zeros();
    bits.div_ceil(8).max(1) as u8
}
