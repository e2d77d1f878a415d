// crates/core/src/reader.rs
// Fast session-file reads with memory-mapped I/O and SIMD-accelerated line splitting.

use std::ops::Deref;
use std::path::Path;

use crate::error::ParseError;

/// Files below this size are read into memory instead of mapped.
const MMAP_THRESHOLD: u64 = 64 * 1024;

/// Contents of a session file, mapped or owned.
pub enum FileBytes {
    Mapped(memmap2::Mmap),
    Owned(Vec<u8>),
}

impl Deref for FileBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Mapped(map) => map,
            Self::Owned(buf) => buf,
        }
    }
}

/// Open `path` for reading, memory-mapped when that pays off.
///
/// A file that vanished since enumeration comes back as
/// [`ParseError::NotFound`]; callers treat that as a skip, not a failure.
pub fn map_file(path: &Path) -> Result<FileBytes, ParseError> {
    let file = std::fs::File::open(path).map_err(|e| ParseError::io(path, e))?;
    let len = file.metadata().map_err(|e| ParseError::io(path, e))?.len();

    if len == 0 {
        return Ok(FileBytes::Owned(Vec::new()));
    }

    if len < MMAP_THRESHOLD {
        return std::fs::read(path)
            .map(FileBytes::Owned)
            .map_err(|e| ParseError::io(path, e));
    }

    // SAFETY: the mapping is read-only and dropped once the file is summarized.
    // Session logs are append-only, so the mapped prefix never shrinks under us.
    match unsafe { memmap2::Mmap::map(&file) } {
        Ok(map) => Ok(FileBytes::Mapped(map)),
        Err(_) => std::fs::read(path)
            .map(FileBytes::Owned)
            .map_err(|e| ParseError::io(path, e)),
    }
}

/// Split data into lines using SIMD-accelerated newline search.
/// A trailing `\r` is stripped from each line.
pub fn split_lines(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut start = 0;
    let mut positions = memchr::memchr_iter(b'\n', data).chain(std::iter::once(data.len()));

    std::iter::from_fn(move || {
        if start > data.len() {
            return None;
        }
        positions.next().map(|end| {
            let line = &data[start..end];
            start = end + 1;
            line.strip_suffix(b"\r").unwrap_or(line)
        })
    })
}

/// Lines with at least one non-whitespace byte.
pub fn non_empty_lines(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    split_lines(data).filter(|line| !is_blank(line))
}

pub fn is_blank(line: &[u8]) -> bool {
    line.iter().all(|b| b.is_ascii_whitespace())
}
