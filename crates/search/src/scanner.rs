// crates/search/src/scanner.rs
//! Chunked case-insensitive substring scan over one file.
//!
//! Memory stays bounded by the chunk size no matter how large the log is.
//! Matches that straddle two chunks are found through a carry of the last
//! `needle_chars - 1` whole chars. Counting chars rather than bytes matters
//! because lowercasing can shrink text (the Kelvin sign is 3 bytes, `k` is 1).

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use memchr::memmem;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::SearchError;

/// Bytes read per chunk.
pub const CHUNK_SIZE: usize = 128 * 1024;

/// Does `path` contain `term`, ignoring case?
///
/// Unreadable files and cancelled scans are simply "no match". An empty term
/// matches every readable file.
pub fn file_contains(path: &Path, term: &str, cancel: &CancellationToken) -> bool {
    match scan_file(path, term, cancel) {
        Ok(found) => found,
        Err(SearchError::Cancelled) => false,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "search skipped unreadable file");
            false
        }
    }
}

/// [`file_contains`] with the failure reason kept.
pub fn scan_file(path: &Path, term: &str, cancel: &CancellationToken) -> Result<bool, SearchError> {
    let file = File::open(path).map_err(|source| SearchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    scan_reader(file, term, cancel, CHUNK_SIZE).map_err(|e| match e {
        ScanError::Cancelled => SearchError::Cancelled,
        ScanError::Io(source) => SearchError::Io {
            path: path.to_path_buf(),
            source,
        },
    })
}

#[derive(Debug)]
pub enum ScanError {
    Cancelled,
    Io(io::Error),
}

/// Scan any reader in chunks of `chunk_size` bytes.
pub fn scan_reader<R: Read>(
    mut reader: R,
    term: &str,
    cancel: &CancellationToken,
    chunk_size: usize,
) -> Result<bool, ScanError> {
    let needle = term.to_lowercase();
    if needle.is_empty() {
        return Ok(true);
    }
    let finder = memmem::Finder::new(needle.as_bytes());
    // Every source char folds to at least one needle char.
    let carry_chars = needle.chars().count() - 1;

    let mut chunk = vec![0u8; chunk_size.max(1)];
    let mut carry: Vec<u8> = Vec::new();

    loop {
        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        let n = fill_chunk(&mut reader, &mut chunk).map_err(ScanError::Io)?;
        if n == 0 {
            return Ok(false);
        }

        let mut combined = std::mem::take(&mut carry);
        combined.extend_from_slice(&chunk[..n]);

        // A sequence cut at the very end is held back for the next chunk.
        let split = combined.len() - incomplete_tail_len(&combined);
        // Genuinely invalid bytes make this chunk non-matching.
        if let Ok(text) = std::str::from_utf8(&combined[..split]) {
            if contains_folded(&finder, text) {
                return Ok(true);
            }
        }

        let start = last_chars_start(&combined[..split], carry_chars);
        carry = combined[start..].to_vec();
    }
}

fn contains_folded(finder: &memmem::Finder<'_>, text: &str) -> bool {
    finder.find(text.to_lowercase().as_bytes()).is_some()
}

/// Read until `buf` is full or EOF. Short reads are normal for pipes.
fn fill_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Length of a multi-byte sequence left unfinished at the end of `bytes`.
fn incomplete_tail_len(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(4) {
        let b = bytes[len - back];
        if (b & 0b1100_0000) == 0b1000_0000 {
            continue;
        }
        let needed = match b {
            0x00..=0x7F => 1,
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => return 0,
        };
        return if needed > back { back } else { 0 };
    }
    0
}

/// Index where the last `count` chars of `bytes` begin, or 0 if there are fewer.
fn last_chars_start(bytes: &[u8], count: usize) -> usize {
    if count == 0 {
        return bytes.len();
    }
    let mut seen = 0;
    for (idx, b) in bytes.iter().enumerate().rev() {
        if (b & 0b1100_0000) != 0b1000_0000 {
            seen += 1;
            if seen == count {
                return idx;
            }
        }
    }
    0
}
