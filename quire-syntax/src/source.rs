//! Byte sources that documents are read from.

use bytes::Bytes;
use std::ops::Range;
use std::sync::{Arc, RwLock};

/// The outcome of a read from a [`ByteSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResult {
    /// The requested bytes. The data is shorter than requested if the range
    /// extends past the end of the source.
    Data(Bytes),
    /// Part of the range has not arrived yet.
    NeedMoreData,
    /// The offset is at or past the end of the source.
    Eof,
}

/// A random-access source of bytes.
pub trait ByteSource {
    /// The total size of the source in bytes.
    fn size(&self) -> u64;

    /// Read `len` bytes starting at `offset`.
    fn read_at(&self, offset: u64, len: usize) -> ReadResult;

    /// The number of contiguous bytes that can be read at `offset` without
    /// getting [`ReadResult::NeedMoreData`].
    fn available_from(&self, offset: u64) -> u64 {
        self.size().saturating_sub(offset)
    }
}

/// A source whose data is completely in memory.
#[derive(Debug, Clone)]
pub struct MemorySource(Bytes);

impl MemorySource {
    /// Create a new memory source.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }
}

impl ByteSource for MemorySource {
    fn size(&self) -> u64 {
        self.0.len() as u64
    }

    fn read_at(&self, offset: u64, len: usize) -> ReadResult {
        let Ok(start) = usize::try_from(offset) else {
            return ReadResult::Eof;
        };

        if start >= self.0.len() {
            return ReadResult::Eof;
        }

        let end = start.saturating_add(len).min(self.0.len());

        ReadResult::Data(self.0.slice(start..end))
    }
}

#[derive(Debug)]
struct Partial {
    data: Vec<u8>,
    // Sorted, non-overlapping and non-adjacent.
    ranges: Vec<Range<u64>>,
}

impl Partial {
    fn insert(&mut self, new: Range<u64>) {
        let mut merged = new;
        let mut kept = Vec::with_capacity(self.ranges.len() + 1);

        for range in self.ranges.drain(..) {
            if range.end < merged.start || range.start > merged.end {
                kept.push(range);
            } else {
                merged = merged.start.min(range.start)..merged.end.max(range.end);
            }
        }

        kept.push(merged);
        kept.sort_by_key(|r| r.start);
        self.ranges = kept;
    }

    fn available_from(&self, offset: u64) -> u64 {
        self.ranges
            .iter()
            .find(|r| r.start <= offset && offset < r.end)
            .map(|r| r.end - offset)
            .unwrap_or(0)
    }
}

/// A source over a file that is still being downloaded.
///
/// The handle is cheap to clone: one clone can be passed to the document
/// while another one is fed with data as it arrives. Reads of ranges that
/// were not supplied yet yield [`ReadResult::NeedMoreData`], which the
/// document surfaces as [`Error::NeedMoreData`](crate::Error::NeedMoreData).
#[derive(Debug, Clone)]
pub struct ProgressiveSource {
    size: u64,
    inner: Arc<RwLock<Partial>>,
}

impl ProgressiveSource {
    /// Create a source for a file of `size` bytes with no data yet.
    pub fn new(size: u64) -> Self {
        let len = usize::try_from(size).unwrap_or(usize::MAX);

        Self {
            size,
            inner: Arc::new(RwLock::new(Partial {
                data: vec![0; len],
                ranges: Vec::new(),
            })),
        }
    }

    /// Supply the bytes starting at `offset`. Bytes past the end of the file
    /// are ignored.
    pub fn supply(&self, offset: u64, bytes: &[u8]) {
        if offset >= self.size || bytes.is_empty() {
            return;
        }

        let end = (offset + bytes.len() as u64).min(self.size);
        let Ok(mut inner) = self.inner.write() else {
            return;
        };

        let (start_idx, end_idx) = (offset as usize, end as usize);
        inner.data[start_idx..end_idx].copy_from_slice(&bytes[..end_idx - start_idx]);
        inner.insert(offset..end);
    }

    /// Whether the whole file has been supplied.
    pub fn is_complete(&self) -> bool {
        self.available_from(0) == self.size
    }
}

impl ByteSource for ProgressiveSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, len: usize) -> ReadResult {
        if offset >= self.size {
            return ReadResult::Eof;
        }

        let end = offset.saturating_add(len as u64).min(self.size);
        let Ok(inner) = self.inner.read() else {
            return ReadResult::NeedMoreData;
        };

        if inner.available_from(offset) < end - offset {
            return ReadResult::NeedMoreData;
        }

        ReadResult::Data(Bytes::copy_from_slice(
            &inner.data[offset as usize..end as usize],
        ))
    }

    fn available_from(&self, offset: u64) -> u64 {
        self.inner
            .read()
            .map(|inner| inner.available_from(offset))
            .unwrap_or(0)
    }
}
