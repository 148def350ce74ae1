//! Owned record buffers handed across the boundary.
//!
//! An enumeration produces one contiguous byte region. Ownership moves to
//! the caller with the buffer; releasing it is either explicit
//! ([`RecordBuffer::release`]) or happens on drop, so a forgotten release
//! cannot leak.

use crate::error::Result;
use crate::record::Record;
use core::marker::PhantomData;

/// Incrementally builds a [`RecordBuffer`].
///
/// Starts with room for every header; the region grows as each name's
/// length becomes known.
pub struct RecordWriter<R> {
    bytes: Vec<u8>,
    count: usize,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Record> RecordWriter<R> {
    pub fn with_capacity(records: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(records * R::HEADER_SIZE),
            count: 0,
            _marker: PhantomData,
        }
    }

    /// Append a record at the current offset.
    pub fn push(&mut self, record: &R) -> Result<()> {
        record.encode_into(&mut self.bytes)?;
        self.count += 1;
        Ok(())
    }

    /// Running byte offset of the next record.
    pub fn offset(&self) -> usize {
        self.bytes.len()
    }

    pub fn finish(self) -> RecordBuffer<R> {
        RecordBuffer {
            bytes: self.bytes,
            count: self.count,
            _marker: PhantomData,
        }
    }
}

/// Caller-owned region of concatenated records of one kind.
#[derive(Clone)]
pub struct RecordBuffer<R> {
    bytes: Vec<u8>,
    count: usize,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Record> RecordBuffer<R> {
    /// Single-record buffer.
    pub fn single(record: &R) -> Result<Self> {
        let mut writer = RecordWriter::with_capacity(1);
        writer.push(record)?;
        Ok(writer.finish())
    }

    /// Adopt bytes produced elsewhere, validating every record in them.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let mut offset = 0;
        let mut count = 0;
        while offset < bytes.len() {
            let (_, next) = R::decode_at(&bytes, offset)?;
            offset = next;
            count += 1;
        }
        Ok(Self {
            bytes,
            count,
            _marker: PhantomData,
        })
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Total encoded size in bytes.
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decode records lazily from a running offset.
    pub fn iter(&self) -> Records<'_, R> {
        Records {
            bytes: &self.bytes,
            offset: 0,
            failed: false,
            _marker: PhantomData,
        }
    }

    /// Decode every record.
    pub fn decode(&self) -> Result<Vec<R>> {
        self.iter().collect()
    }

    /// Decode the first record, if any.
    pub fn first(&self) -> Option<Result<R>> {
        self.iter().next()
    }

    /// Give up ownership of the raw region.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Release the region now, returning how many bytes were freed.
    pub fn release(self) -> usize {
        self.bytes.len()
    }
}

impl<R> core::fmt::Debug for RecordBuffer<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RecordBuffer")
            .field("records", &self.count)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Iterator over the records of a [`RecordBuffer`].
///
/// Yields one error and then stops if the region is malformed.
pub struct Records<'a, R> {
    bytes: &'a [u8],
    offset: usize,
    failed: bool,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Record> Iterator for Records<'_, R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.bytes.len() {
            return None;
        }
        match R::decode_at(self.bytes, self.offset) {
            Ok((record, next)) => {
                self.offset = next;
                Some(Ok(record))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
