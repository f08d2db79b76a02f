//! In-memory body buffers and their read/write handles.
//!
//! Bodies held by a transaction are plain byte buffers. A [`BodyReader`] is a
//! snapshot of the buffer at the moment it is taken: replacing the body
//! afterwards does not affect an already-obtained reader, it simply becomes
//! stale. A [`BodyWriter`] atomically resets the buffer on creation and makes
//! "whatever is subsequently written" the new body; the previous content is
//! released, never appended to.

use std::io::{self, Read, Write};
use std::mem;

use bytes::buf::Reader;
use bytes::{Buf, Bytes, BytesMut};

/// A readable stream over a snapshot of a body buffer.
#[derive(Debug)]
pub struct BodyReader {
    inner: Reader<Bytes>,
}

impl BodyReader {
    pub(crate) fn snapshot(bytes: Bytes) -> Self {
        Self { inner: bytes.reader() }
    }

    /// Remaining unread bytes of the snapshot.
    pub fn remaining(&self) -> usize {
        self.inner.get_ref().remaining()
    }
}

impl Read for BodyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

/// A writable sink that replaces a body buffer.
///
/// Creating the writer drops the previous body content; bytes written through
/// it accumulate as the new body.
#[derive(Debug)]
pub struct BodyWriter<'buf> {
    buf: &'buf mut BytesMut,
}

impl<'buf> BodyWriter<'buf> {
    pub(crate) fn reset(buf: &'buf mut BytesMut) -> Self {
        // Release the previous body explicitly instead of leaving the old
        // allocation reachable behind the swap.
        let previous = mem::take(buf);
        drop(previous);
        Self { buf }
    }
}

impl Write for BodyWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
