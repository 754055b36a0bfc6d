//! Accumulate/flush state machine behind stdout capture.

use std::io::{self, Write};

/// Buffered length above which a write triggers an automatic flush.
pub const AUTO_FLUSH_THRESHOLD: usize = 250;

/// Marker printed after a chunk flushed because the buffer grew past the threshold.
pub const AUTO_FLUSH_MARKER: &str = "Flushing output [AUTOMATICALLY]";

/// Marker printed after the final drain at session end.
pub const FINAL_FLUSH_MARKER: &str = "Flushing output [FINAL]";

/// Why a chunk was flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushKind {
    Automatic,
    Final,
}

impl FlushKind {
    pub fn marker(self) -> &'static str {
        match self {
            FlushKind::Automatic => AUTO_FLUSH_MARKER,
            FlushKind::Final => FINAL_FLUSH_MARKER,
        }
    }
}

/// Buffers captured output and mirrors it to the original sink in chunks.
///
/// Each flush writes the buffered bytes followed by a marker line to `original`
/// and leaves the buffer empty. Markers are metadata; concatenating the flushed
/// chunks yields exactly what was written.
#[derive(Debug)]
pub struct CaptureBuffer<W: Write> {
    buf: Vec<u8>,
    original: W,
    flushes: usize,
}

impl<W: Write> CaptureBuffer<W> {
    pub fn new(original: W) -> Self {
        Self {
            buf: Vec::new(),
            original,
            flushes: 0,
        }
    }

    /// Append captured bytes, flushing automatically past the threshold.
    pub fn push(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > AUTO_FLUSH_THRESHOLD {
            self.emit(FlushKind::Automatic)?;
        }
        Ok(())
    }

    /// Drain whatever is buffered, regardless of length.
    pub fn flush_final(&mut self) -> io::Result<()> {
        self.emit(FlushKind::Final)
    }

    /// Bytes accumulated since the last flush.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// Number of flushes performed so far.
    pub fn flush_count(&self) -> usize {
        self.flushes
    }

    pub fn original(&self) -> &W {
        &self.original
    }

    pub fn into_original(self) -> W {
        self.original
    }

    fn emit(&mut self, kind: FlushKind) -> io::Result<()> {
        // The buffer is cleared even if the sink fails so a broken console
        // cannot make the buffer grow without bound.
        let chunk = std::mem::take(&mut self.buf);
        self.flushes += 1;
        self.original.write_all(&chunk)?;
        writeln!(self.original, "{}", kind.marker())?;
        self.original.flush()
    }
}

impl<W: Write> Write for CaptureBuffer<W> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.push(bytes)?;
        Ok(bytes.len())
    }

    /// Only forwards to the sink; draining is reserved for [`flush_final`].
    ///
    /// [`flush_final`]: CaptureBuffer::flush_final
    fn flush(&mut self) -> io::Result<()> {
        self.original.flush()
    }
}
