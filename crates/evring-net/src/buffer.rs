use crate::device::SocketDevice;
use crate::error::{NetError, NetResult};

/// Blocking byte transport the buffers sit on: stream, pipe, or an
/// in-memory test double.
pub trait ByteDevice {
    /// Reads up to `buf.len()` bytes; 0 means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> NetResult<usize>;
    /// Writes up to `buf.len()` bytes, returning how many were taken.
    fn write(&mut self, buf: &[u8]) -> NetResult<usize>;
    /// Releases the transport.
    fn close(&mut self);
}

impl ByteDevice for SocketDevice {
    fn read(&mut self, buf: &mut [u8]) -> NetResult<usize> {
        SocketDevice::read(self, buf)
    }

    fn write(&mut self, buf: &[u8]) -> NetResult<usize> {
        SocketDevice::write(self, buf)
    }

    fn close(&mut self) {
        SocketDevice::close(self);
    }
}

// ---------------------------------------------------------------------
// Read side
// ---------------------------------------------------------------------

/// Buffered read side with zero-copy framing.
///
/// Frames are yielded as views into the buffer; nothing is consumed
/// until [`read_flush`](ReadBuffer::read_flush) commits the bytes of the
/// last yielded frame. A failed [`read_fixed`](ReadBuffer::read_fixed)
/// raises the low watermark so the next readiness pass only fires once
/// enough bytes are buffered.
pub struct ReadBuffer {
    data: Vec<u8>,
    /// Start of unconsumed data within `data`.
    start: usize,
    /// Bytes yielded by the last frame read, committed by `read_flush`.
    pending: usize,
    min_watermark: usize,
    max_watermark: usize,
}

impl ReadBuffer {
    const COMPACT_THRESHOLD: usize = 4096;

    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            start: 0,
            pending: 0,
            min_watermark: 0,
            max_watermark: 0,
        }
    }

    /// Bytes currently available without further I/O.
    pub fn read_size(&self) -> usize {
        self.data.len() - self.start
    }

    /// Appends raw bytes, as a readiness handler does after a device
    /// read.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.compact();
        self.data.extend_from_slice(bytes);
    }

    /// Pulls once from `dev` into the buffer. Returns the byte count
    /// (0 at end of stream).
    pub fn fill_from<D: ByteDevice>(&mut self, dev: &mut D) -> NetResult<usize> {
        self.compact();
        let want = match self.max_watermark {
            0 => 4096,
            max => max.saturating_sub(self.read_size()).min(4096),
        };
        if want == 0 {
            return Ok(0);
        }
        let old_len = self.data.len();
        self.data.resize(old_len + want, 0);
        match dev.read(&mut self.data[old_len..]) {
            Ok(n) => {
                self.data.truncate(old_len + n);
                Ok(n)
            }
            Err(err) => {
                self.data.truncate(old_len);
                Err(err)
            }
        }
    }

    /// Whether buffered data satisfies the low watermark, i.e. a
    /// readiness event should be delivered to the frame handler.
    pub fn above_low_watermark(&self) -> bool {
        self.read_size() >= self.min_watermark
    }

    /// Yields the next line without the trailing `\n` (and without a
    /// preceding `\r`, if any) as a view into the buffer. Returns `None`
    /// until a full line is buffered.
    ///
    /// Call [`read_flush`](Self::read_flush) to consume the yielded
    /// bytes before reading the next frame.
    pub fn read_line(&mut self) -> Option<&[u8]> {
        let avail = &self.data[self.start..];
        let nl = avail.iter().position(|&b| b == b'\n')?;
        self.pending = nl + 1;
        let line = &avail[..nl];
        Some(line.strip_suffix(b"\r").unwrap_or(line))
    }

    /// Yields exactly `size` bytes as a view into the buffer, or records
    /// watermarks (`size` low, `max_size` high) and returns `None` so
    /// the next readiness pass fires only once enough data is present.
    ///
    /// Call [`read_flush`](Self::read_flush) to consume a yielded frame,
    /// then [`read_reset`](Self::read_reset) once the framing cycle
    /// completes.
    pub fn read_fixed(&mut self, size: usize, max_size: usize) -> Option<&[u8]> {
        debug_assert!(max_size == 0 || max_size >= size);
        if self.read_size() < size {
            self.min_watermark = size;
            self.max_watermark = max_size;
            return None;
        }
        self.pending = size;
        Some(&self.data[self.start..self.start + size])
    }

    /// Consumes the bytes yielded by the last `read_line`/`read_fixed`.
    pub fn read_flush(&mut self) {
        self.start += self.pending;
        self.pending = 0;
    }

    /// Resets the watermarks after a completed framing cycle.
    pub fn read_reset(&mut self, max_size: usize, min_size: usize) {
        self.max_watermark = max_size;
        self.min_watermark = min_size;
    }

    /// Drops consumed bytes once they dominate the buffer.
    fn compact(&mut self) {
        if self.start >= Self::COMPACT_THRESHOLD && self.start * 2 >= self.data.len() {
            self.data.drain(..self.start);
            self.start = 0;
        }
    }
}

impl Default for ReadBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------
// Write side
// ---------------------------------------------------------------------

/// Buffered write side with bulk reservation.
pub struct WriteBuffer {
    data: Vec<u8>,
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Bytes queued and not yet flushed.
    pub fn write_size(&self) -> usize {
        self.data.len()
    }

    /// Appends bytes, growing as needed.
    pub fn write(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Pre-grows for `size` further bytes.
    pub fn write_reserve(&mut self, size: usize) {
        self.data.reserve(size);
    }

    /// Discards everything queued.
    pub fn write_clear(&mut self) {
        self.data.clear();
    }

    /// Starts a bulk write of exactly `size` bytes.
    ///
    /// The reservation commits automatically once `size` bytes have been
    /// added; adding a different total is a contract violation caught in
    /// debug builds.
    pub fn bulk(&mut self, size: usize) -> BulkWrite<'_> {
        self.data.reserve(size);
        let end = self.data.len() + size;
        BulkWrite {
            data: &mut self.data,
            end,
        }
    }

    /// Flushes queued bytes to `dev` until empty or the device stops
    /// taking them. Returns the byte count flushed.
    pub fn flush_to<D: ByteDevice>(&mut self, dev: &mut D) -> NetResult<usize> {
        let mut written = 0;
        while written < self.data.len() {
            match dev.write(&self.data[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(NetError::WouldBlock) if written > 0 => break,
                Err(err) => {
                    self.data.drain(..written);
                    return Err(err);
                }
            }
        }
        self.data.drain(..written);
        Ok(written)
    }
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// In-progress bulk reservation on a [`WriteBuffer`].
///
/// Groups several small appends into one pre-sized contiguous span. The
/// total added must equal the reserved size by the time this drops.
pub struct BulkWrite<'a> {
    data: &'a mut Vec<u8>,
    end: usize,
}

impl BulkWrite<'_> {
    /// Bytes still to be added before the reservation is complete.
    pub fn remaining(&self) -> usize {
        self.end - self.data.len()
    }

    /// Adds a chunk.
    pub fn add(&mut self, bytes: &[u8]) -> &mut Self {
        debug_assert!(bytes.len() <= self.remaining());
        self.data.extend_from_slice(bytes);
        self
    }

    /// Adds a single byte.
    pub fn add_byte(&mut self, byte: u8) -> &mut Self {
        debug_assert!(self.remaining() >= 1);
        self.data.push(byte);
        self
    }
}

impl Drop for BulkWrite<'_> {
    fn drop(&mut self) {
        debug_assert!(
            self.data.len() == self.end,
            "bulk write reserved through {} but wrote {}",
            self.end,
            self.data.len()
        );
    }
}

// ---------------------------------------------------------------------
// Framing handler
// ---------------------------------------------------------------------

/// Read/write buffer pair for one connection.
pub struct StreamBuffers {
    pub rd: ReadBuffer,
    pub wr: WriteBuffer,
}

/// Protocol hook driven by readiness events.
///
/// `on_read` parses as much as it can out of the buffers. Return `true`
/// with `*need > 0` to wait for at least that many bytes, `true` with
/// `*need == 0` when done for now, or `false` to close the connection.
pub trait FrameHandler {
    fn on_read(&mut self, need: &mut usize, buffers: &mut StreamBuffers) -> bool;

    /// One complete fixed-size frame. Set `*next_size` to request a
    /// further frame immediately; return `false` to close.
    fn on_read_fixed(&mut self, next_size: &mut usize, frame: &[u8]) -> bool;
}

impl StreamBuffers {
    pub fn new() -> Self {
        Self {
            rd: ReadBuffer::new(),
            wr: WriteBuffer::new(),
        }
    }

    /// Drives a fixed-size framing cycle from inside
    /// [`FrameHandler::on_read`].
    ///
    /// Repeatedly yields `size`-byte frames to `handler.on_read_fixed`
    /// and flushes them, following `*next_size` requests, until data runs
    /// out or the handler stops asking. On short data, stores `size` into
    /// `need` and returns `true`: the caller should return and wait for
    /// the next readiness event. Returns `false` when the handler asks to
    /// close.
    pub fn read_fixed_helper<H: FrameHandler>(
        &mut self,
        handler: &mut H,
        need: &mut usize,
        size: usize,
        max_size: usize,
    ) -> bool {
        let mut size = size;
        loop {
            let keep_open = match self.rd.read_fixed(size, max_size) {
                None => {
                    *need = size;
                    return true; // wait for more data
                }
                Some(frame) => {
                    let mut next_size = 0;
                    let keep_open = handler.on_read_fixed(&mut next_size, frame);
                    size = next_size;
                    keep_open
                }
            };
            if !keep_open {
                return false;
            }
            self.rd.read_flush();
            if size == 0 {
                break;
            }
        }
        *need = 0;
        true
    }
}

impl Default for StreamBuffers {
    fn default() -> Self {
        Self::new()
    }
}
