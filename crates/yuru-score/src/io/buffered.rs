//! Windowed reader with cheap backward seeks.

use std::io::{self, Read, Seek, SeekFrom};

/// Default window size in bytes.
pub const DEFAULT_CAPACITY: usize = 10 * 1024;

/// A reader that caches one window of the underlying stream.
///
/// Unlike [`std::io::BufReader`], seeking to a position that is still inside
/// the cached window only moves the cursor, which keeps character-level
/// parsers that rewind by a byte or two from hitting the file again.
#[derive(Debug)]
pub struct BufferedFileReader<R> {
    inner: R,
    buf: Vec<u8>,
    /// Stream position of `buf[0]`.
    window_pos: u64,
    /// Cursor inside the window.
    offset: usize,
    /// Valid bytes in the window.
    filled: usize,
    size: u64,
}

impl<R: Read + Seek> BufferedFileReader<R> {
    /// Wrap `inner` with the default window size.
    pub fn new(inner: R) -> io::Result<Self> {
        Self::with_capacity(DEFAULT_CAPACITY, inner)
    }

    /// Wrap `inner` with a window of `capacity` bytes.
    pub fn with_capacity(capacity: usize, mut inner: R) -> io::Result<Self> {
        let start = inner.stream_position()?;
        let size = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(start))?;
        Ok(Self {
            inner,
            buf: vec![0; capacity.max(1)],
            window_pos: start,
            offset: 0,
            filled: 0,
            size,
        })
    }

    /// Current read position in the stream.
    pub fn position(&self) -> u64 {
        self.window_pos + self.offset as u64
    }

    /// Total length of the stream.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes left between the read position and the end of the stream.
    pub fn available(&self) -> u64 {
        self.size.saturating_sub(self.position())
    }

    /// Move the read position to `pos`.
    ///
    /// Positions inside the cached window are served without touching the
    /// underlying stream.
    pub fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        if self.window_pos <= pos && pos < self.window_pos + self.filled as u64 {
            self.offset = (pos - self.window_pos) as usize;
            return Ok(());
        }
        self.inner.seek(SeekFrom::Start(pos))?;
        self.window_pos = pos;
        self.offset = 0;
        self.filled = 0;
        Ok(())
    }

    /// Read one byte, `None` at end of stream or on error.
    pub fn read_byte(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.offset += 1;
        Some(byte)
    }

    /// Look at the next byte without consuming it.
    pub fn peek(&mut self) -> Option<u8> {
        if self.offset >= self.filled {
            match self.refill() {
                Ok(0) | Err(_) => return None,
                Ok(_) => {}
            }
        }
        Some(self.buf[self.offset])
    }

    /// Read bytes up to (not including) `terminator` or the end of stream.
    ///
    /// The terminator is consumed. Invalid UTF-8 is replaced.
    pub fn read_string_until(&mut self, terminator: u8) -> String {
        let mut bytes = Vec::new();
        while let Some(byte) = self.read_byte() {
            if byte == terminator {
                break;
            }
            bytes.push(byte);
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Unwrap the underlying stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn refill(&mut self) -> io::Result<usize> {
        self.window_pos += self.filled as u64;
        self.offset = 0;
        self.filled = 0;
        let n = loop {
            match self.inner.read(&mut self.buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        self.filled = n;
        Ok(n)
    }
}

impl<R: Read + Seek> Read for BufferedFileReader<R> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        let mut read = 0;
        while read < dst.len() {
            if self.offset >= self.filled && self.refill()? == 0 {
                break;
            }
            let n = (self.filled - self.offset).min(dst.len() - read);
            dst[read..read + n].copy_from_slice(&self.buf[self.offset..self.offset + n]);
            self.offset += n;
            read += n;
        }
        Ok(read)
    }
}

impl<R: Read + Seek> Seek for BufferedFileReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(d) => self.size.checked_add_signed(d),
            SeekFrom::Current(d) => self.position().checked_add_signed(d),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "invalid seek to a negative position")
        })?;
        self.seek_to(target)?;
        Ok(target)
    }
}
