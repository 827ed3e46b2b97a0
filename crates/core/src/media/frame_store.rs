//! Length-prefixed Motion JPEG container.
//!
//! A frame store file is a flat concatenation of entries:
//!
//! ```text
//! +-------+---------------------------+-------+------------------ - -
//! | 01234 | 1234 bytes of JPEG data   | 00987 | 987 bytes ...
//! +-------+---------------------------+-------+------------------ - -
//!  5 ASCII digits, zero padded
//! ```
//!
//! End of file is end of stream. A length prefix that cannot be read as
//! five decimal digits is also reported as end of stream; the reader does
//! not distinguish corruption from a clean end.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, RtspError};

/// Number of ASCII digits in each length prefix.
pub const LENGTH_PREFIX_DIGITS: usize = 5;

/// Largest frame the length prefix can describe.
pub const MAX_FRAME_SIZE: usize = 99_999;

/// Sequential reader over a frame store file.
#[derive(Debug)]
pub struct FrameStore {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    frame_number: u64,
}

impl FrameStore {
    /// Open a frame store. Fails with [`RtspError::ResourceNotFound`] if
    /// the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            tracing::debug!(path = %path.display(), error = %e, "frame store open failed");
            RtspError::ResourceNotFound(path.display().to_string())
        })?;

        tracing::debug!(path = %path.display(), "frame store opened");

        Ok(Self {
            path: path.to_path_buf(),
            reader: Some(BufReader::new(file)),
            frame_number: 0,
        })
    }

    /// Read the next frame, or `None` at end of stream.
    ///
    /// A truncated final entry yields whatever bytes remain after its prefix.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let reader = self.reader.as_mut()?;

        let mut prefix = [0u8; LENGTH_PREFIX_DIGITS];
        reader.read_exact(&mut prefix).ok()?;
        let length = parse_length(&prefix)?;

        let mut frame = Vec::with_capacity(length);
        reader.by_ref().take(length as u64).read_to_end(&mut frame).ok()?;

        self.frame_number += 1;
        Some(frame)
    }

    /// Rewind to the first frame and reset the frame counter.
    pub fn reset(&mut self) -> Result<()> {
        if let Some(reader) = self.reader.as_mut() {
            reader.seek(SeekFrom::Start(0))?;
        }
        self.frame_number = 0;
        Ok(())
    }

    /// Frames returned since open or the last [`reset`](Self::reset).
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Release the file handle. Safe to call more than once; later reads
    /// report end of stream.
    pub fn close(&mut self) {
        if self.reader.take().is_some() {
            tracing::debug!(path = %self.path.display(), "frame store closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parse_length(prefix: &[u8; LENGTH_PREFIX_DIGITS]) -> Option<usize> {
    if !prefix.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(prefix).ok()?.parse().ok()
}

/// Writes frames in the frame store format.
pub struct FrameWriter<W: Write> {
    inner: W,
    frames: u64,
}

impl FrameWriter<BufWriter<File>> {
    /// Create (or truncate) a frame store file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, frames: 0 }
    }

    /// Append one frame. Frames over [`MAX_FRAME_SIZE`] are rejected
    /// without writing anything.
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        if frame.len() > MAX_FRAME_SIZE {
            return Err(RtspError::FrameTooLarge(frame.len()));
        }
        write!(self.inner, "{:05}", frame.len())?;
        self.inner.write_all(frame)?;
        self.frames += 1;
        Ok(())
    }

    /// Frames written so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Flush and return the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}
