use anyhow::{bail, Result};
use std::ops::Range;

/// A dynamically growing buffer that acts like a window being moved over a
/// larger input stream. Byte positions are always absolute to that stream:
/// `head` is the position of the first retained byte, `tail` is one past the
/// last one.
#[derive(Default)]
pub struct Window {
    head: usize,
    buf: Vec<u8>,
}

impl Window {
    /// Absolute position of the first retained byte
    pub fn head(&self) -> usize {
        self.head
    }

    /// Absolute position one past the last retained byte
    pub fn tail(&self) -> usize {
        self.head + self.buf.len()
    }

    /// Append data to the window (i.e. make it larger)
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Return a copy of the bytes in the given absolute range
    pub fn bytes(&self, range: Range<usize>) -> Result<Vec<u8>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }

        if range.start < self.head {
            bail!("Unable to get bytes from before the start of the window");
        }

        if range.end > self.tail() {
            bail!("Unable to get bytes from beyond the end of the window");
        }

        Ok(self.buf[range.start - self.head..range.end - self.head].to_vec())
    }

    /// Return the decoded text of the given absolute range. Fails if the
    /// range is outside the window or the bytes are not valid UTF-8.
    pub fn text(&self, range: Range<usize>) -> Result<String> {
        Ok(String::from_utf8(self.bytes(range)?)?)
    }

    /// Move the window's start to the given absolute position, discarding
    /// all bytes before it. The window's end does not move.
    pub fn advance_to(&mut self, pos: usize) -> Result<()> {
        if pos < self.head {
            bail!("Unable to advance to a position before the current start of the window");
        }

        if pos > self.tail() {
            bail!("Unable to advance to a position beyond the current end of the window");
        }

        self.buf.drain(0..pos - self.head);
        self.head = pos;

        Ok(())
    }
}
