//! Bounds-checked read cursor over a byte buffer.
//!
//! The SOAP decoder walks raw input through [`Cursor`] instead of indexing
//! directly, so every scan step is checked against the buffer length before
//! a byte is read. Positions are plain indices; a [`Span`] records a range
//! that can be resolved against the same buffer later.

/// A `[start, end)` range into a buffer. Never owns memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve the span against `buf`, or `None` if it lies outside it.
    pub fn slice<'a>(&self, buf: &'a [u8]) -> Option<&'a [u8]> {
        buf.get(self.start..self.end)
    }

    /// Resolve the span as text. `None` when out of range or not on a char boundary.
    pub fn as_str<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.get(self.start..self.end)
    }
}

/// Forward-only cursor with checked reads.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn buffer(&self) -> &'a [u8] {
        self.buf
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    pub fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.buf.get(self.pos.checked_add(offset)?).copied()
    }

    /// Read one byte and advance.
    pub fn next_byte(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Advance by `n` bytes. Returns `false` (and does not move) if fewer remain.
    pub fn advance(&mut self, n: usize) -> bool {
        if n > self.remaining() {
            return false;
        }
        self.pos += n;
        true
    }

    pub fn starts_with(&self, pattern: &[u8]) -> bool {
        self.buf
            .get(self.pos..)
            .is_some_and(|rest| rest.starts_with(pattern))
    }

    /// Consume `pattern` if the cursor is positioned on it.
    pub fn eat(&mut self, pattern: &[u8]) -> bool {
        if self.starts_with(pattern) {
            self.pos += pattern.len();
            true
        } else {
            false
        }
    }

    pub fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Offset of the next occurrence of `pattern`, relative to the cursor.
    pub fn find(&self, pattern: &[u8]) -> Option<usize> {
        if pattern.is_empty() {
            return Some(0);
        }
        self.buf
            .get(self.pos..)?
            .windows(pattern.len())
            .position(|w| w == pattern)
    }

    /// Span from the cursor up to (not including) the next `byte`.
    /// The cursor is left on `byte`. `None` if `byte` does not occur.
    pub fn take_until(&mut self, byte: u8) -> Option<Span> {
        let offset = self.buf.get(self.pos..)?.iter().position(|&b| b == byte)?;
        let span = Span::new(self.pos, self.pos + offset);
        self.pos += offset;
        Some(span)
    }

    /// Span up to the next occurrence of `pattern`, consuming the pattern too.
    pub fn take_through(&mut self, pattern: &[u8]) -> Option<Span> {
        let offset = self.find(pattern)?;
        let span = Span::new(self.pos, self.pos + offset);
        self.pos += offset + pattern.len();
        Some(span)
    }

    /// Span of the bytes up to the next byte matching `stop`, or the end of input.
    pub fn take_while_not(&mut self, stop: impl Fn(u8) -> bool) -> Span {
        let start = self.pos;
        while self.peek().is_some_and(|b| !stop(b)) {
            self.pos += 1;
        }
        Span::new(start, self.pos)
    }
}
