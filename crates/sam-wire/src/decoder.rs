//! Decoding: bytes → envelope header → container tree.
//!
//! The body is parsed by a small recursive-descent parser over the
//! grammar
//!
//! ```text
//! container := name '[' [ item { ',' item } ] ']'
//! item      := name '=' value | container
//! ```
//!
//! Offsets in errors are relative to the start of the input buffer.

use crate::container::{Container, Field, Item};
use crate::envelope::{self, CLOSE};
use crate::error::{WireError, WireResult};
use crate::escape::{is_reserved, ESCAPE};

/// A successfully decoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub message: Container,
    /// Bytes of input the message occupied.
    pub consumed: usize,
}

/// Decode the message at the start of `buf`.
///
/// `Ok(None)` means more bytes are needed; nothing was consumed.
pub(crate) fn decode(buf: &[u8], limit: usize, max_depth: usize) -> WireResult<Option<Decoded>> {
    let Some(header) = envelope::parse(buf, limit)? else {
        return Ok(None);
    };
    if buf.len() < header.total {
        return Ok(None);
    }
    let last = header.total - 1;
    if buf[last] != CLOSE {
        return Err(WireError::malformed(last, "missing '}'"));
    }

    let mut parser = Parser {
        input: &buf[..last],
        pos: header.len(),
        max_depth,
    };
    let message = parser.container(1)?;
    if parser.pos != last {
        return Err(WireError::malformed(parser.pos, "trailing bytes after root container"));
    }
    Ok(Some(Decoded { message, consumed: header.total }))
}

struct Parser<'a> {
    /// Input up to (excluding) the closing `}`.
    input: &'a [u8],
    pos: usize,
    max_depth: usize,
}

impl Parser<'_> {
    #[inline]
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn expect(&mut self, b: u8, reason: &'static str) -> WireResult<()> {
        if self.peek() == Some(b) {
            self.pos += 1;
            Ok(())
        } else {
            Err(WireError::malformed(self.pos, reason))
        }
    }

    /// Escaped text up to the next unescaped reserved byte.
    fn text(&mut self) -> WireResult<String> {
        let start = self.pos;
        let mut out = Vec::new();
        while let Some(b) = self.peek() {
            if b == ESCAPE {
                match self.input.get(self.pos + 1) {
                    Some(&e) if is_reserved(e) => {
                        out.push(e);
                        self.pos += 2;
                    }
                    _ => return Err(WireError::malformed(self.pos, "invalid escape")),
                }
            } else if is_reserved(b) {
                break;
            } else {
                out.push(b);
                self.pos += 1;
            }
        }
        String::from_utf8(out).map_err(|_| WireError::malformed(start, "invalid utf-8"))
    }

    /// `'[' items ']'` for a container whose name has been read.
    fn container_body(&mut self, name: String, depth: usize) -> WireResult<Container> {
        if depth > self.max_depth {
            return Err(WireError::malformed(self.pos, "nesting too deep"));
        }
        self.expect(b'[', "expected '['")?;
        let mut node = Container::new(name);
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(node);
        }
        loop {
            let name = self.text()?;
            match self.peek() {
                Some(b'=') => {
                    self.pos += 1;
                    let value = self.text()?;
                    node.push(Item::Field(Field { name, value }));
                }
                Some(b'[') => {
                    let child = self.container_body(name, depth + 1)?;
                    node.push(Item::Child(child));
                }
                _ => return Err(WireError::malformed(self.pos, "expected '=' or '['")),
            }
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    return Ok(node);
                }
                _ => return Err(WireError::malformed(self.pos, "expected ',' or ']'")),
            }
        }
    }

    fn container(&mut self, depth: usize) -> WireResult<Container> {
        let name = self.text()?;
        self.container_body(name, depth)
    }
}
