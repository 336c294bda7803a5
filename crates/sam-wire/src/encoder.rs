//! Encoding: container tree → envelope + body.
//!
//! The body is written first, into a buffer that keeps `MAX_HEADER_LEN`
//! bytes of headroom in front of it. Once the body length is known the
//! header is planned and written immediately left of the body, so the
//! finished message is one contiguous slice without moving the body.
//!
//! ```text
//!   0              start          HEADROOM                    end
//!   │   (unused)   │ {SAM0100:00042 │ name[k=v,child[...]] │ } │
//! ```

use crate::container::{Container, Item};
use crate::envelope::{self, EnvelopeFormat, Header, CLOSE, MAX_HEADER_LEN};
use crate::error::{WireError, WireResult};
use crate::escape::write_escaped;

/// Headroom reserved in front of the body.
pub const HEADROOM: usize = MAX_HEADER_LEN;

/// Default body capacity for a fresh growable buffer.
pub const DEFAULT_BODY_CAPACITY: usize = 256;

/// Destination for encoded bytes.
pub(crate) trait ByteSink {
    fn put(&mut self, bytes: &[u8]) -> WireResult<()>;

    #[inline]
    fn put_byte(&mut self, b: u8) -> WireResult<()> {
        self.put(&[b])
    }
}

impl ByteSink for Vec<u8> {
    #[inline]
    fn put(&mut self, bytes: &[u8]) -> WireResult<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// Sink that only counts; used to size fixed-capacity targets exactly.
#[derive(Debug, Default)]
pub(crate) struct LenCounter(pub usize);

impl ByteSink for LenCounter {
    #[inline]
    fn put(&mut self, bytes: &[u8]) -> WireResult<()> {
        self.0 += bytes.len();
        Ok(())
    }
}

// ── Encode buffer ────────────────────────────────────────────────────

/// Growable body buffer with header headroom.
pub(crate) struct EncodeBuffer {
    buf: Vec<u8>,
}

impl EncodeBuffer {
    /// Buffer with room for `body_hint` body bytes.
    pub fn with_capacity(body_hint: usize) -> WireResult<Self> {
        let want = HEADROOM + body_hint;
        let mut buf = Vec::new();
        buf.try_reserve_exact(want)
            .map_err(|_| WireError::AllocationFailed { requested: want })?;
        buf.resize(HEADROOM, 0);
        Ok(Self { buf })
    }

    /// Body bytes written so far.
    #[inline]
    pub fn body_len(&self) -> usize {
        self.buf.len() - HEADROOM
    }

    /// Current capacity in bytes, headroom included.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Make room for `additional` more bytes, growing to
    /// `max(needed, 2 × capacity)`.
    fn reserve(&mut self, additional: usize) -> WireResult<()> {
        let needed = self.buf.len() + additional;
        if needed > self.buf.capacity() {
            let target = needed.max(self.buf.capacity().saturating_mul(2));
            self.buf
                .try_reserve_exact(target - self.buf.len())
                .map_err(|_| WireError::AllocationFailed { requested: target })?;
        }
        Ok(())
    }

    /// Plan the header, write it left of the body and close the body.
    fn seal(mut self, format: EnvelopeFormat, limit: usize) -> WireResult<EncodedMessage> {
        let header = envelope::plan(self.body_len(), format, limit)?;
        self.put_byte(CLOSE)?;
        let start = HEADROOM - header.len();
        header.write(&mut self.buf[start..HEADROOM]);
        Ok(EncodedMessage { buf: self.buf, start, header })
    }
}

impl ByteSink for EncodeBuffer {
    fn put(&mut self, bytes: &[u8]) -> WireResult<()> {
        self.reserve(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }
}

// ── Encoded message ──────────────────────────────────────────────────

/// A finished message: the envelope sits at `start` inside `buf`.
#[derive(Debug, Clone)]
pub struct EncodedMessage {
    buf: Vec<u8>,
    start: usize,
    header: Header,
}

impl EncodedMessage {
    /// The message bytes, `{` through `}`.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[self.start..]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len() - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn header(&self) -> Header {
        self.header
    }

    /// Backing buffer and the offset of the first message byte. Lets a
    /// send queue take ownership without shifting the bytes.
    pub fn into_parts(self) -> (Vec<u8>, usize) {
        (self.buf, self.start)
    }

    /// Message bytes as a vector of their own.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.buf.drain(..self.start);
        self.buf
    }
}

// ── Body serialization ───────────────────────────────────────────────

/// `name[item,item,...]`
pub(crate) fn write_container<S: ByteSink + ?Sized>(sink: &mut S, c: &Container) -> WireResult<()> {
    write_escaped(sink, c.name())?;
    sink.put_byte(b'[')?;
    for (i, item) in c.items().iter().enumerate() {
        if i > 0 {
            sink.put_byte(b',')?;
        }
        match item {
            Item::Field(f) => {
                write_escaped(sink, &f.name)?;
                sink.put_byte(b'=')?;
                write_escaped(sink, &f.value)?;
            }
            Item::Child(child) => write_container(sink, child)?,
        }
    }
    sink.put_byte(b']')
}

/// Exact body length of `c`.
pub(crate) fn body_len(c: &Container) -> usize {
    let mut counter = LenCounter::default();
    // Counting cannot fail.
    let _ = write_container(&mut counter, c);
    counter.0
}

/// Encode into a fresh growable buffer.
pub(crate) fn encode(
    c: &Container,
    format: EnvelopeFormat,
    limit: usize,
) -> WireResult<EncodedMessage> {
    let mut buf = EncodeBuffer::with_capacity(DEFAULT_BODY_CAPACITY)?;
    write_container(&mut buf, c)?;
    buf.seal(format, limit)
}

/// Encode into `dest`, returning the number of bytes written at its start.
pub(crate) fn encode_into(
    c: &Container,
    dest: &mut [u8],
    format: EnvelopeFormat,
    limit: usize,
) -> WireResult<usize> {
    let header = envelope::plan(body_len(c), format, limit)?;
    if header.total > dest.len() {
        return Err(WireError::DestinationTooSmall { needed: header.total, available: dest.len() });
    }
    let (head, rest) = dest.split_at_mut(header.len());
    header.write(head);
    let mut body = BodyWriter { out: rest, len: 0 };
    write_container(&mut body, c)?;
    body.put_byte(CLOSE)?;
    Ok(header.total)
}

/// Cursor over a caller-provided, fixed-capacity slice.
struct BodyWriter<'a> {
    out: &'a mut [u8],
    len: usize,
}

impl ByteSink for BodyWriter<'_> {
    fn put(&mut self, bytes: &[u8]) -> WireResult<()> {
        let end = self.len + bytes.len();
        if end > self.out.len() {
            return Err(WireError::DestinationTooSmall { needed: end, available: self.out.len() });
        }
        self.out[self.len..end].copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Tag, PROTOCOL_MAX_TOTAL};

    fn msg() -> Container {
        Container::new("ping").with("seq", "1")
    }

    #[test]
    fn test_encode_fixed() {
        let out = encode(&msg(), EnvelopeFormat::Auto, PROTOCOL_MAX_TOTAL).unwrap();
        assert_eq!(out.as_bytes(), b"{SAM0100:00026ping[seq=1]}");
        assert_eq!(out.header().total, out.len());
        assert_eq!(out.header().tag, Tag::Fixed);
    }

    #[test]
    fn test_encode_variable() {
        let out = encode(&msg(), EnvelopeFormat::Variable, PROTOCOL_MAX_TOTAL).unwrap();
        assert_eq!(out.as_bytes(), b"{SAM0101:224ping[seq=1]}");
        assert_eq!(out.clone().into_vec(), out.as_bytes());
        let (buf, start) = out.into_parts();
        assert_eq!(&buf[start..start + 1], b"{");
    }

    #[test]
    fn test_escaping_in_body() {
        let c = Container::new("a=b").with("k,", "[v]");
        let out = encode(&c, EnvelopeFormat::Auto, PROTOCOL_MAX_TOTAL).unwrap();
        let body = &out.as_bytes()[14..out.len() - 1];
        assert_eq!(body, b"a\\=b[k\\,=\\[v\\]]");
        assert_eq!(body.len(), body_len(&c));
    }

    #[test]
    fn test_nested_children() {
        let c = Container::new("r")
            .with("x", "1")
            .with_child(Container::new("c").with_child(Container::new("d")));
        let out = encode(&c, EnvelopeFormat::Auto, PROTOCOL_MAX_TOTAL).unwrap();
        assert!(out.as_bytes().ends_with(b"r[x=1,c[d[]]]}"));
    }

    #[test]
    fn test_growth_policy() {
        let mut buf = EncodeBuffer::with_capacity(0).unwrap();
        let initial = buf.capacity();
        buf.put(&[b'x'; 4]).unwrap();
        // Doubles at least
        assert!(buf.capacity() >= initial * 2);
        let before = buf.capacity();
        let big = vec![b'y'; before * 3];
        buf.put(&big).unwrap();
        // ...or jumps straight to what is needed
        assert!(buf.capacity() >= HEADROOM + 4 + big.len());
        assert_eq!(buf.body_len(), 4 + big.len());
    }

    #[test]
    fn test_large_body_grows() {
        let c = Container::new("big").with("v", "z".repeat(10_000));
        let out = encode(&c, EnvelopeFormat::Auto, PROTOCOL_MAX_TOTAL).unwrap();
        assert_eq!(out.len(), out.header().total);
        assert_eq!(out.len(), 15 + body_len(&c));
    }

    #[test]
    fn test_encode_into_exact_and_too_small() {
        let mut dest = [0u8; 64];
        let n = encode_into(&msg(), &mut dest, EnvelopeFormat::Auto, PROTOCOL_MAX_TOTAL).unwrap();
        assert_eq!(&dest[..n], b"{SAM0100:00026ping[seq=1]}");

        let mut small = [0u8; 20];
        let err =
            encode_into(&msg(), &mut small, EnvelopeFormat::Auto, PROTOCOL_MAX_TOTAL).unwrap_err();
        assert_eq!(err, WireError::DestinationTooSmall { needed: 26, available: 20 });
    }

    #[test]
    fn test_limit_rejects() {
        let c = Container::new("big").with("v", "z".repeat(200));
        let err = encode(&c, EnvelopeFormat::Auto, 100).unwrap_err();
        assert!(matches!(err, WireError::MessageTooLarge { max: 100, .. }));
    }
}
