//! SAM envelope: `{` + tag + `:` + length + body + `}`.
//!
//! ```text
//!  fixed     {SAM0100:00042name[k=v]}       length = 5 digits, total ≤ 99999
//!  variable  {SAM0101:6100042name[...]}     length = 1 digit D, then D digits
//! ```
//!
//! The length is the total byte span from `{` to `}` inclusive. Because
//! the variable form's length field is part of the total, adding a digit
//! can push the total over a power of ten; `plan` iterates until the
//! digit count is self-consistent.

use crate::error::{WireError, WireResult};

/// Format tag length in bytes.
pub const TAG_LEN: usize = 7;
/// Fixed-width tag: five length digits.
pub const TAG_FIXED: &[u8; TAG_LEN] = b"SAM0100";
/// Variable-width tag: one digit-count digit, then that many digits.
pub const TAG_VARIABLE: &[u8; TAG_LEN] = b"SAM0101";

pub const OPEN: u8 = b'{';
pub const CLOSE: u8 = b'}';
pub const TAG_SEP: u8 = b':';

/// Digits in the fixed-width length field.
pub const FIXED_DIGITS: usize = 5;
/// Largest total expressible with the fixed-width tag.
pub const FIXED_MAX_TOTAL: usize = 99_999;
/// Largest digit count of the variable-width length field.
pub const MAX_VARIABLE_DIGITS: usize = 9;
/// Protocol maximum message size.
pub const PROTOCOL_MAX_TOTAL: usize = 999_999_999;
/// Header headroom reserved in front of an encoded body.
pub const MAX_HEADER_LEN: usize = 1 + TAG_LEN + 1 + 1 + MAX_VARIABLE_DIGITS;

/// Which tag the encoder may choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeFormat {
    /// Fixed when the total fits, variable otherwise.
    #[default]
    Auto,
    /// Always fixed; larger messages are rejected.
    Fixed,
    /// Always variable.
    Variable,
}

/// Tag of a concrete envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Fixed,
    Variable,
}

impl Tag {
    pub const fn bytes(self) -> &'static [u8; TAG_LEN] {
        match self {
            Tag::Fixed => TAG_FIXED,
            Tag::Variable => TAG_VARIABLE,
        }
    }
}

/// A planned or parsed envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub tag: Tag,
    /// Digits in the length value.
    pub digits: usize,
    /// Total message length, `{` through `}`.
    pub total: usize,
}

impl Header {
    /// Bytes from `{` up to the first body byte.
    #[inline]
    pub const fn len(&self) -> usize {
        match self.tag {
            Tag::Fixed => 1 + TAG_LEN + 1 + FIXED_DIGITS,
            Tag::Variable => 1 + TAG_LEN + 1 + 1 + self.digits,
        }
    }

    /// Body bytes between the header and the closing `}`.
    #[inline]
    pub const fn body_len(&self) -> usize {
        self.total - self.len() - 1
    }

    /// Serialize into `out`, which must be exactly `self.len()` bytes.
    pub fn write(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), self.len());
        out[0] = OPEN;
        out[1..1 + TAG_LEN].copy_from_slice(self.tag.bytes());
        out[1 + TAG_LEN] = TAG_SEP;
        let digits_at = match self.tag {
            Tag::Fixed => 2 + TAG_LEN,
            Tag::Variable => {
                out[2 + TAG_LEN] = b'0' + self.digits as u8;
                3 + TAG_LEN
            }
        };
        write_decimal(&mut out[digits_at..], self.total);
    }
}

/// Number of decimal digits in `n` (at least 1).
#[inline]
pub const fn decimal_width(mut n: usize) -> usize {
    let mut width = 1;
    while n >= 10 {
        n /= 10;
        width += 1;
    }
    width
}

/// Write `n` right-aligned and zero-padded into all of `out`.
fn write_decimal(out: &mut [u8], mut n: usize) {
    for slot in out.iter_mut().rev() {
        *slot = b'0' + (n % 10) as u8;
        n /= 10;
    }
}

/// Choose a header for a body of `body_len` bytes.
///
/// `limit` is the caller's maximum total (clamped to the protocol max).
pub fn plan(body_len: usize, format: EnvelopeFormat, limit: usize) -> WireResult<Header> {
    let limit = limit.min(PROTOCOL_MAX_TOTAL);
    let fixed_total = body_len.saturating_add(1 + TAG_LEN + 1 + FIXED_DIGITS + 1);

    let header = match format {
        EnvelopeFormat::Fixed if fixed_total > FIXED_MAX_TOTAL => {
            return Err(WireError::MessageTooLarge {
                size: fixed_total,
                max: FIXED_MAX_TOTAL.min(limit),
            });
        }
        EnvelopeFormat::Auto | EnvelopeFormat::Fixed if fixed_total <= FIXED_MAX_TOTAL => Header {
            tag: Tag::Fixed,
            digits: FIXED_DIGITS,
            total: fixed_total,
        },
        _ => plan_variable(body_len)?,
    };

    if header.total > limit {
        return Err(WireError::MessageTooLarge { size: header.total, max: limit });
    }
    Ok(header)
}

/// Smallest self-consistent digit count for the variable form.
fn plan_variable(body_len: usize) -> WireResult<Header> {
    let total_for = |digits: usize| body_len.saturating_add(1 + TAG_LEN + 1 + 1 + digits + 1);

    let mut digits = 1;
    loop {
        let total = total_for(digits);
        let width = decimal_width(total);
        if width <= digits {
            return Ok(Header { tag: Tag::Variable, digits, total });
        }
        if width > MAX_VARIABLE_DIGITS {
            return Err(WireError::MessageTooLarge { size: total, max: PROTOCOL_MAX_TOTAL });
        }
        // One more digit can itself cross the next power of ten; go round.
        digits = width;
    }
}

/// Parse the header at the start of `buf`.
///
/// Returns `Ok(None)` while the header is incomplete. Bytes that are
/// present are validated immediately, so garbage is rejected early.
pub fn parse(buf: &[u8], limit: usize) -> WireResult<Option<Header>> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    if first != OPEN {
        return Err(WireError::malformed(0, "expected '{'"));
    }

    // Tag: compare whatever prefix is available.
    let tag_avail = &buf[1..buf.len().min(1 + TAG_LEN)];
    let tag = if TAG_FIXED.starts_with(tag_avail) && tag_avail.len() == TAG_LEN {
        Tag::Fixed
    } else if TAG_VARIABLE.starts_with(tag_avail) && tag_avail.len() == TAG_LEN {
        Tag::Variable
    } else if TAG_FIXED.starts_with(tag_avail) || TAG_VARIABLE.starts_with(tag_avail) {
        return Ok(None);
    } else {
        return Err(WireError::malformed(1, "unknown format tag"));
    };

    match buf.get(1 + TAG_LEN) {
        None => return Ok(None),
        Some(&TAG_SEP) => {}
        Some(_) => return Err(WireError::malformed(1 + TAG_LEN, "expected ':' after tag")),
    }

    let (digits_at, digits) = match tag {
        Tag::Fixed => (2 + TAG_LEN, FIXED_DIGITS),
        Tag::Variable => match buf.get(2 + TAG_LEN) {
            None => return Ok(None),
            Some(&d) if (b'1'..=b'9').contains(&d) => (3 + TAG_LEN, (d - b'0') as usize),
            Some(_) => return Err(WireError::malformed(2 + TAG_LEN, "invalid digit count")),
        },
    };

    let avail = &buf[digits_at.min(buf.len())..buf.len().min(digits_at + digits)];
    let mut total = 0usize;
    for (i, &b) in avail.iter().enumerate() {
        if !b.is_ascii_digit() {
            return Err(WireError::malformed(digits_at + i, "non-digit in length"));
        }
        total = total * 10 + (b - b'0') as usize;
    }
    if avail.len() < digits {
        return Ok(None);
    }

    let header = Header { tag, digits, total };
    if total < header.len() + 1 {
        return Err(WireError::malformed(digits_at, "declared length shorter than header"));
    }
    let limit = limit.min(PROTOCOL_MAX_TOTAL);
    if total > limit {
        return Err(WireError::malformed(digits_at, "declared length exceeds limit"));
    }
    Ok(Some(header))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(h: &Header) -> String {
        let mut out = vec![0u8; h.len()];
        h.write(&mut out);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_decimal_width() {
        assert_eq!(decimal_width(0), 1);
        assert_eq!(decimal_width(9), 1);
        assert_eq!(decimal_width(10), 2);
        assert_eq!(decimal_width(99_999), 5);
        assert_eq!(decimal_width(100_000), 6);
    }

    #[test]
    fn test_fixed_header() {
        let h = plan(10, EnvelopeFormat::Auto, PROTOCOL_MAX_TOTAL).unwrap();
        assert_eq!(h.tag, Tag::Fixed);
        assert_eq!(h.total, 25);
        assert_eq!(h.body_len(), 10);
        assert_eq!(render(&h), "{SAM0100:00025");
    }

    #[test]
    fn test_variable_digit_boundary() {
        // header = 10 + D, total = 11 + D + body
        let h = plan(86, EnvelopeFormat::Variable, PROTOCOL_MAX_TOTAL).unwrap();
        assert_eq!((h.digits, h.total), (2, 99));
        assert_eq!(render(&h), "{SAM0101:299");

        // 87 body bytes: 2 digits would give 100, which needs 3 → 101
        let h = plan(87, EnvelopeFormat::Variable, PROTOCOL_MAX_TOTAL).unwrap();
        assert_eq!((h.digits, h.total), (3, 101));
        assert_eq!(render(&h), "{SAM0101:3101");

        let h = plan(0, EnvelopeFormat::Variable, PROTOCOL_MAX_TOTAL).unwrap();
        assert_eq!((h.digits, h.total), (2, 13));
    }

    #[test]
    fn test_variable_always_consistent() {
        for body in 0..20_000 {
            let h = plan(body, EnvelopeFormat::Variable, PROTOCOL_MAX_TOTAL).unwrap();
            assert_eq!(decimal_width(h.total), h.digits, "body {}", body);
            assert_eq!(h.body_len(), body);
        }
    }

    #[test]
    fn test_auto_switches_at_fixed_limit() {
        let h = plan(99_984, EnvelopeFormat::Auto, PROTOCOL_MAX_TOTAL).unwrap();
        assert_eq!((h.tag, h.total), (Tag::Fixed, 99_999));

        let h = plan(99_985, EnvelopeFormat::Auto, PROTOCOL_MAX_TOTAL).unwrap();
        assert_eq!(h.tag, Tag::Variable);
        assert_eq!((h.digits, h.total), (6, 100_002));
    }

    #[test]
    fn test_fixed_only_rejects_large() {
        let err = plan(99_985, EnvelopeFormat::Fixed, PROTOCOL_MAX_TOTAL).unwrap_err();
        assert_eq!(err, WireError::MessageTooLarge { size: 100_000, max: FIXED_MAX_TOTAL });
    }

    #[test]
    fn test_limit_enforced() {
        let err = plan(100, EnvelopeFormat::Auto, 64).unwrap_err();
        assert!(matches!(err, WireError::MessageTooLarge { size: 115, max: 64 }));
        assert!(plan(PROTOCOL_MAX_TOTAL, EnvelopeFormat::Auto, usize::MAX).is_err());
    }

    #[test]
    fn test_parse_roundtrip() {
        for (body, format) in [(10, EnvelopeFormat::Auto), (87, EnvelopeFormat::Variable)] {
            let h = plan(body, format, PROTOCOL_MAX_TOTAL).unwrap();
            let text = render(&h);
            assert_eq!(parse(text.as_bytes(), PROTOCOL_MAX_TOTAL).unwrap(), Some(h));
        }
    }

    #[test]
    fn test_parse_prefixes_incomplete() {
        let text = b"{SAM0101:3101";
        for cut in 0..text.len() {
            assert_eq!(parse(&text[..cut], PROTOCOL_MAX_TOTAL).unwrap(), None, "cut {}", cut);
        }
    }

    #[test]
    fn test_parse_rejects_garbage_early() {
        assert!(parse(b"x", PROTOCOL_MAX_TOTAL).is_err());
        assert!(parse(b"{SAX", PROTOCOL_MAX_TOTAL).is_err());
        assert!(parse(b"{SAM0100;", PROTOCOL_MAX_TOTAL).is_err());
        assert!(parse(b"{SAM0100:00a", PROTOCOL_MAX_TOTAL).is_err());
        assert!(parse(b"{SAM0101:0", PROTOCOL_MAX_TOTAL).is_err());
        // declared total smaller than the header itself
        assert!(parse(b"{SAM0100:00010", PROTOCOL_MAX_TOTAL).is_err());
    }

    #[test]
    fn test_parse_enforces_limit() {
        let err = parse(b"{SAM0100:99999", 1024).unwrap_err();
        assert_eq!(err, WireError::malformed(9, "declared length exceeds limit"));
        assert!(err.is_decode_error());
    }
}
