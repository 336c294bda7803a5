//! Escaping of reserved characters.
//!
//! Names and values are written verbatim except for the reserved
//! delimiters, which are prefixed with `\`. A `\` may only ever be
//! followed by a reserved byte; anything else is malformed on decode.

use crate::encoder::ByteSink;
use crate::error::WireResult;

/// Escape prefix.
pub const ESCAPE: u8 = b'\\';

/// Bytes that must be escaped inside names and values.
pub const RESERVED: [u8; 6] = [b'[', b']', b',', b'=', b':', ESCAPE];

#[inline]
pub const fn is_reserved(b: u8) -> bool {
    matches!(b, b'[' | b']' | b',' | b'=' | b':' | b'\\')
}

/// Length of `s` once escaped.
#[inline]
pub fn escaped_len(s: &str) -> usize {
    s.len() + s.bytes().filter(|b| is_reserved(*b)).count()
}

/// Write `s` escaped into `sink`, copying unreserved runs in one go.
pub(crate) fn write_escaped<S: ByteSink + ?Sized>(sink: &mut S, s: &str) -> WireResult<()> {
    let bytes = s.as_bytes();
    let mut run = 0;
    for (i, &b) in bytes.iter().enumerate() {
        if is_reserved(b) {
            sink.put(&bytes[run..i])?;
            sink.put(&[ESCAPE, b])?;
            run = i + 1;
        }
    }
    sink.put(&bytes[run..])
}

/// Escape into a new string.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(escaped_len(s));
    for c in s.chars() {
        if c.is_ascii() && is_reserved(c as u8) {
            out.push(ESCAPE as char);
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_all_reserved() {
        assert_eq!(escape("a[b]c,d=e:f\\g"), "a\\[b\\]c\\,d\\=e\\:f\\\\g");
        assert_eq!(escaped_len("a[b]c,d=e:f\\g"), 13 + 6);
    }

    #[test]
    fn test_escape_plain_and_unicode() {
        assert_eq!(escape("plain text"), "plain text");
        assert_eq!(escape("größe=1"), "größe\\=1");
        assert_eq!(escaped_len("größe=1"), "größe=1".len() + 1);
    }

    #[test]
    fn test_write_escaped_matches_escape() {
        let s = "x=[1,2]:\\";
        let mut out = Vec::new();
        write_escaped(&mut out, s).unwrap();
        assert_eq!(out, escape(s).into_bytes());
        assert_eq!(out.len(), escaped_len(s));
    }

    #[test]
    fn test_reserved_table() {
        for b in RESERVED {
            assert!(is_reserved(b));
        }
        assert!(!is_reserved(b'{'));
        assert!(!is_reserved(b'a'));
    }
}
