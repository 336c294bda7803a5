//! Qualified names: paths through nested containers.
//!
//! The textual form joins components with `:`, e.g. `stats:tables:orders`.
//! A component containing reserved characters escapes them with `\`.

use core::fmt;
use std::str::FromStr;

use crate::error::WireError;
use crate::escape::{escape, is_reserved};

/// Path separator in the textual form.
pub const SEPARATOR: char = ':';

/// An ordered path of names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct QualifiedName {
    parts: Vec<String>,
}

impl QualifiedName {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, part: impl Into<String>) -> &mut Self {
        self.parts.push(part.into());
        self
    }

    /// Builder-style `push`.
    pub fn join(mut self, part: impl Into<String>) -> Self {
        self.parts.push(part.into());
        self
    }

    #[inline]
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Last component.
    pub fn leaf(&self) -> Option<&str> {
        self.parts.last().map(String::as_str)
    }

    /// Everything but the last component.
    pub fn parent(&self) -> &[String] {
        match self.parts.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }
}

impl<S: Into<String>> FromIterator<S> for QualifiedName {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self { parts: iter.into_iter().map(Into::into).collect() }
    }
}

impl FromStr for QualifiedName {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::new());
        }
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut chars = s.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, e)) if e.is_ascii() && is_reserved(e as u8) => current.push(e),
                    _ => return Err(WireError::malformed(i, "invalid escape in qualified name")),
                },
                SEPARATOR => parts.push(std::mem::take(&mut current)),
                c if c.is_ascii() && is_reserved(c as u8) => {
                    return Err(WireError::malformed(i, "unescaped reserved character"));
                }
                c => current.push(c),
            }
        }
        parts.push(current);
        Ok(Self { parts })
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", SEPARATOR)?;
            }
            write!(f, "{}", escape(part))?;
        }
        Ok(())
    }
}
