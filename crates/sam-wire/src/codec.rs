//! Codec entry points and their configuration.

use crate::container::Container;
use crate::decoder::{self, Decoded};
use crate::encoder::{self, EncodedMessage};
use crate::envelope::{EnvelopeFormat, PROTOCOL_MAX_TOTAL};
use crate::error::WireResult;

/// Default limits.
pub mod defaults {
    /// Largest message accepted or produced.
    pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
    /// Deepest container nesting accepted on decode.
    pub const MAX_DEPTH: usize = 64;
}

/// Codec limits and envelope choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfig {
    /// Total message size limit, encode and decode. Clamped to the
    /// protocol maximum.
    pub max_message_size: usize,
    /// Maximum container nesting depth on decode (root = 1).
    pub max_depth: usize,
    /// Envelope tag selection on encode.
    pub format: EnvelopeFormat,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_message_size: defaults::MAX_MESSAGE_SIZE,
            max_depth: defaults::MAX_DEPTH,
            format: EnvelopeFormat::Auto,
        }
    }
}

impl CodecConfig {
    pub fn max_message_size(mut self, n: usize) -> Self {
        self.max_message_size = n.min(PROTOCOL_MAX_TOTAL);
        self
    }

    pub fn max_depth(mut self, n: usize) -> Self {
        self.max_depth = n;
        self
    }

    pub fn format(mut self, format: EnvelopeFormat) -> Self {
        self.format = format;
        self
    }
}

/// Stateless encoder/decoder bound to a configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    config: CodecConfig,
}

impl Codec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Encode into a fresh buffer.
    pub fn encode(&self, message: &Container) -> WireResult<EncodedMessage> {
        encoder::encode(message, self.config.format, self.config.max_message_size)
    }

    /// Encode into the start of `dest`; returns the message length.
    ///
    /// The message is sized before anything is written, so a too-small
    /// `dest` fails with `DestinationTooSmall` and is left untouched.
    pub fn encode_into(&self, message: &Container, dest: &mut [u8]) -> WireResult<usize> {
        encoder::encode_into(message, dest, self.config.format, self.config.max_message_size)
    }

    /// Exact encoded size of `message`.
    pub fn encoded_len(&self, message: &Container) -> WireResult<usize> {
        let header = crate::envelope::plan(
            encoder::body_len(message),
            self.config.format,
            self.config.max_message_size,
        )?;
        Ok(header.total)
    }

    /// Decode the message at the start of `buf`.
    pub fn decode(&self, buf: &[u8]) -> WireResult<Option<Decoded>> {
        decoder::decode(buf, self.config.max_message_size, self.config.max_depth)
    }
}

/// Encode with the default configuration.
pub fn encode(message: &Container) -> WireResult<EncodedMessage> {
    Codec::default().encode(message)
}

/// Decode with the default configuration.
pub fn decode(buf: &[u8]) -> WireResult<Option<Decoded>> {
    Codec::default().decode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Tag;
    use crate::error::WireError;

    /// `m[v=...]` with `n` value bytes has a body of `n + 5`.
    fn sized(n: usize) -> Container {
        Container::new("m").with("v", "x".repeat(n))
    }

    #[test]
    fn test_declared_length_matches_span() {
        let codec = Codec::default();
        for n in [0, 1, 50, 1_000, 120_000] {
            let out = codec.encode(&sized(n)).unwrap();
            let d = codec.decode(out.as_bytes()).unwrap().unwrap();
            assert_eq!(d.consumed, out.len());
            assert_eq!(out.header().total, out.len());
            assert_eq!(codec.encoded_len(&sized(n)).unwrap(), out.len());
        }
    }

    #[test]
    fn test_variable_digit_boundary() {
        let codec = Codec::new(CodecConfig::default().format(EnvelopeFormat::Variable));
        let out = codec.encode(&sized(81)).unwrap();
        assert_eq!(out.len(), 99);
        assert!(out.as_bytes().starts_with(b"{SAM0101:299"));

        let out = codec.encode(&sized(82)).unwrap();
        assert_eq!(out.len(), 101);
        assert!(out.as_bytes().starts_with(b"{SAM0101:3101"));
        assert_eq!(codec.decode(out.as_bytes()).unwrap().unwrap().message, sized(82));
    }

    #[test]
    fn test_fixed_to_variable_boundary() {
        let codec = Codec::default();
        let out = codec.encode(&sized(99_979)).unwrap();
        assert_eq!((out.header().tag, out.len()), (Tag::Fixed, 99_999));

        let out = codec.encode(&sized(99_980)).unwrap();
        assert_eq!(out.header().tag, Tag::Variable);
        assert_eq!(out.len(), 100_002);
        assert!(out.as_bytes().starts_with(b"{SAM0101:6100002"));
        assert_eq!(codec.decode(out.as_bytes()).unwrap().unwrap().consumed, 100_002);
    }

    #[test]
    fn test_encode_into_leaves_dest_on_overflow() {
        let codec = Codec::default();
        let mut dest = [0xAAu8; 10];
        let err = codec.encode_into(&sized(4), &mut dest).unwrap_err();
        assert_eq!(err, WireError::DestinationTooSmall { needed: 24, available: 10 });
        assert!(dest.iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn test_size_limit_both_ways() {
        let small = Codec::new(CodecConfig::default().max_message_size(64));
        assert!(matches!(
            small.encode(&sized(100)),
            Err(WireError::MessageTooLarge { max: 64, .. })
        ));

        let big = Codec::default().encode(&sized(100)).unwrap();
        let err = small.decode(big.as_bytes()).unwrap_err();
        assert!(err.is_decode_error());
    }

    #[test]
    fn test_free_functions() {
        let c = Container::new("hello").with("who", "world");
        let out = encode(&c).unwrap();
        assert_eq!(decode(out.as_bytes()).unwrap().unwrap().message, c);
    }
}
