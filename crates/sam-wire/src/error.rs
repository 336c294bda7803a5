//! Wire codec error types.

use thiserror::Error;

/// Result type for codec operations
pub type WireResult<T> = Result<T, WireError>;

/// Codec errors.
///
/// "Incomplete input" is not an error: `decode` returns `Ok(None)` and the
/// caller retries once more bytes have arrived.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// A fixed-capacity destination cannot hold the encoded message.
    #[error("destination too small: need {needed} bytes, have {available}")]
    DestinationTooSmall { needed: usize, available: usize },

    /// The message exceeds the protocol maximum or the configured limit.
    #[error("message of {size} bytes exceeds maximum of {max}")]
    MessageTooLarge { size: usize, max: usize },

    /// Growing the encode buffer failed.
    #[error("failed to grow encode buffer to {requested} bytes")]
    AllocationFailed { requested: usize },

    /// Input is not a valid SAM envelope or body.
    #[error("malformed message at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: &'static str },
}

impl WireError {
    #[inline]
    pub(crate) fn malformed(offset: usize, reason: &'static str) -> Self {
        WireError::Malformed { offset, reason }
    }

    /// Whether the error concerns inbound data (as opposed to a message
    /// we failed to produce).
    pub fn is_decode_error(&self) -> bool {
        matches!(self, WireError::Malformed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_overflow_errors() {
        let small = WireError::DestinationTooSmall { needed: 40, available: 16 };
        let large = WireError::MessageTooLarge { size: 200_000, max: 99_999 };
        assert_ne!(small, large);
        assert_eq!(small.to_string(), "destination too small: need 40 bytes, have 16");
        assert_eq!(
            large.to_string(),
            "message of 200000 bytes exceeds maximum of 99999"
        );
        assert!(!small.is_decode_error());
        assert!(WireError::malformed(3, "bad tag").is_decode_error());
    }
}
