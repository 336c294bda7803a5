//! # sam-wire
//!
//! The SAM wire protocol: container trees, qualified names and the
//! self-delimiting envelope that frames them on a byte stream.
//!
//! ```text
//!   {SAM0100:00033ping[seq=1,who=me]}
//!   │ └─tag─┘ └len┘ └───── body ─────┘│
//! ```
//!
//! Encoding and decoding are stateless. `decode` returns `Ok(None)` for
//! incomplete input so callers can retry once more bytes arrive.

pub mod codec;
pub mod container;
pub mod decoder;
pub mod encoder;
pub mod envelope;
pub mod error;
pub mod escape;
pub mod qname;

pub use codec::{decode, encode, Codec, CodecConfig};
pub use container::{Container, Field, Item};
pub use decoder::Decoded;
pub use encoder::EncodedMessage;
pub use envelope::{EnvelopeFormat, Header, Tag, PROTOCOL_MAX_TOTAL};
pub use error::{WireError, WireResult};
pub use qname::QualifiedName;
