//! # formdrop
//!
//! A streaming `multipart/form-data` (RFC 2046 / RFC 7578) encoder and
//! decoder.
//!
//! The decoder pulls fixed-size chunks from any [`std::io::Read`] source,
//! recognizes delimiters even when they straddle chunk edges, keeps small
//! parts in memory and spills file-bearing parts to temporary files that
//! are cleaned up automatically on every failure path. The encoder walks
//! a form description and renders it through a pluggable sink, streaming
//! file bodies without loading them.
//!
//! ```no_run
//! use formdrop::{decode_chunk, encode, DecodeConfig, EncodeConfig, FormData, IoSink};
//!
//! fn roundtrip() -> Result<(), formdrop::FormError> {
//!     let mut form = FormData::new();
//!     form.add_text("greeting", "hello");
//!     form.add_file("upload", "notes.txt");
//!
//!     let mut sink = IoSink(Vec::new());
//!     encode(&mut sink, &mut form, "x-boundary-1", EncodeConfig::default())?;
//!
//!     let decoded = decode_chunk(&sink.0, "x-boundary-1", DecodeConfig::default())?;
//!     assert_eq!(decoded.get("greeting").and_then(|p| p.text()), Some("hello"));
//!     Ok(())
//! }
//! ```

pub mod boundary;
pub mod buffer;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod form;
pub mod headers;

pub use boundary::{boundary_from_content_type, generate_boundary, validate_boundary};
pub use decoder::{decode, decode_chunk, DecodeConfig, FormDecoder};
pub use encoder::{
    encode, EncodeConfig, FieldValue, FormData, FormEncoder, FormSink, IoSink, PartMeta, PartSpec,
    Scalar,
};
pub use error::FormError;
pub use form::{Form, Part, PartBody, TempFile};
