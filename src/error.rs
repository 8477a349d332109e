// SPDX-License-Identifier: MIT

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum FormError {
    // Argument errors, reported before any I/O
    InvalidBoundary { position: usize, byte: u8 },
    BoundaryLength { len: usize, max: usize },
    InvalidChunkSize,
    InvalidContentType(String),
    // Encode-side errors
    InvalidPart { name: String, field: &'static str },
    FileOpenFailed { path: PathBuf, name: String, source: std::io::Error },
    Writer(std::io::Error),
    // Decode-side errors
    InsufficientData,
    InvalidHeader(String),
    MissingName,
    PrematureClose,
    BodyTooLarge(u64),      // Contains the maximum allowed size
    TooManyParts(usize),    // Contains the configured part limit
    HeadersTooLarge(usize), // Contains the configured header-block limit
    Reader(std::io::Error),
    TempFile(std::io::Error),
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormError::InvalidBoundary { position, byte } => {
                write!(
                    f,
                    "Invalid boundary: illegal character {:?} at byte {position}",
                    *byte as char
                )
            }
            FormError::BoundaryLength { len, max } => {
                write!(f, "Invalid boundary length: {len} bytes, allowed 1..={max}")
            }
            FormError::InvalidChunkSize => write!(f, "Chunk size must be a positive integer"),
            FormError::InvalidContentType(detail) => {
                write!(f, "Invalid Content-Type: {detail}")
            }
            FormError::InvalidPart { name, field } => {
                write!(f, "Invalid part '{name}': malformed {field}")
            }
            FormError::FileOpenFailed { path, name, source } => {
                write!(f, "Failed to open {path:?} for part '{name}': {source}")
            }
            FormError::Writer(err) => write!(f, "Writer failure: {err}"),
            FormError::InsufficientData => {
                write!(f, "Unexpected end of input before a closing delimiter")
            }
            FormError::InvalidHeader(line) => write!(f, "Invalid part header: {line:?}"),
            FormError::MissingName => {
                write!(f, "Content-Disposition is missing the 'name' parameter")
            }
            FormError::PrematureClose => {
                write!(f, "Close delimiter seen before any body part")
            }
            FormError::BodyTooLarge(max_size) => {
                write!(
                    f,
                    "Part body too large. Maximum allowed size: {max_size} bytes"
                )
            }
            FormError::TooManyParts(max) => {
                write!(f, "Too many parts: maximum {max} allowed")
            }
            FormError::HeadersTooLarge(max) => {
                write!(f, "Part header block too large: maximum {max} bytes allowed")
            }
            FormError::Reader(err) => write!(f, "Reader failure: {err}"),
            FormError::TempFile(err) => write!(f, "Temporary file failure: {err}"),
        }
    }
}

impl std::error::Error for FormError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FormError::FileOpenFailed { source, .. } => Some(source),
            FormError::Writer(err) | FormError::Reader(err) | FormError::TempFile(err) => {
                Some(err)
            }
            _ => None,
        }
    }
}

impl FormError {
    /// Creates an InvalidPart error for a part field that would corrupt the framing
    pub fn invalid_part<S: Into<String>>(name: S, field: &'static str) -> Self {
        FormError::InvalidPart { name: name.into(), field }
    }

    /// Creates a FileOpenFailed error
    pub fn file_open_failed<S: Into<String>>(
        path: PathBuf,
        name: S,
        source: std::io::Error,
    ) -> Self {
        FormError::FileOpenFailed { path, name: name.into(), source }
    }

    /// Creates an InvalidHeader error carrying the offending line
    pub fn invalid_header<S: Into<String>>(line: S) -> Self {
        FormError::InvalidHeader(line.into())
    }

    /// Checks if the error belongs to the decode pipeline
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            FormError::InsufficientData
                | FormError::InvalidHeader(_)
                | FormError::MissingName
                | FormError::PrematureClose
                | FormError::BodyTooLarge(_)
                | FormError::TooManyParts(_)
                | FormError::HeadersTooLarge(_)
                | FormError::Reader(_)
                | FormError::TempFile(_)
        )
    }

    /// Checks if the error belongs to the encode pipeline
    pub fn is_encode_error(&self) -> bool {
        matches!(
            self,
            FormError::InvalidPart { .. }
                | FormError::FileOpenFailed { .. }
                | FormError::Writer(_)
        )
    }
}
