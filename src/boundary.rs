//! Boundary grammar validation and delimiter derivation.
//!
//! A boundary is 1-70 octets drawn from the RFC 2046 `bchars` set, with
//! interior spaces permitted but no trailing space. The derived byte
//! strings used by the scanners (`--boundary`, `\r\n--boundary`) are
//! computed once per codec instance and cached in [`Delimiters`].

use crate::error::FormError;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// RFC 2046 limits multipart boundaries to 70 octets.
pub const MAX_BOUNDARY_LEN: usize = 70;

/// Length of generated boundaries, dash padding included.
const GENERATED_BOUNDARY_LEN: usize = 40;

/// `bcharsnospace` from RFC 2046 section 5.1.1.
fn is_bchar_nospace(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'\'' | b'(' | b')' | b'+' | b'_' | b',' | b'-' | b'.' | b'/' | b':' | b'=' | b'?'
        )
}

/// Validate a boundary against the RFC 2046 grammar.
///
/// Scans every byte against `bchars` (interior SPACE allowed), rejects a
/// trailing space, and reports the first offending byte together with its
/// position. `max_len` caps the length; pass 0 to disable the cap.
pub fn validate_boundary(boundary: &str, max_len: usize) -> Result<(), FormError> {
    let bytes = boundary.as_bytes();

    if bytes.is_empty() || (max_len > 0 && bytes.len() > max_len) {
        return Err(FormError::BoundaryLength {
            len: bytes.len(),
            max: if max_len > 0 { max_len } else { MAX_BOUNDARY_LEN },
        });
    }

    for (position, &byte) in bytes.iter().enumerate() {
        let last = position == bytes.len() - 1;
        let ok = if last { is_bchar_nospace(byte) } else { is_bchar_nospace(byte) || byte == b' ' };
        if !ok {
            return Err(FormError::InvalidBoundary { position, byte });
        }
    }

    Ok(())
}

/// Delimiter byte strings derived from a validated boundary.
///
/// Body scanning looks for `CR? LF` followed by the dash-boundary, so the
/// cached form is the dash-boundary itself; the line-break prefix is
/// matched byte-wise to admit bare-LF input.
#[derive(Debug, Clone)]
pub struct Delimiters {
    /// `--boundary`, the prefix of every delimiter line.
    pub dash_boundary: Vec<u8>,
}

impl Delimiters {
    pub fn new(boundary: &str) -> Self {
        let mut dash_boundary = Vec::with_capacity(boundary.len() + 2);
        dash_boundary.extend_from_slice(b"--");
        dash_boundary.extend_from_slice(boundary.as_bytes());
        Self { dash_boundary }
    }

    /// `--boundary--`, the close delimiter line.
    pub fn close_line(&self) -> Vec<u8> {
        let mut line = self.dash_boundary.clone();
        line.extend_from_slice(b"--");
        line
    }
}

/// Extract and validate the `boundary` parameter from a Content-Type value.
pub fn boundary_from_content_type(content_type: &str) -> Result<String, FormError> {
    if !content_type
        .trim_start()
        .to_lowercase()
        .starts_with("multipart/form-data")
    {
        return Err(FormError::InvalidContentType(
            "not multipart/form-data".to_string(),
        ));
    }

    for param in content_type.split(';').skip(1) {
        let param = param.trim();
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("boundary") {
            let boundary = value.trim().trim_matches('"');
            validate_boundary(boundary, MAX_BOUNDARY_LEN)?;
            return Ok(boundary.to_string());
        }
    }

    Err(FormError::InvalidContentType(
        "no boundary parameter".to_string(),
    ))
}

static NONCE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Produce `len` filesystem- and boundary-safe pseudo-random characters.
///
/// Seeded from the clock, the process id and a process-wide counter, so
/// consecutive calls never collide within a process.
pub(crate) fn nonce_chars(len: usize) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let counter = NONCE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut state = nanos ^ (u64::from(process::id()) << 32) ^ counter.wrapping_mul(0x9E37_79B9_7F4A_7C15);

    let mut out = String::with_capacity(len);
    for _ in 0..len {
        // xorshift64
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        out.push(ALPHABET[(state % ALPHABET.len() as u64) as usize] as char);
    }
    out
}

/// Generate a fresh boundary suitable for a new encoded document.
///
/// The nonce is dash-padded to a fixed width, so the result is visually
/// similar to browser-generated boundaries and always passes
/// [`validate_boundary`].
pub fn generate_boundary() -> String {
    format!("{:->width$}", nonce_chars(24), width = GENERATED_BOUNDARY_LEN)
}
