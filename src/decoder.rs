//! Streaming multipart/form-data decoder.
//!
//! The decoder pulls chunks from an [`io::Read`] source, never holding
//! more than one chunk plus a bounded carry-over in memory, and rebuilds
//! the form structure. Parts that carry a filename are spilled to
//! temporary files; everything else stays in memory as a string.
//!
//! Delimiter recognition is the hard part: `\r\n--boundary` (the CR may
//! be a bare LF on permissive input) can arrive split across any chunk
//! edge. The scanner only commits bytes to the part sink once it has
//! proven they cannot belong to a delimiter, and refills the buffer when
//! a candidate cannot be judged yet.
//!
//! On any failure the decoder removes every temporary file it created
//! during the call before surfacing the error.

use crate::boundary::{self, Delimiters};
use crate::buffer::ChunkBuffer;
use crate::error::FormError;
use crate::form::{Form, Part, PartBody, TempFile};
use crate::headers::{self, PartHeaders};
use log::debug;
use std::io::{Cursor, Read, Write};
use std::path::PathBuf;

/// Default bytes requested per pull from the source.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Default cap on the number of parts in one document.
pub const DEFAULT_MAX_PARTS: usize = 128;

/// Default cap on one part's header block.
pub const DEFAULT_MAX_HEADERS_SIZE: usize = 8 * 1024;

/// Configuration for decoding.
#[derive(Debug, Clone)]
pub struct DecodeConfig {
    /// Temp files are created at this path with a `_XXXXXX`-style suffix
    /// always appended.
    pub file_template: PathBuf,
    /// Maximum bytes per part body; `None` means unlimited.
    pub max_body_size: Option<u64>,
    /// Bytes requested per pull from the source.
    pub chunk_size: usize,
    /// Maximum number of parts in one document.
    pub max_parts: usize,
    /// Maximum size of one part's header block.
    pub max_headers_size: usize,
    /// Maximum boundary length; 0 disables the cap.
    pub max_boundary_len: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            file_template: std::env::temp_dir().join("formdrop-part"),
            max_body_size: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_parts: DEFAULT_MAX_PARTS,
            max_headers_size: DEFAULT_MAX_HEADERS_SIZE,
            max_boundary_len: boundary::MAX_BOUNDARY_LEN,
        }
    }
}

/// Decode a multipart document pulled from `reader`.
pub fn decode<R: Read>(reader: R, boundary: &str, config: DecodeConfig) -> Result<Form, FormError> {
    FormDecoder::new(reader, boundary, config)?.decode()
}

/// Decode a document that is already fully in memory.
pub fn decode_chunk(chunk: &[u8], boundary: &str, config: DecodeConfig) -> Result<Form, FormError> {
    decode(Cursor::new(chunk), boundary, config)
}

/// Where one part's body bytes go while it is being scanned.
enum PartSink {
    Text(Vec<u8>),
    File(TempFile),
}

impl PartSink {
    /// Commit body bytes, enforcing the per-part size cap against the
    /// running written-byte counter.
    fn write(&mut self, data: &[u8], written: &mut u64, max: Option<u64>) -> Result<(), FormError> {
        if data.is_empty() {
            return Ok(());
        }

        *written += data.len() as u64;
        if let Some(limit) = max {
            if *written > limit {
                return Err(FormError::BodyTooLarge(limit));
            }
        }

        match self {
            PartSink::Text(buf) => buf.extend_from_slice(data),
            PartSink::File(file) => file
                .file_mut()
                .write_all(data)
                .map_err(FormError::TempFile)?,
        }
        Ok(())
    }
}

/// Streaming decoder over a pull source.
pub struct FormDecoder<R> {
    buffer: ChunkBuffer<R>,
    delimiters: Delimiters,
    config: DecodeConfig,
}

impl<R: Read> FormDecoder<R> {
    /// Validates the boundary and chunk size before any I/O happens.
    pub fn new(reader: R, boundary: &str, config: DecodeConfig) -> Result<Self, FormError> {
        boundary::validate_boundary(boundary, config.max_boundary_len)?;
        if config.chunk_size == 0 {
            return Err(FormError::InvalidChunkSize);
        }

        Ok(Self {
            buffer: ChunkBuffer::new(reader, config.chunk_size),
            delimiters: Delimiters::new(boundary),
            config,
        })
    }

    /// Run the decode. On failure every temp file created during this
    /// call has been removed before the error is returned.
    pub fn decode(mut self) -> Result<Form, FormError> {
        let mut form = Form::new();
        match self.run(&mut form) {
            Ok(()) => Ok(form),
            Err(err) => {
                form.discard();
                Err(err)
            }
        }
    }

    fn run(&mut self, form: &mut Form) -> Result<(), FormError> {
        self.discard_preamble()?;

        let mut count = 0usize;
        loop {
            count += 1;
            if count > self.config.max_parts {
                return Err(FormError::TooManyParts(self.config.max_parts));
            }

            let (part, more) = self.decode_part()?;
            form.push(part);
            if !more {
                break;
            }
        }

        self.discard_epilogue()
    }

    /// Read one line, refilling as needed. The CR?LF terminator is
    /// consumed and stripped from the returned bytes.
    fn read_line(&mut self) -> Result<Vec<u8>, FormError> {
        loop {
            if let Some(pos) = self.buffer.data().iter().position(|&b| b == b'\n') {
                let mut line = self.buffer.data()[..pos].to_vec();
                self.buffer.consume(pos + 1);
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(line);
            }
            self.buffer.require()?;
        }
    }

    /// Drop lines until the opening dash-boundary. A close delimiter
    /// before any part is a hard error.
    fn discard_preamble(&mut self) -> Result<(), FormError> {
        let open = self.delimiters.dash_boundary.clone();
        let close = self.delimiters.close_line();

        loop {
            let line = self.read_line()?;
            let line = trim_transport_padding(&line);
            if line == close {
                return Err(FormError::PrematureClose);
            }
            if line == open {
                return Ok(());
            }
            // unknown preamble lines are dropped
        }
    }

    fn decode_part(&mut self) -> Result<(Part, bool), FormError> {
        let headers = self.read_headers()?;
        let name = headers.name()?;
        let filename = headers.filename();

        let mut sink = if filename.is_some() {
            PartSink::File(TempFile::create(&self.config.file_template)?)
        } else {
            PartSink::Text(Vec::new())
        };

        let mut written = 0u64;
        let more = self.scan_body(&mut sink, &mut written)?;

        let body = match sink {
            PartSink::Text(data) => PartBody::Text(String::from_utf8_lossy(&data).into_owned()),
            PartSink::File(mut file) => {
                file.rewind().map_err(FormError::TempFile)?;
                PartBody::File(file)
            }
        };

        debug!("Decoded part {name:?} ({written} body bytes)");
        Ok((
            Part { name, filename, headers: headers.map, body },
            more,
        ))
    }

    /// Read the header block up to and including the blank line.
    fn read_headers(&mut self) -> Result<PartHeaders, FormError> {
        let mut headers = PartHeaders::new();
        let mut total = 0usize;

        loop {
            let line = self.read_line()?;
            total += line.len() + 2;
            if total > self.config.max_headers_size {
                return Err(FormError::HeadersTooLarge(self.config.max_headers_size));
            }
            if headers::is_blank_line(&line) {
                return Ok(headers);
            }
            headers.push_line(&line)?;
        }
    }

    /// Stream body bytes into `sink` until the next delimiter line.
    ///
    /// Returns `true` when another part follows, `false` on the close
    /// delimiter. Bytes are committed as soon as they are proven not to
    /// be part of a delimiter, so the carry-over buffer stays bounded by
    /// one chunk plus the delimiter length.
    fn scan_body(&mut self, sink: &mut PartSink, written: &mut u64) -> Result<bool, FormError> {
        let dash = self.delimiters.dash_boundary.clone();
        // after the LF there must be room for the dash-boundary and the
        // two bytes that distinguish a close delimiter
        let lookahead = dash.len() + 2;
        let max = self.config.max_body_size;

        loop {
            loop {
                let data = self.buffer.data();

                let Some(lf) = data.iter().position(|&b| b == b'\n') else {
                    // No line break in view: everything except a trailing
                    // CR is body, whatever arrives next.
                    let commit = data.len() - usize::from(data.ends_with(b"\r"));
                    if commit > 0 {
                        let chunk = &self.buffer.data()[..commit];
                        sink.write(chunk, written, max)?;
                        self.buffer.consume(commit);
                    }
                    break;
                };

                let after = lf + 1;
                let body_end = if lf > 0 && data[lf - 1] == b'\r' { lf - 1 } else { lf };

                if data.len() - after < lookahead {
                    // Cannot judge the candidate yet. Bytes before the
                    // CR/LF are body either way; commit them so the
                    // buffer never accumulates a part.
                    if body_end > 0 {
                        sink.write(&data[..body_end], written, max)?;
                        self.buffer.consume(body_end);
                    }
                    break;
                }

                if data[after..].starts_with(&dash) {
                    // the two bytes after the dash-boundary decide between
                    // close delimiter, ordinary delimiter line, and body
                    // text that merely starts with the boundary
                    let t0 = data[after + dash.len()];
                    let t1 = data[after + dash.len() + 1];

                    if t0 == b'-' && t1 == b'-' {
                        sink.write(&data[..body_end], written, max)?;
                        self.buffer.consume(after + dash.len() + 2);
                        return Ok(false);
                    }

                    if matches!(t0, b'\r' | b'\n' | b' ' | b'\t') {
                        sink.write(&data[..body_end], written, max)?;
                        self.buffer.consume(after + dash.len());
                        // transport padding up to the line break
                        self.read_line()?;
                        return Ok(true);
                    }
                    // fall through: boundary-prefixed body text
                }

                // An ordinary line break inside the body.
                sink.write(&data[..=lf], written, max)?;
                self.buffer.consume(after);
            }

            // Refill gate: the carry-over can hold at most the delimiter
            // tail beyond real body bytes, so anything past that proves
            // the part is over the cap even before the sink sees it.
            if let Some(limit) = max {
                let pending = self.buffer.len() as u64;
                if *written + pending > limit + lookahead as u64 + 2 {
                    return Err(FormError::BodyTooLarge(limit));
                }
            }

            self.buffer.require()?;
        }
    }

    /// Read and discard everything after the close delimiter.
    fn discard_epilogue(&mut self) -> Result<(), FormError> {
        self.buffer.drain_to_eof()
    }
}

/// Strip the trailing whitespace tolerated after a delimiter line.
fn trim_transport_padding(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b' ' || line[end - 1] == b'\t') {
        end -= 1;
    }
    &line[..end]
}
