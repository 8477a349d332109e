//! multipart/form-data encoder.
//!
//! The encoder walks a [`FormData`] and renders each entry between
//! dash-boundary lines, ending with the bare close delimiter. Scalar
//! values become in-memory `Content-Disposition: form-data` parts;
//! file-backed parts are streamed through the sink's
//! [`write_file`](FormSink::write_file) so a smart sink can splice them
//! without copying.

use crate::boundary::{self, Delimiters};
use crate::error::FormError;
use log::{debug, warn};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Default bytes copied per step by the fallback `write_file`.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Configuration for encoding.
#[derive(Debug, Clone)]
pub struct EncodeConfig {
    /// Chunk size handed to [`FormSink::write_file`] implementations.
    pub chunk_size: usize,
    /// Maximum boundary length; 0 disables the cap.
    pub max_boundary_len: usize,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE, max_boundary_len: boundary::MAX_BOUNDARY_LEN }
    }
}

/// A scalar form value; encoded via its textual representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Str(s) => f.write_str(s),
            Scalar::Int(n) => write!(f, "{n}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Bool(b) => f.write_str(if *b { "true" } else { "false" }),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Str(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Str(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

/// A fully specified part: optional extra headers plus a body source.
///
/// The body is picked by priority: an open `file` handle first, then a
/// `pathname` the encoder opens itself, then in-memory `data`. A part
/// with a filename but neither source is skipped with a warning.
#[derive(Debug, Default)]
pub struct PartSpec {
    /// Extra headers written before the Content-Disposition line. Keys
    /// that are empty or contain whitespace are silently dropped.
    pub headers: Vec<(String, String)>,
    pub filename: Option<String>,
    pub file: Option<File>,
    pub pathname: Option<PathBuf>,
    pub data: Option<Scalar>,
}

/// One entry under a field name.
#[derive(Debug)]
pub enum FieldValue {
    Scalar(Scalar),
    Part(PartSpec),
}

/// The encoder-side form: field name to its values in insertion order.
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, Vec<FieldValue>>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a scalar value under `name`.
    pub fn add_text<S: Into<Scalar>>(&mut self, name: &str, value: S) -> &mut Self {
        self.fields
            .entry(name.to_string())
            .or_default()
            .push(FieldValue::Scalar(value.into()));
        self
    }

    /// Append a file part under `name`, streamed from `pathname` at
    /// encode time. The filename defaults to the path's final component.
    pub fn add_file<P: AsRef<Path>>(&mut self, name: &str, pathname: P) -> &mut Self {
        let pathname = pathname.as_ref().to_path_buf();
        let filename = pathname
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.add_part(
            name,
            PartSpec { filename: Some(filename), pathname: Some(pathname), ..PartSpec::default() },
        )
    }

    /// Append a fully specified part under `name`.
    pub fn add_part(&mut self, name: &str, part: PartSpec) -> &mut Self {
        self.fields
            .entry(name.to_string())
            .or_default()
            .push(FieldValue::Part(part));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.values().map(Vec::len).sum()
    }
}

/// Metadata handed to [`FormSink::write_file`] alongside the handle.
#[derive(Debug)]
pub struct PartMeta<'a> {
    pub name: &'a str,
    pub filename: &'a str,
    /// True when the encoder opened the handle itself (from `pathname`);
    /// the handle is closed by the encoder on every exit path, so a sink
    /// duplicating the descriptor must not outlive the call.
    pub owns_file: bool,
}

/// The push sink the encoder writes into.
///
/// `write_file` has a chunked seek-and-copy fallback; sinks that can
/// splice from a descriptor (sendfile and friends) override it.
pub trait FormSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize>;

    fn write_file(
        &mut self,
        file: &mut File,
        length: u64,
        offset: u64,
        meta: &PartMeta<'_>,
        chunk_size: usize,
    ) -> std::io::Result<u64> {
        let _ = meta;
        file.seek(SeekFrom::Start(offset))?;

        let mut scratch = vec![0u8; chunk_size];
        let mut remaining = length;
        let mut moved = 0u64;

        while remaining > 0 {
            let want = remaining.min(scratch.len() as u64) as usize;
            let n = file.read(&mut scratch[..want])?;
            if n == 0 {
                break;
            }

            let mut out = 0;
            while out < n {
                out += self.write(&scratch[out..n])?;
            }

            moved += n as u64;
            remaining -= n as u64;
        }

        Ok(moved)
    }
}

/// Adapter making any [`io::Write`](Write) usable as a sink.
pub struct IoSink<W>(pub W);

impl<W: Write> FormSink for IoSink<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }
}

/// Encode `form` into `sink`.
pub fn encode<S: FormSink>(
    sink: &mut S,
    form: &mut FormData,
    boundary: &str,
    config: EncodeConfig,
) -> Result<u64, FormError> {
    FormEncoder::new(boundary, config)?.encode(sink, form)
}

/// multipart/form-data encoder for one boundary.
pub struct FormEncoder {
    boundary: String,
    delimiters: Delimiters,
    config: EncodeConfig,
}

impl FormEncoder {
    /// Validates the boundary and chunk size before any I/O happens.
    pub fn new(boundary: &str, config: EncodeConfig) -> Result<Self, FormError> {
        boundary::validate_boundary(boundary, config.max_boundary_len)?;
        if config.chunk_size == 0 {
            return Err(FormError::InvalidChunkSize);
        }

        Ok(Self {
            boundary: boundary.to_string(),
            delimiters: Delimiters::new(boundary),
            config,
        })
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Render every part and the close delimiter, returning the number of
    /// bytes written. Field iteration order is unspecified; the values
    /// under one name keep their insertion order.
    pub fn encode<S: FormSink>(
        &self,
        sink: &mut S,
        form: &mut FormData,
    ) -> Result<u64, FormError> {
        let mut written = 0u64;

        for (name, values) in form.fields.iter_mut() {
            check_quotable(name, name, "name")?;

            for value in values.iter_mut() {
                match value {
                    FieldValue::Scalar(scalar) => {
                        let data = scalar.to_string();
                        written += self.write_data_part(sink, name, &[], &data)?;
                    }
                    FieldValue::Part(part) => {
                        written += self.write_part(sink, name, part)?;
                    }
                }
            }
        }

        written += self.put(sink, &self.delimiters.close_line())?;
        Ok(written)
    }

    fn write_part<S: FormSink>(
        &self,
        sink: &mut S,
        name: &str,
        part: &mut PartSpec,
    ) -> Result<u64, FormError> {
        match (&part.filename, &mut part.file, &part.pathname, &part.data) {
            (Some(filename), Some(file), _, _) => {
                check_quotable(name, filename, "filename")?;
                let length = file
                    .metadata()
                    .map_err(|e| {
                        FormError::file_open_failed(PathBuf::from(filename), name, e)
                    })?
                    .len();
                let meta = PartMeta { name, filename: filename.as_str(), owns_file: false };
                self.write_file_part(sink, &part.headers, file, length, &meta)
            }
            (Some(filename), None, Some(pathname), _) => {
                check_quotable(name, filename, "filename")?;
                let mut file = File::open(pathname)
                    .map_err(|e| FormError::file_open_failed(pathname.clone(), name, e))?;
                let length = file
                    .metadata()
                    .map_err(|e| FormError::file_open_failed(pathname.clone(), name, e))?
                    .len();
                let meta = PartMeta { name, filename: filename.as_str(), owns_file: true };
                // the handle is dropped, and with it closed, on every
                // path out of write_file_part
                self.write_file_part(sink, &part.headers, &mut file, length, &meta)
            }
            (Some(_), None, None, _) => {
                warn!("Skipping part '{name}': filename given but no file or pathname");
                Ok(0)
            }
            (None, _, _, Some(data)) => {
                let data = data.to_string();
                self.write_data_part(sink, name, &part.headers, &data)
            }
            _ => {
                debug!("Skipping part '{name}': no body source");
                Ok(0)
            }
        }
    }

    fn write_data_part<S: FormSink>(
        &self,
        sink: &mut S,
        name: &str,
        headers: &[(String, String)],
        data: &str,
    ) -> Result<u64, FormError> {
        let mut written = self.write_part_opening(sink, headers)?;
        written += self.put(
            sink,
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        )?;
        written += self.put(sink, data.as_bytes())?;
        written += self.put(sink, b"\r\n")?;
        Ok(written)
    }

    fn write_file_part<S: FormSink>(
        &self,
        sink: &mut S,
        headers: &[(String, String)],
        file: &mut File,
        length: u64,
        meta: &PartMeta<'_>,
    ) -> Result<u64, FormError> {
        let mut written = self.write_part_opening(sink, headers)?;
        written += self.put(
            sink,
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\r\n",
                meta.name, meta.filename
            )
            .as_bytes(),
        )?;

        written += sink
            .write_file(file, length, 0, meta, self.config.chunk_size)
            .map_err(FormError::Writer)?;

        written += self.put(sink, b"\r\n")?;
        Ok(written)
    }

    /// The dash-boundary line plus any caller headers.
    fn write_part_opening<S: FormSink>(
        &self,
        sink: &mut S,
        headers: &[(String, String)],
    ) -> Result<u64, FormError> {
        let mut written = self.put(sink, &self.delimiters.dash_boundary)?;
        written += self.put(sink, b"\r\n")?;

        for (key, value) in headers {
            if key.is_empty() || key.contains(char::is_whitespace) {
                debug!("Dropping malformed header key {key:?}");
                continue;
            }
            written += self.put(sink, format!("{key}: {value}\r\n").as_bytes())?;
        }

        Ok(written)
    }

    /// Write a full buffer through the sink, tolerating short writes.
    fn put<S: FormSink>(&self, sink: &mut S, buf: &[u8]) -> Result<u64, FormError> {
        let mut done = 0;
        while done < buf.len() {
            let n = sink.write(&buf[done..]).map_err(FormError::Writer)?;
            if n == 0 {
                return Err(FormError::Writer(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "sink accepted no bytes",
                )));
            }
            done += n;
        }
        Ok(done as u64)
    }
}

/// Reject values that would break out of the quoted-string framing.
fn check_quotable(name: &str, value: &str, field: &'static str) -> Result<(), FormError> {
    if value.contains(['"', '\r', '\n']) {
        return Err(FormError::invalid_part(name, field));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_to_vec(form: &mut FormData, boundary: &str) -> Result<(Vec<u8>, u64), FormError> {
        let mut sink = IoSink(Vec::new());
        let encoder = FormEncoder::new(boundary, EncodeConfig::default())?;
        let written = encoder.encode(&mut sink, form)?;
        Ok((sink.0, written))
    }

    #[test]
    fn test_encode_basic_form() {
        let mut form = FormData::new();
        form.add_text("foo", "bar").add_text("foo", true);

        let (bytes, written) = encode_to_vec(&mut form, "B").unwrap();
        let expected = "--B\r\nContent-Disposition: form-data; name=\"foo\"\r\n\r\nbar\r\n\
                        --B\r\nContent-Disposition: form-data; name=\"foo\"\r\n\r\ntrue\r\n\
                        --B--";

        assert_eq!(String::from_utf8(bytes).unwrap(), expected);
        assert_eq!(written, expected.len() as u64);
    }

    #[test]
    fn test_scalar_rendering() {
        assert_eq!(Scalar::from("x").to_string(), "x");
        assert_eq!(Scalar::from(42i64).to_string(), "42");
        assert_eq!(Scalar::from(1.5f64).to_string(), "1.5");
        assert_eq!(Scalar::from(true).to_string(), "true");
        assert_eq!(Scalar::from(false).to_string(), "false");
    }

    #[test]
    fn test_encode_rejects_invalid_boundary() {
        let err = FormEncoder::new("foo#bar", EncodeConfig::default()).err();
        match err {
            Some(FormError::InvalidBoundary { byte, .. }) => assert_eq!(byte, b'#'),
            other => panic!("expected InvalidBoundary, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_rejects_zero_chunk_size() {
        let cfg = EncodeConfig { chunk_size: 0, ..EncodeConfig::default() };
        assert!(matches!(
            FormEncoder::new("B", cfg),
            Err(FormError::InvalidChunkSize)
        ));
    }

    #[test]
    fn test_custom_headers_order_and_dropped_keys() {
        let mut form = FormData::new();
        form.add_part(
            "note",
            PartSpec {
                headers: vec![
                    ("Content-Type".to_string(), "text/plain".to_string()),
                    ("bad key".to_string(), "dropped".to_string()),
                    (String::new(), "dropped".to_string()),
                ],
                data: Some(Scalar::from("hi")),
                ..PartSpec::default()
            },
        );

        let (bytes, _) = encode_to_vec(&mut form, "B").unwrap();
        let text = String::from_utf8(bytes).unwrap();

        // custom headers come before the Content-Disposition line
        assert_eq!(
            text,
            "--B\r\nContent-Type: text/plain\r\n\
             Content-Disposition: form-data; name=\"note\"\r\n\r\nhi\r\n--B--"
        );
        assert!(!text.contains("dropped"));
    }

    #[test]
    fn test_part_with_filename_but_no_source_is_skipped() {
        let mut form = FormData::new();
        form.add_text("kept", "yes");
        form.add_part(
            "ghost",
            PartSpec { filename: Some("ghost.txt".to_string()), ..PartSpec::default() },
        );

        let (bytes, _) = encode_to_vec(&mut form, "B").unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("name=\"kept\""));
        assert!(!text.contains("ghost"));
    }

    #[test]
    fn test_part_with_no_body_source_is_skipped() {
        let mut form = FormData::new();
        form.add_part("void", PartSpec::default());

        let (bytes, _) = encode_to_vec(&mut form, "B").unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "--B--");
    }

    #[test]
    fn test_quote_breaking_values_are_rejected() {
        let mut form = FormData::new();
        form.add_part(
            "f",
            PartSpec {
                filename: Some("evil\".txt".to_string()),
                data: Some(Scalar::from("x")),
                pathname: Some(PathBuf::from("/nonexistent")),
                ..PartSpec::default()
            },
        );

        let err = encode_to_vec(&mut form, "B").unwrap_err();
        assert!(matches!(err, FormError::InvalidPart { field: "filename", .. }));
    }

    #[test]
    fn test_missing_pathname_is_reported() {
        let mut form = FormData::new();
        form.add_part(
            "f",
            PartSpec {
                filename: Some("gone.bin".to_string()),
                pathname: Some(PathBuf::from("/definitely/not/here")),
                ..PartSpec::default()
            },
        );

        let err = encode_to_vec(&mut form, "B").unwrap_err();
        assert!(matches!(err, FormError::FileOpenFailed { .. }));
    }

    #[test]
    fn test_writer_failure_is_surfaced() {
        struct Broken;
        impl FormSink for Broken {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("downstream closed"))
            }
        }

        let mut form = FormData::new();
        form.add_text("a", "b");

        let encoder = FormEncoder::new("B", EncodeConfig::default()).unwrap();
        let err = encoder.encode(&mut Broken, &mut form).unwrap_err();
        assert!(matches!(err, FormError::Writer(_)));
    }
}
