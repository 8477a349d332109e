//! Decoded form model and temporary-file lifecycle.
//!
//! Every file-bearing part owns a [`TempFile`]: an open read/write handle
//! plus the path it lives at. The file is removed when the value is
//! dropped, unless ownership was explicitly taken with
//! [`TempFile::persist`] or [`TempFile::into_parts`]. Dropping a whole
//! [`Form`] therefore cleans up every temp file it still holds.

use crate::boundary::nonce_chars;
use crate::error::FormError;
use log::{debug, warn};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Number of random characters appended to the file template.
const TEMP_SUFFIX_LEN: usize = 6;

/// Attempts at allocating a unique temp path before giving up.
const TEMP_CREATE_ATTEMPTS: usize = 32;

/// A temporary file owning both the open handle and the path on disk.
#[derive(Debug)]
pub struct TempFile {
    file: File,
    path: PathBuf,
    keep: bool,
}

impl TempFile {
    /// Create a fresh temp file under `template` with a `_XXXXXX`-style
    /// random suffix, opened read/write and created exclusively.
    pub(crate) fn create(template: &Path) -> Result<Self, FormError> {
        for _ in 0..TEMP_CREATE_ATTEMPTS {
            let path = PathBuf::from(format!(
                "{}_{}",
                template.display(),
                nonce_chars(TEMP_SUFFIX_LEN)
            ));

            match OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(file) => {
                    debug!("Allocated part file {path:?}");
                    return Ok(Self { file, path, keep: false });
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(err) => return Err(FormError::TempFile(err)),
            }
        }

        Err(FormError::TempFile(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "failed to allocate a unique part file",
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    pub(crate) fn rewind(&mut self) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(0)).map(|_| ())
    }

    /// Move the file to `dest`, disarming the cleanup guard.
    pub fn persist<P: AsRef<Path>>(mut self, dest: P) -> std::io::Result<()> {
        fs::rename(&self.path, dest.as_ref())?;
        self.keep = true;
        Ok(())
    }

    /// Take the handle and path out, disarming the cleanup guard. The
    /// caller becomes responsible for removing the file. On failure the
    /// guard stays armed and the file is still cleaned up on drop.
    pub fn into_parts(mut self) -> std::io::Result<(File, PathBuf)> {
        let file = self.file.try_clone()?;
        self.keep = true;
        Ok((file, self.path.clone()))
    }

    fn remove_now(&mut self) {
        if self.keep {
            return;
        }
        self.keep = true;
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed part file {:?}", self.path),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!("Failed to remove part file {:?}: {err}", self.path),
        }
    }
}

impl Read for TempFile {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        self.remove_now();
    }
}

/// The body of a decoded part.
#[derive(Debug)]
pub enum PartBody {
    /// In-memory body, used when no filename was given.
    Text(String),
    /// File-backed body, positioned at offset 0 after decode.
    File(TempFile),
}

/// One decoded part: headers plus either an in-memory or file-backed body.
#[derive(Debug)]
pub struct Part {
    pub name: String,
    pub filename: Option<String>,
    /// Lowercased header names to their values in wire order.
    pub headers: HashMap<String, Vec<String>>,
    pub body: PartBody,
}

impl Part {
    /// True when the part carried a filename (even an empty one).
    pub fn is_file(&self) -> bool {
        self.filename.is_some()
    }

    /// The in-memory body, if this is a data part.
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            PartBody::Text(data) => Some(data),
            PartBody::File(_) => None,
        }
    }

    /// The temp file, if this is a file part.
    pub fn file(&self) -> Option<&TempFile> {
        match &self.body {
            PartBody::File(file) => Some(file),
            PartBody::Text(_) => None,
        }
    }

    pub fn file_mut(&mut self) -> Option<&mut TempFile> {
        match &mut self.body {
            PartBody::File(file) => Some(file),
            PartBody::Text(_) => None,
        }
    }

    /// First value of a header, by lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.first()).map(String::as_str)
    }
}

/// A decoded form: name to the parts carrying that name, in wire order.
#[derive(Debug, Default)]
pub struct Form {
    parts: HashMap<String, Vec<Part>>,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, part: Part) {
        self.parts.entry(part.name.clone()).or_default().push(part);
    }

    /// First part under `name`.
    pub fn get(&self, name: &str) -> Option<&Part> {
        self.parts.get(name).and_then(|parts| parts.first())
    }

    /// All parts under `name`, in the order they appeared on the wire.
    pub fn get_all(&self, name: &str) -> &[Part] {
        self.parts.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Remove and return all parts under `name`.
    pub fn take(&mut self, name: &str) -> Vec<Part> {
        self.parts.remove(name).unwrap_or_default()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Part])> {
        self.parts.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Total number of parts across all names.
    pub fn len(&self) -> usize {
        self.parts.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn into_inner(self) -> HashMap<String, Vec<Part>> {
        self.parts
    }

    /// Close every file handle and remove every temp file still held.
    ///
    /// Dropping the form does the same through the per-part guards; this
    /// is the explicit spelling for failure paths.
    pub fn discard(mut self) {
        for parts in self.parts.values_mut() {
            for part in parts.iter_mut() {
                if let PartBody::File(file) = &mut part.body {
                    file.remove_now();
                }
            }
        }
    }
}
